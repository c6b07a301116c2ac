use std::sync::Arc;

use ltg_core::config::Config;
use ltg_linkding::LinkdingClient;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), ltg_core::Error> {
    let cfg = Arc::new(Config::load()?);
    ltg_core::logging::init("ltg", &cfg.log_level, cfg.log_file.as_deref())?;
    if let Some(raw) = &cfg.unknown_log_level {
        warn!(log_level = %raw, "unknown LOG_LEVEL; using info");
    }

    let bookmarks = Arc::new(LinkdingClient::new(
        cfg.linkding_url.clone(),
        cfg.linkding_token.clone(),
        cfg.http_timeout,
    )?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c; shutdown needs a kill");
                return;
            }
            info!("shutdown requested; finishing current poll");
            cancel.cancel();
        });
    }

    let summary = ltg_telegram::router::run_polling(cfg, bookmarks, cancel)
        .await
        .map_err(|e| ltg_core::Error::External(format!("telegram relay failed: {e}")))?;

    info!(
        delivered = summary.polled.delivered,
        answered = summary.dispatched.processed,
        "ltg stopped"
    );
    Ok(())
}
