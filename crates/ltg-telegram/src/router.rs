use std::sync::Arc;

use anyhow::Context;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ltg_core::{
    bookmark::BookmarkPort,
    config::Config,
    messaging::port::{MessagingPort, UpdatesPort},
    polling::PollerConfig,
    relay::{Relay, RelaySummary},
};

use crate::{TelegramMessenger, TelegramUpdates};

/// Build the Telegram side of the relay and run it until `cancel` fires and
/// every received update has been answered.
pub async fn run_polling(
    cfg: Arc<Config>,
    bookmarks: Arc<dyn BookmarkPort>,
    cancel: CancellationToken,
) -> anyhow::Result<RelaySummary> {
    let api_url = reqwest::Url::parse(&cfg.telegram_api_url)
        .with_context(|| format!("invalid TELEGRAM_API_URL: {}", cfg.telegram_api_url))?;
    let bot = Bot::new(cfg.telegram_bot_token.clone()).set_api_url(api_url);

    // Basic startup info.
    match bot.get_me().await {
        Ok(me) => info!("ltg started: @{}", me.username()),
        Err(e) => warn!(error = %e, "getMe failed; continuing with polling"),
    }
    match &cfg.default_tag {
        Some(tag) => info!(default_tag = %tag, "linkding: {}", cfg.linkding_url),
        None => info!("linkding: {} (no default tag)", cfg.linkding_url),
    }

    let updates: Arc<dyn UpdatesPort> = Arc::new(TelegramUpdates::new(
        &cfg.telegram_api_url,
        &cfg.telegram_bot_token,
    )?);
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot));

    let relay = Relay::new(
        updates,
        messenger,
        bookmarks,
        PollerConfig {
            poll_timeout: cfg.poll_timeout,
            retry_delay: cfg.poll_retry_delay,
        },
        cfg.default_tag.clone(),
    );

    let summary = relay.run(cancel).await?;
    Ok(summary)
}
