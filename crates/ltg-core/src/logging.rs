use std::{fs::OpenOptions, path::Path, sync::Mutex};

use tracing::Span;
use tracing_subscriber::{fmt, EnvFilter};

use crate::Result;

/// Initialize logging/tracing for the relay.
///
/// `level` is the default for our crates; `RUST_LOG` overrides it. When `log_file`
/// is set, output is appended to that file (no ANSI colors) instead of stdout.
pub fn init(service_name: &str, level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,ltg={level},ltg_core={level},ltg_linkding={level},ltg_telegram={level},{service_name}={level}"
        ))
    });

    let builder = fmt().with_env_filter(filter).with_target(false);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_ansi(true).init(),
    }

    Ok(())
}

/// Logging context handed to a long-lived component at construction time.
pub fn component_span(component: &'static str) -> Span {
    tracing::info_span!("component", name = component)
}
