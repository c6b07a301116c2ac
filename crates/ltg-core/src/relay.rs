//! Wires the update poller and the dispatch loop together over one unbounded
//! FIFO channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    bookmark::BookmarkPort,
    dispatch::{DispatchSummary, Dispatcher},
    logging::component_span,
    messaging::port::{MessagingPort, UpdatesPort},
    polling::{PollSummary, PollerConfig, UpdatePoller},
    Error, Result,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub polled: PollSummary,
    pub dispatched: DispatchSummary,
}

pub struct Relay {
    poller: UpdatePoller,
    dispatcher: Dispatcher,
}

impl Relay {
    pub fn new(
        updates: Arc<dyn UpdatesPort>,
        messenger: Arc<dyn MessagingPort>,
        bookmarks: Arc<dyn BookmarkPort>,
        poller_cfg: PollerConfig,
        default_tag: Option<String>,
    ) -> Self {
        Self {
            poller: UpdatePoller::new(updates, poller_cfg, component_span("poller")),
            dispatcher: Dispatcher::new(
                bookmarks,
                messenger,
                default_tag,
                component_span("dispatcher"),
            ),
        }
    }

    /// Run until `cancel` fires and every queued update has been answered.
    ///
    /// The poller runs as its own task; the dispatch loop runs on the caller's
    /// task and ends once the poller has closed the channel and it is drained.
    pub async fn run(self, cancel: CancellationToken) -> Result<RelaySummary> {
        let (tx, rx) = mpsc::unbounded_channel();

        let poller = tokio::spawn(self.poller.run(tx, cancel));
        let dispatched = self.dispatcher.run(rx).await;
        let polled = poller
            .await
            .map_err(|e| Error::External(format!("update poller task failed: {e}")))?;

        Ok(RelaySummary { polled, dispatched })
    }
}
