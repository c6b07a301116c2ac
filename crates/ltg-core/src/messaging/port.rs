use std::time::Duration;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UpdateId},
    messaging::types::{IncomingUpdate, MessagingCapabilities},
    Result,
};

/// Inbound side of the chat transport.
#[async_trait]
pub trait UpdatesPort: Send + Sync {
    /// One long-poll attempt: updates with id >= `offset`, waiting up to `timeout`
    /// server-side when none are pending.
    ///
    /// Transport, status, API-level and decoding failures are all `Err`.
    async fn get_updates(
        &self,
        offset: Option<UpdateId>,
        timeout: Duration,
    ) -> Result<Vec<IncomingUpdate>>;
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Texts passed to `send_text` must fit within these limits.
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
}
