use crate::domain::{ChatId, UpdateId};

/// One inbound chat event, as returned by a long poll.
///
/// Telegram-specific wire fields stay in the Telegram adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingUpdate {
    pub update_id: UpdateId,
    /// `None` for update kinds that carry no message (nothing to reply to).
    pub message: Option<LinkMessage>,
}

/// The parts of a chat message the relay cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkMessage {
    pub chat_id: ChatId,
    /// Display name of the sender or forward origin.
    pub origin: Option<String>,
    /// Link extracted from preview metadata or message entities.
    pub link: Option<String>,
    pub text: Option<String>,
}

/// Limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Longest text a single message may carry, in characters.
    pub max_message_len: usize,
}
