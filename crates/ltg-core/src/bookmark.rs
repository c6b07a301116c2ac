//! Bookmark storage port.
//!
//! The relay only knows how to *ask* for a bookmark; HTTP framing, auth and
//! base URLs live in the adapter crate.

use async_trait::async_trait;
use serde::Serialize;

/// Payload for one "create bookmark" call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BookmarkRequest {
    pub url: String,
    pub unread: bool,
    /// `None` omits the field on the wire; the storage service treats a missing
    /// field differently from an empty list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_names: Option<Vec<String>>,
}

impl BookmarkRequest {
    pub fn new(url: impl Into<String>, tag_names: Option<Vec<String>>) -> Self {
        Self {
            url: url.into(),
            unread: true,
            tag_names,
        }
    }
}

/// Confirmation returned by the storage service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreatedBookmark {
    pub id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BookmarkError {
    #[error("no link found in message")]
    MissingUrl,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("authentication failed (status {status})")]
    Unauthorized { status: u16 },

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

/// Single-attempt bookmark creation. Implementations must not retry.
#[async_trait]
pub trait BookmarkPort: Send + Sync {
    async fn create_bookmark(
        &self,
        req: &BookmarkRequest,
    ) -> std::result::Result<CreatedBookmark, BookmarkError>;
}
