//! Dispatch loop: turns each delivered update into one bookmark attempt and
//! one chat reply.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, Instrument, Span};

use crate::{
    bookmark::{BookmarkError, BookmarkPort, BookmarkRequest, CreatedBookmark},
    messaging::{
        port::MessagingPort,
        types::{IncomingUpdate, LinkMessage},
    },
    replies::{failure_reply, fit_reply, MSG_LINK_ADDED},
};

/// Outcome of one processed update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Added(CreatedBookmark),
    Failed(BookmarkError),
    /// The update had no message, so there was nobody to answer.
    Skipped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct Dispatcher {
    bookmarks: Arc<dyn BookmarkPort>,
    messenger: Arc<dyn MessagingPort>,
    default_tag: Option<String>,
    span: Span,
}

impl Dispatcher {
    pub fn new(
        bookmarks: Arc<dyn BookmarkPort>,
        messenger: Arc<dyn MessagingPort>,
        default_tag: Option<String>,
        span: Span,
    ) -> Self {
        Self {
            bookmarks,
            messenger,
            default_tag,
            span,
        }
    }

    /// Drain `rx` one update at a time until the channel is closed and empty.
    pub async fn run(&self, mut rx: UnboundedReceiver<IncomingUpdate>) -> DispatchSummary {
        async move {
            let mut summary = DispatchSummary::default();
            while let Some(update) = rx.recv().await {
                match self.handle(update).await {
                    Outcome::Added(_) => summary.succeeded += 1,
                    Outcome::Failed(_) => summary.failed += 1,
                    Outcome::Skipped => summary.skipped += 1,
                }
                summary.processed += 1;
            }
            info!(
                processed = summary.processed,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "delivery channel closed; dispatch loop finished"
            );
            summary
        }
        .instrument(self.span.clone())
        .await
    }

    /// Process a single update: build the request, call the bookmark service,
    /// and send exactly one reply to the originating chat.
    pub async fn handle(&self, update: IncomingUpdate) -> Outcome {
        let update_id = update.update_id.0;
        let Some(msg) = update.message else {
            debug!(update_id, "update carries no message; nothing to reply to");
            return Outcome::Skipped;
        };

        let result = match self.build_request(&msg) {
            Ok(req) => self.bookmarks.create_bookmark(&req).await,
            Err(e) => Err(e),
        };

        let (reply, outcome) = match result {
            Ok(created) => {
                info!(update_id, bookmark_id = ?created.id, "Link added successfully");
                (MSG_LINK_ADDED.to_string(), Outcome::Added(created))
            }
            Err(e) => {
                error!(update_id, error = %e, "failed to add link");
                (failure_reply(&e), Outcome::Failed(e))
            }
        };

        let reply = fit_reply(reply, self.messenger.capabilities().max_message_len);
        if let Err(e) = self.messenger.send_text(msg.chat_id, &reply).await {
            error!(update_id, chat_id = msg.chat_id.0, error = %e, "failed to send reply");
        }

        outcome
    }

    pub fn build_request(&self, msg: &LinkMessage) -> Result<BookmarkRequest, BookmarkError> {
        let url = msg
            .link
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(BookmarkError::MissingUrl)?;

        Ok(BookmarkRequest::new(
            url,
            tag_names(msg.origin.as_deref(), self.default_tag.as_deref()),
        ))
    }
}

/// Sender name first, then the default tag. `None` when neither is present.
pub fn tag_names(origin: Option<&str>, default_tag: Option<&str>) -> Option<Vec<String>> {
    let mut tags: Vec<String> = Vec::with_capacity(2);
    for tag in [origin, default_tag].into_iter().flatten() {
        let tag = tag.trim();
        if tag.is_empty() || tags.iter().any(|t| t == tag) {
            continue;
        }
        tags.push(tag.to_string());
    }

    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}
