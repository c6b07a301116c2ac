//! Fixed user-facing reply texts.

use std::fmt::Display;

pub const MSG_LINK_ADDED: &str = "✅ Link successfully added! 🎉";

pub const ERR_INVALID_URL: &str =
    "❌ That doesn't look like a valid URL. Double-check and try again! 🔍";

/// Reply sent when a bookmark could not be created.
pub fn failure_reply(err: &impl Display) -> String {
    format!("{ERR_INVALID_URL}\nError: {err}")
}

/// Cut `text` down to at most `max_chars` characters, marking the cut with `…`.
pub fn fit_reply(mut text: String, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if let Some((cut, _)) = text.char_indices().nth(max_chars) {
        let keep = text[..cut]
            .char_indices()
            .nth(max_chars - 1)
            .map_or(cut, |(i, _)| i);
        text.truncate(keep);
        text.push('…');
    }
    text
}
