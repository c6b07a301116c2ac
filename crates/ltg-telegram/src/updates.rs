//! Long-poll side of the Telegram adapter.
//!
//! Talks to `getUpdates` directly so it can read Bot API fields (link preview
//! options, forward origins) and keep full control of offset and timeout.
//! Each call owns its HTTP response and drops it before returning.

use std::{sync::OnceLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use ltg_core::{
    domain::{ChatId, UpdateId},
    errors::Error,
    messaging::{
        port::UpdatesPort,
        types::{IncomingUpdate, LinkMessage},
    },
    Result,
};

/// Added to the long-poll wait so the local timeout never fires first.
const HTTP_MARGIN: Duration = Duration::from_secs(10);

const ALLOWED_UPDATES: &[&str] = &["message", "channel_post"];

#[derive(Clone, Debug)]
pub struct TelegramUpdates {
    http: reqwest::Client,
    endpoint: String,
}

impl TelegramUpdates {
    pub fn new(api_url: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Telegram(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/bot{token}/getUpdates", api_url.trim_end_matches('/')),
        })
    }
}

#[derive(Serialize)]
struct GetUpdatesParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<serde_json::Value>,
    description: Option<String>,
}

#[async_trait]
impl UpdatesPort for TelegramUpdates {
    async fn get_updates(
        &self,
        offset: Option<UpdateId>,
        timeout: Duration,
    ) -> Result<Vec<IncomingUpdate>> {
        let params = GetUpdatesParams {
            offset: offset.map(|o| o.0),
            timeout: timeout.as_secs(),
            allowed_updates: ALLOWED_UPDATES,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .timeout(timeout + HTTP_MARGIN)
            .json(&params)
            .send()
            .await
            .map_err(|e| Error::Telegram(format!("getUpdates request: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Telegram(format!("getUpdates body: {e}")))?;

        let parsed: std::result::Result<ApiResponse, _> = serde_json::from_str(&body);
        if !status.is_success() {
            let desc = parsed
                .ok()
                .and_then(|r| r.description)
                .unwrap_or_else(|| body.chars().take(200).collect());
            return Err(Error::Telegram(format!("getUpdates failed: {status} {desc}")));
        }

        let parsed = parsed?;
        if !parsed.ok {
            return Err(Error::Telegram(format!(
                "getUpdates not ok: {}",
                parsed.description.unwrap_or_default()
            )));
        }

        parsed.result.into_iter().map(decode_update).collect()
    }
}

/// Decode one update. A record that has an id but an unexpected shape is
/// still returned so the offset can move past it. If its chat can be made
/// out, it carries a bare message so the sender still gets a reply.
fn decode_update(raw: serde_json::Value) -> Result<IncomingUpdate> {
    match serde_json::from_value::<RawUpdate>(raw.clone()) {
        Ok(u) => Ok(u.into_incoming()),
        Err(e) => {
            let id = raw
                .get("update_id")
                .and_then(|v| v.as_i64())
                .ok_or(Error::Json(e))?;
            let chat_id = ["message", "channel_post"]
                .iter()
                .find_map(|kind| raw.pointer(&format!("/{kind}/chat/id"))?.as_i64());
            warn!(update_id = id, ?chat_id, "could not decode update; passing on what is left");
            Ok(IncomingUpdate {
                update_id: UpdateId(id),
                message: chat_id.map(|id| LinkMessage {
                    chat_id: ChatId(id),
                    ..Default::default()
                }),
            })
        }
    }
}

#[derive(Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<RawMessage>,
    channel_post: Option<RawMessage>,
}

impl RawUpdate {
    fn into_incoming(self) -> IncomingUpdate {
        IncomingUpdate {
            update_id: UpdateId(self.update_id),
            message: self.message.or(self.channel_post).map(RawMessage::into_link_message),
        }
    }
}

#[derive(Deserialize)]
struct RawMessage {
    chat: RawChat,
    text: Option<String>,
    caption: Option<String>,
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    caption_entities: Vec<RawEntity>,
    link_preview_options: Option<RawLinkPreview>,
    forward_origin: Option<RawOrigin>,
}

#[derive(Deserialize)]
struct RawChat {
    id: i64,
    username: Option<String>,
    title: Option<String>,
}

#[derive(Deserialize)]
struct RawUser {
    username: Option<String>,
    #[serde(default)]
    first_name: String,
}

#[derive(Deserialize)]
struct RawEntity {
    #[serde(rename = "type")]
    kind: String,
    offset: usize,
    length: usize,
    url: Option<String>,
}

#[derive(Deserialize)]
struct RawLinkPreview {
    url: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawOrigin {
    User { sender_user: RawUser },
    HiddenUser { sender_user_name: String },
    Chat { sender_chat: RawChat },
    Channel { chat: RawChat },
    #[serde(other)]
    Unknown,
}

impl RawOrigin {
    fn display_name(self) -> Option<String> {
        let name = match self {
            RawOrigin::User { sender_user } => sender_user
                .username
                .or(Some(sender_user.first_name)),
            RawOrigin::HiddenUser { sender_user_name } => Some(sender_user_name),
            RawOrigin::Chat { sender_chat: chat } | RawOrigin::Channel { chat } => {
                chat.username.or(chat.title)
            }
            RawOrigin::Unknown => None,
        };
        name.filter(|s| !s.trim().is_empty())
    }
}

impl RawMessage {
    fn into_link_message(self) -> LinkMessage {
        let link = self.extract_link();
        let origin = self.forward_origin.and_then(RawOrigin::display_name);
        LinkMessage {
            chat_id: ChatId(self.chat.id),
            origin,
            link,
            text: self.text.or(self.caption),
        }
    }

    /// Preview metadata first, then entities, then a plain scan of the text.
    fn extract_link(&self) -> Option<String> {
        if let Some(url) = self.link_preview_options.as_ref().and_then(|p| p.url.clone()) {
            return Some(url);
        }

        let (body, entities) = match (&self.text, &self.caption) {
            (Some(t), _) => (t.as_str(), &self.entities),
            (None, Some(c)) => (c.as_str(), &self.caption_entities),
            (None, None) => return None,
        };

        if let Some(url) = entities
            .iter()
            .find(|e| e.kind == "text_link")
            .and_then(|e| e.url.clone())
        {
            return Some(url);
        }
        if let Some(url) = entities
            .iter()
            .find(|e| e.kind == "url")
            .and_then(|e| utf16_slice(body, e.offset, e.length))
        {
            return Some(url);
        }

        url_regex().find(body).map(|m| m.as_str().to_string())
    }
}

/// Entity offsets are in UTF-16 code units.
fn utf16_slice(text: &str, offset: usize, length: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = offset.checked_add(length)?;
    String::from_utf16(units.get(offset..end)?).ok()
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"]+"#).expect("valid regex"))
}
