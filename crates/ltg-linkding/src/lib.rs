//! Linkding adapter (bookmark storage).
//!
//! Implements the `ltg-core` BookmarkPort over the linkding REST API
//! (`POST /api/bookmarks/`). One attempt per call, no retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use ltg_core::{
    bookmark::{BookmarkError, BookmarkPort, BookmarkRequest, CreatedBookmark},
    errors::Error,
    Result,
};

const MAX_ERROR_BODY: usize = 200;

#[derive(Clone, Debug)]
pub struct LinkdingClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl LinkdingClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("linkding http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
        })
    }

    fn bookmarks_url(&self) -> String {
        format!("{}/api/bookmarks/", self.base_url)
    }
}

#[async_trait]
impl BookmarkPort for LinkdingClient {
    async fn create_bookmark(
        &self,
        req: &BookmarkRequest,
    ) -> std::result::Result<CreatedBookmark, BookmarkError> {
        let resp = self
            .http
            .post(self.bookmarks_url())
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .json(req)
            .send()
            .await
            .map_err(|e| BookmarkError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body = excerpt(&body);
            return Err(match status {
                StatusCode::BAD_REQUEST => BookmarkError::InvalidUrl(body),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BookmarkError::Unauthorized {
                    status: status.as_u16(),
                },
                _ => BookmarkError::UnexpectedStatus {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        // The id is informational only; an unreadable body still means "created".
        let v: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
        let id = v.get("id").and_then(|id| id.as_i64());
        debug!(bookmark_id = ?id, url = %req.url, "linkding bookmark created");

        Ok(CreatedBookmark { id })
    }
}

fn excerpt(body: &str) -> String {
    body.trim().chars().take(MAX_ERROR_BODY).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::ServerGuard) -> LinkdingClient {
        LinkdingClient::new(server.url(), "secret", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn posts_bookmark_with_token_and_tags() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/bookmarks/")
            .match_header("authorization", "Token secret")
            .match_body(Matcher::Json(json!({
                "url": "https://example.com",
                "unread": true,
                "tag_names": ["alice", "readlater"]
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 42, "url": "https://example.com"}"#)
            .create_async()
            .await;

        let req = BookmarkRequest::new(
            "https://example.com",
            Some(vec!["alice".to_string(), "readlater".to_string()]),
        );
        let created = client(&server).create_bookmark(&req).await.unwrap();

        assert_eq!(created, CreatedBookmark { id: Some(42) });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn omits_tag_field_when_no_tags() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/bookmarks/")
            .match_body(Matcher::Json(json!({
                "url": "https://example.com",
                "unread": true
            })))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let req = BookmarkRequest::new("https://example.com", None);
        let created = client(&server).create_bookmark(&req).await.unwrap();

        assert_eq!(created.id, None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn maps_rejections() {
        let mut server = mockito::Server::new_async().await;
        let _bad = server
            .mock("POST", "/api/bookmarks/")
            .match_body(Matcher::PartialJson(json!({ "url": "nope" })))
            .with_status(400)
            .with_body(r#"{"url": ["Enter a valid URL."]}"#)
            .create_async()
            .await;
        let _boom = server
            .mock("POST", "/api/bookmarks/")
            .match_body(Matcher::PartialJson(json!({ "url": "https://boom" })))
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let c = client(&server);

        let err = c
            .create_bookmark(&BookmarkRequest::new("nope", None))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BookmarkError::InvalidUrl(r#"{"url": ["Enter a valid URL."]}"#.to_string())
        );

        let err = c
            .create_bookmark(&BookmarkRequest::new("https://boom", None))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BookmarkError::UnexpectedStatus {
                status: 502,
                body: "bad gateway".to_string()
            }
        );
    }

    #[tokio::test]
    async fn bad_token_is_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/bookmarks/")
            .with_status(401)
            .with_body(r#"{"detail": "Invalid token."}"#)
            .create_async()
            .await;

        let err = client(&server)
            .create_bookmark(&BookmarkRequest::new("https://example.com", None))
            .await
            .unwrap_err();
        assert_eq!(err, BookmarkError::Unauthorized { status: 401 });
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let c = LinkdingClient::new("http://127.0.0.1:1", "secret", Duration::from_secs(2)).unwrap();
        let err = c
            .create_bookmark(&BookmarkRequest::new("https://example.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, BookmarkError::Network(_)));
    }
}
