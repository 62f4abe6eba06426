//! Gallery API: the CRUD calls a viewer makes against the relay

use async_trait::async_trait;
use momentwall_types::{headers, Actor, Comment, EventId, EventInfo, GuestbookEntry, MediaId, MediaItem, NewLikePayload};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;

#[async_trait]
pub trait GalleryApi: Send + Sync {
    async fn fetch_event(&self, event_id: &EventId, viewer: &Actor) -> Result<EventInfo, ApiError>;

    /// Full current collection, newest first, already filtered for `viewer`
    async fn fetch_media(&self, event_id: &EventId, viewer: &Actor) -> Result<Vec<MediaItem>, ApiError>;

    /// One click, one increment; returns the count after it
    async fn like(&self, event_id: &EventId, media_id: &MediaId, viewer: &Actor) -> Result<u64, ApiError>;

    async fn comment(
        &self,
        event_id: &EventId,
        media_id: &MediaId,
        viewer: &Actor,
        text: &str,
    ) -> Result<Comment, ApiError>;

    async fn delete_media(&self, event_id: &EventId, media_id: &MediaId, viewer: &Actor) -> Result<(), ApiError>;

    async fn fetch_guestbook(&self, event_id: &EventId, viewer: &Actor) -> Result<Vec<GuestbookEntry>, ApiError>;

    async fn post_message(&self, event_id: &EventId, viewer: &Actor, message: &str)
        -> Result<GuestbookEntry, ApiError>;
}

/// `GalleryApi` over the relay's JSON endpoints
#[derive(Debug, Clone)]
pub struct HttpGalleryApi {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpGalleryApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: Method, path: &str, viewer: &Actor) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = url, "Gallery API request");
        let mut builder = self.client.request(method, url);
        for (name, value) in headers::actor_headers(viewer) {
            builder = builder.header(name, value);
        }
        builder
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let response = Self::check(response).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.reason.or(body.error))
            .unwrap_or(text);

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(reason));
        }
        Err(ApiError::Rejected {
            status: status.as_u16(),
            reason,
        })
    }
}

#[async_trait]
impl GalleryApi for HttpGalleryApi {
    async fn fetch_event(&self, event_id: &EventId, viewer: &Actor) -> Result<EventInfo, ApiError> {
        let response = self
            .request(Method::GET, &format!("/api/events/{}", event_id), viewer)
            .send()
            .await?;
        Self::json(response).await
    }

    async fn fetch_media(&self, event_id: &EventId, viewer: &Actor) -> Result<Vec<MediaItem>, ApiError> {
        let response = self
            .request(Method::GET, &format!("/api/events/{}/media", event_id), viewer)
            .send()
            .await?;
        Self::json(response).await
    }

    async fn like(&self, event_id: &EventId, media_id: &MediaId, viewer: &Actor) -> Result<u64, ApiError> {
        let response = self
            .request(
                Method::POST,
                &format!("/api/events/{}/media/{}/like", event_id, media_id),
                viewer,
            )
            .send()
            .await?;
        let payload: NewLikePayload = Self::json(response).await?;
        Ok(payload.like_count)
    }

    async fn comment(
        &self,
        event_id: &EventId,
        media_id: &MediaId,
        viewer: &Actor,
        text: &str,
    ) -> Result<Comment, ApiError> {
        let response = self
            .request(
                Method::POST,
                &format!("/api/events/{}/media/{}/comments", event_id, media_id),
                viewer,
            )
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        Self::json(response).await
    }

    async fn delete_media(&self, event_id: &EventId, media_id: &MediaId, viewer: &Actor) -> Result<(), ApiError> {
        let response = self
            .request(
                Method::DELETE,
                &format!("/api/events/{}/media/{}", event_id, media_id),
                viewer,
            )
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_guestbook(&self, event_id: &EventId, viewer: &Actor) -> Result<Vec<GuestbookEntry>, ApiError> {
        let response = self
            .request(Method::GET, &format!("/api/events/{}/messages", event_id), viewer)
            .send()
            .await?;
        Self::json(response).await
    }

    async fn post_message(
        &self,
        event_id: &EventId,
        viewer: &Actor,
        message: &str,
    ) -> Result<GuestbookEntry, ApiError> {
        let response = self
            .request(Method::POST, &format!("/api/events/{}/messages", event_id), viewer)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?;
        Self::json(response).await
    }
}
