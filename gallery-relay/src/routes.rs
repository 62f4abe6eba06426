//! HTTP routes of the relay

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::Utc;
use momentwall_types::policy;
use momentwall_types::{
    Actor, Comment, EventId, EventInfo, GuestbookEntry, MediaDeletedPayload, MediaId, MediaItem, NewCommentPayload,
    NewLikePayload, RoomMessage,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use upload_client::UploadMetadata;
use uuid::Uuid;

use crate::error::{RelayError, RelayResult};
use crate::fanout::visible_to;
use crate::state::RelayState;
use crate::ws;

/// Ceiling on a multipart upload body; tier and guest limits are checked after
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/events", post(create_event))
        .route("/api/events/:event_id", get(get_event))
        .route(
            "/api/events/:event_id/media",
            get(list_media)
                .post(upload_media)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/events/:event_id/media/:media_id", delete(delete_media))
        .route("/api/events/:event_id/media/:media_id/like", post(like_media))
        .route("/api/events/:event_id/media/:media_id/comments", post(comment_media))
        .route("/api/events/:event_id/messages", get(list_messages).post(post_message))
        .route("/ws", get(ws::handler))
        .with_state(state)
}

async fn health(State(state): State<RelayState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "gallery-relay",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at.to_rfc3339(),
        "broadcast": state.broadcaster.channel().channel_type(),
        "broadcast_connected": state.broadcaster.channel().is_connected().await,
        "transcoder": state.handoff.transcoder().name(),
    }))
}

async fn actor_or_anonymous(state: &RelayState, headers: &HeaderMap) -> RelayResult<Option<Actor>> {
    state.directory.resolve_actor(headers).await
}

async fn require_actor(state: &RelayState, headers: &HeaderMap) -> RelayResult<Actor> {
    actor_or_anonymous(state, headers)
        .await?
        .ok_or_else(|| RelayError::Unauthorized("identify as a user or a guest".to_string()))
}

/// The item, provided it belongs to `event_id` and `viewer` may see it
async fn visible_item(
    state: &RelayState,
    viewer: Option<&Actor>,
    event: &EventInfo,
    media_id: &MediaId,
) -> RelayResult<MediaItem> {
    state
        .repository
        .get(media_id)
        .await
        .filter(|item| item.event_id == event.id && visible_to(viewer, item, event))
        .ok_or_else(|| RelayError::MediaNotFound(media_id.to_string()))
}

#[derive(Deserialize)]
struct CreateEventRequest {
    title: String,
}

async fn create_event(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(request): Json<CreateEventRequest>,
) -> RelayResult<impl IntoResponse> {
    let actor = require_actor(&state, &headers).await?;
    let user_id = actor
        .user_id()
        .ok_or_else(|| RelayError::Rejected("guests cannot host events".to_string()))?;
    if request.title.trim().is_empty() {
        return Err(RelayError::InvalidRequest("title is required".to_string()));
    }

    let host = state
        .directory
        .account(user_id)
        .await
        .ok_or_else(|| RelayError::Unauthorized(format!("unknown user {}", user_id)))?;
    let event = state.directory.host_event(&host, &request.title).await;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn get_event(State(state): State<RelayState>, Path(event_id): Path<EventId>) -> RelayResult<Json<EventInfo>> {
    Ok(Json(state.directory.event(&event_id).await?))
}

async fn list_media(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(event_id): Path<EventId>,
) -> RelayResult<Json<Vec<MediaItem>>> {
    let viewer = actor_or_anonymous(&state, &headers).await?;
    let event = state.directory.event(&event_id).await?;

    let items: Vec<MediaItem> = state
        .repository
        .fetch_event_media(&event_id)
        .await
        .into_iter()
        .filter(|item| visible_to(viewer.as_ref(), item, &event))
        .collect();

    debug!(event_id = %event_id, count = items.len(), "Media listed");
    Ok(Json(items))
}

async fn upload_media(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(event_id): Path<EventId>,
    mut multipart: Multipart,
) -> RelayResult<impl IntoResponse> {
    let actor = require_actor(&state, &headers).await?;

    let mut metadata: Option<UploadMetadata> = None;
    let mut file: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RelayError::InvalidRequest(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("metadata") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| RelayError::InvalidRequest(format!("unreadable metadata: {}", e)))?;
                metadata = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| RelayError::InvalidRequest(format!("invalid metadata: {}", e)))?,
                );
            }
            Some("file") => {
                file = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| RelayError::InvalidRequest(format!("unreadable file: {}", e)))?,
                );
            }
            other => debug!(field = ?other, "Ignoring unknown multipart field"),
        }
    }

    let metadata = metadata.ok_or_else(|| RelayError::InvalidRequest("metadata part is missing".to_string()))?;
    let file = file.ok_or_else(|| RelayError::InvalidRequest("file part is missing".to_string()))?;
    if metadata.event_id != event_id {
        return Err(RelayError::InvalidRequest(format!(
            "metadata names event {} but was posted to {}",
            metadata.event_id, event_id
        )));
    }

    let item = state.handoff.submit(&actor, metadata, file).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn delete_media(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path((event_id, media_id)): Path<(EventId, MediaId)>,
) -> RelayResult<StatusCode> {
    let actor = require_actor(&state, &headers).await?;
    let event = state.directory.event(&event_id).await?;
    let item = visible_item(&state, Some(&actor), &event, &media_id).await?;

    if !policy::can_delete(&actor, &item, &event) {
        return Err(RelayError::Rejected(
            "only the uploader, the host or an admin can delete this item".to_string(),
        ));
    }

    state.repository.delete(&media_id).await;
    info!(media_id = %media_id, event_id = %event_id, by = %actor.identity(), "Media deleted");

    state
        .broadcaster
        .to_event(&event_id, &RoomMessage::MediaDeleted(MediaDeletedPayload { id: media_id }))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

async fn like_media(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path((event_id, media_id)): Path<(EventId, MediaId)>,
) -> RelayResult<Json<NewLikePayload>> {
    let actor = require_actor(&state, &headers).await?;
    let event = state.directory.event(&event_id).await?;
    visible_item(&state, Some(&actor), &event, &media_id).await?;

    let like_count = state
        .repository
        .like(&media_id)
        .await
        .ok_or_else(|| RelayError::MediaNotFound(media_id.to_string()))?;

    let payload = NewLikePayload { id: media_id, like_count };
    state
        .broadcaster
        .to_event(&event_id, &RoomMessage::NewLike(payload.clone()))
        .await;
    Ok(Json(payload))
}

#[derive(Deserialize)]
struct CommentRequest {
    text: String,
}

async fn comment_media(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path((event_id, media_id)): Path<(EventId, MediaId)>,
    Json(request): Json<CommentRequest>,
) -> RelayResult<impl IntoResponse> {
    let actor = require_actor(&state, &headers).await?;
    let text = request.text.trim();
    if text.is_empty() {
        return Err(RelayError::InvalidRequest("comment text is required".to_string()));
    }

    let event = state.directory.event(&event_id).await?;
    visible_item(&state, Some(&actor), &event, &media_id).await?;

    let comment = state
        .repository
        .add_comment(&media_id, Comment::new(actor.display_name(), text))
        .await
        .ok_or_else(|| RelayError::MediaNotFound(media_id.to_string()))?;

    state
        .broadcaster
        .to_event(
            &event_id,
            &RoomMessage::NewComment(NewCommentPayload {
                media_id,
                comment: comment.clone(),
            }),
        )
        .await;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn list_messages(
    State(state): State<RelayState>,
    Path(event_id): Path<EventId>,
) -> RelayResult<Json<Vec<GuestbookEntry>>> {
    state.directory.event(&event_id).await?;
    Ok(Json(state.repository.guestbook(&event_id).await))
}

#[derive(Deserialize)]
struct MessageRequest {
    message: String,
}

async fn post_message(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(event_id): Path<EventId>,
    Json(request): Json<MessageRequest>,
) -> RelayResult<impl IntoResponse> {
    let actor = require_actor(&state, &headers).await?;
    let message = request.message.trim();
    if message.is_empty() {
        return Err(RelayError::InvalidRequest("message is required".to_string()));
    }
    state.directory.event(&event_id).await?;

    let entry = state
        .repository
        .append_message(GuestbookEntry {
            id: Uuid::new_v4().to_string(),
            event_id: event_id.clone(),
            author: actor.display_name().to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        })
        .await;

    state
        .broadcaster
        .to_event(&event_id, &RoomMessage::NewMessage(entry.clone()))
        .await;
    Ok((StatusCode::CREATED, Json(entry)))
}
