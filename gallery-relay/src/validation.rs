//! Server-side re-validation of an upload.
//!
//! Runs the same rules as the upload client against the relay's own records.
//! The client's verdict is never trusted: its view of quota and tier can be
//! stale and guests are unauthenticated.

use chrono::{DateTime, Utc};
use momentwall_types::policy;
use momentwall_types::{Actor, EventInfo, MediaKind, TierConfig};
use upload_client::UploadMetadata;

use crate::error::{RelayError, RelayResult};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn size_mb(size_bytes: u64) -> f64 {
    size_bytes as f64 / BYTES_PER_MB
}

/// Everything re-validation needs, gathered by the handoff
pub struct UploadCheck<'a> {
    pub actor: &'a Actor,
    pub event: &'a EventInfo,
    pub metadata: &'a UploadMetadata,
    /// Bytes actually received, not the size the client announced
    pub size_bytes: u64,
    pub guest_max_upload_mb: f64,
    pub now: DateTime<Utc>,
}

/// Returns the media kind the relay will store
pub fn revalidate(check: &UploadCheck<'_>) -> RelayResult<MediaKind> {
    let UploadCheck {
        actor,
        event,
        metadata,
        size_bytes,
        guest_max_upload_mb,
        now,
    } = check;

    if metadata.event_id != event.id {
        return Err(RelayError::InvalidRequest(format!(
            "metadata names event {} but was posted to {}",
            metadata.event_id, event.id
        )));
    }
    if *size_bytes == 0 {
        return Err(RelayError::InvalidRequest("file part is empty".to_string()));
    }

    let kind = MediaKind::from_content_type(&metadata.content_type).ok_or_else(|| {
        RelayError::InvalidRequest(format!("unsupported content type {}", metadata.content_type))
    })?;
    if kind != metadata.kind {
        return Err(RelayError::InvalidRequest(format!(
            "content type {} does not match kind {:?}",
            metadata.content_type, metadata.kind
        )));
    }

    if event.is_expired(*now) {
        return Err(RelayError::Rejected("event has expired".to_string()));
    }
    if metadata.uploader_identity != actor.identity() {
        return Err(RelayError::Rejected(
            "uploader identity does not match the caller".to_string(),
        ));
    }

    let requested_mb = size_mb(*size_bytes);
    match actor {
        Actor::Guest { .. } => {
            if requested_mb > *guest_max_upload_mb {
                return Err(RelayError::TooLarge(format!(
                    "guest uploads are limited to {} MB, got {:.1} MB",
                    guest_max_upload_mb, requested_mb
                )));
            }
        }
        Actor::User {
            tier,
            storage_used_mb,
            ..
        } => {
            let limit_mb = TierConfig::for_tier(*tier).storage_limit_mb;
            if storage_used_mb + requested_mb > limit_mb {
                return Err(RelayError::Rejected(format!(
                    "storage quota exceeded: {:.1} MB used + {:.1} MB requested > {} MB",
                    storage_used_mb, requested_mb, limit_mb
                )));
            }
        }
    }

    let tier = policy::governing_tier(actor, event);
    let config = TierConfig::for_tier(tier);
    if kind == MediaKind::Video && !config.allow_video {
        return Err(RelayError::Rejected(format!(
            "video uploads are not allowed on the {:?} tier",
            tier
        )));
    }

    if metadata.watermark_applied && !policy::should_watermark(true, actor, &config) {
        return Err(RelayError::Rejected(
            "watermarking is not permitted for this uploader".to_string(),
        ));
    }

    Ok(kind)
}
