//! Upload submission: legality checks and payload preparation
//!
//! Everything here is local. `validate` is synchronous and makes no network
//! call; `prepare` adds the caption fallback and the watermark and hands back
//! an `UploadRequest` with its id already assigned. The relay repeats every
//! check, so a pass here is advisory only.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use bytes::Bytes;
use momentwall_config::UploadConfig;
use momentwall_types::{policy, Actor, EventInfo, MediaKind, TierConfig, Visibility};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::caption::{caption_or_default, Captioner};
use crate::error::SubmissionError;
use crate::request::UploadRequest;
use crate::source::MediaSource;
use crate::watermark::{apply_watermark, Branding};

/// What the user asked for
#[derive(Debug, Clone)]
pub struct UploadIntent {
    pub source: MediaSource,
    pub event: EventInfo,
    pub caption: Option<String>,
    pub visibility: Visibility,
    pub actor: Actor,
    /// The user-facing "add my watermark" toggle
    pub watermark: bool,
    pub branding: Option<Branding>,
}

/// Result of the synchronous checks
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPlan {
    pub kind: MediaKind,
    pub tier: TierConfig,
    pub should_watermark: bool,
}

pub struct SubmissionClient {
    captioner: Option<Arc<dyn Captioner>>,
    caption_timeout: Duration,
    default_caption: String,
}

impl SubmissionClient {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            captioner: None,
            caption_timeout: config.caption_timeout(),
            default_caption: config.default_caption.clone(),
        }
    }

    pub fn with_captioner(mut self, captioner: Arc<dyn Captioner>) -> Self {
        self.captioner = Some(captioner);
        self
    }

    /// Run the legality checks in order: quota, then video permission, then
    /// the watermark decision.
    pub fn validate(&self, intent: &UploadIntent) -> Result<SubmissionPlan, SubmissionError> {
        let source = &intent.source;
        if source.bytes.is_empty() {
            return Err(SubmissionError::EmptySource);
        }
        let kind = source
            .kind()
            .ok_or_else(|| SubmissionError::UnsupportedMedia(source.content_type.clone()))?;

        if let Actor::User {
            tier,
            storage_used_mb,
            ..
        } = &intent.actor
        {
            let limit_mb = TierConfig::for_tier(*tier).storage_limit_mb;
            let requested_mb = source.size_mb();
            if storage_used_mb + requested_mb > limit_mb {
                return Err(SubmissionError::QuotaExceeded {
                    used_mb: *storage_used_mb,
                    requested_mb,
                    limit_mb,
                });
            }
        }

        let governing = policy::governing_tier(&intent.actor, &intent.event);
        let tier = TierConfig::for_tier(governing);
        if kind == MediaKind::Video && !tier.allow_video {
            return Err(SubmissionError::VideoNotAllowed(governing));
        }

        let should_watermark = kind == MediaKind::Image
            && intent.branding.is_some()
            && policy::should_watermark(intent.watermark, &intent.actor, &tier);

        debug!(
            event_id = %intent.event.id,
            kind = ?kind,
            governing_tier = ?governing,
            should_watermark,
            "Upload intent validated"
        );

        Ok(SubmissionPlan {
            kind,
            tier,
            should_watermark,
        })
    }

    /// Validate, then caption and watermark, producing a request ready for transport
    pub async fn prepare(&self, intent: UploadIntent) -> Result<UploadRequest, SubmissionError> {
        let plan = self.validate(&intent)?;
        let UploadIntent {
            source,
            event,
            caption,
            visibility,
            actor,
            branding,
            ..
        } = intent;

        let caption = match caption.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()) {
            Some(caption) => Some(caption),
            None if plan.kind == MediaKind::Image => Some(
                caption_or_default(
                    self.captioner.as_deref(),
                    &source.bytes,
                    &source.content_type,
                    self.caption_timeout,
                    &self.default_caption,
                )
                .await,
            ),
            None => None,
        };

        let (payload, file_name, content_type, watermark_applied) = match branding.filter(|_| plan.should_watermark) {
            Some(branding) => {
                let marked = apply_watermark(&source.bytes, &branding, plan.tier.allow_branding)?;
                (
                    Bytes::from(marked),
                    jpeg_file_name(&source.file_name),
                    "image/jpeg".to_string(),
                    true,
                )
            }
            None => (source.bytes, source.file_name, source.content_type, false),
        };

        let request = UploadRequest::new(
            event.id,
            plan.kind,
            payload,
            file_name,
            content_type,
            caption,
            visibility,
            actor,
            watermark_applied,
        );

        info!(
            media_id = %request.id,
            event_id = %request.event_id,
            watermark_applied,
            "Upload prepared"
        );

        Ok(request)
    }
}

fn jpeg_file_name(file_name: &str) -> String {
    let stem = file_name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file_name);
    format!("{}.jpg", stem)
}
