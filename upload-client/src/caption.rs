//! Caption generation for uploads that arrive without one
//!
//! Captioning is best effort: any failure or a slow answer falls back to the
//! configured default string and never fails the upload.
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


use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::CaptionError;

const CAPTION_PROMPT: &str = "Write one short, warm caption (at most 12 words) for this photo \
taken at an event. Reply with the caption only, without quotes.";

/// Something that can describe an image in a sentence
#[async_trait]
pub trait Captioner: Send + Sync {
    fn name(&self) -> &str;

    async fn caption(&self, image: &[u8], content_type: &str) -> Result<String, CaptionError>;
}

/// Anthropic captioner configuration
#[derive(Debug, Clone)]
pub struct AnthropicCaptionConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

impl AnthropicCaptionConfig {
    pub fn from_env() -> Option<Self> {
        std::env::var("ANTHROPIC_API_KEY").ok().map(|api_key| Self {
            api_key,
            base_url: std::env::var("ANTHROPIC_BASE_URL").ok(),
            model: std::env::var("ANTHROPIC_CAPTION_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string()),
            timeout_seconds: std::env::var("ANTHROPIC_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        })
    }
}

/// Captions images with a Claude vision request
pub struct AnthropicCaptioner {
    config: AnthropicCaptionConfig,
    client: reqwest::Client,
}

impl AnthropicCaptioner {
    pub fn new(config: AnthropicCaptionConfig) -> Result<Self, CaptionError> {
        if config.api_key.is_empty() {
            return Err(CaptionError::Configuration("ANTHROPIC_API_KEY is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or("https://api.anthropic.com/v1")
    }
}

#[async_trait]
impl Captioner for AnthropicCaptioner {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn caption(&self, image: &[u8], content_type: &str) -> Result<String, CaptionError> {
        info!(bytes = image.len(), "Requesting caption from Anthropic");

        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": 64,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": content_type,
                                "data": STANDARD.encode(image),
                            }
                        },
                        { "type": "text", "text": CAPTION_PROMPT }
                    ]
                }
            ]
        });

        let url = format!("{}/messages", self.base_url());

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CaptionError::Api(format!(
                "Anthropic API error ({}): {}",
                status, error_text
            )));
        }

        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Vec<AnthropicContent>,
        }

        #[derive(Deserialize)]
        struct AnthropicContent {
            #[serde(default)]
            text: String,
        }

        let result: AnthropicResponse = response.json().await?;
        let caption = result
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join(" ");

        clean_caption(&caption)
            .ok_or_else(|| CaptionError::InvalidResponse("empty caption".to_string()))
    }
}

/// Trim whitespace and surrounding quotes; `None` when nothing is left
pub fn clean_caption(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Ask `captioner` for a caption, bounded by `timeout`; fall back to `default`
pub async fn caption_or_default(
    captioner: Option<&dyn Captioner>,
    image: &[u8],
    content_type: &str,
    timeout: Duration,
    default: &str,
) -> String {
    let Some(captioner) = captioner else {
        debug!("No captioner configured, using default caption");
        return default.to_string();
    };

    match tokio::time::timeout(timeout, captioner.caption(image, content_type)).await {
        Ok(Ok(caption)) => caption,
        Ok(Err(e)) => {
            warn!(captioner = captioner.name(), error = %e, "Captioning failed, using default");
            default.to_string()
        }
        Err(_) => {
            warn!(
                captioner = captioner.name(),
                timeout_ms = timeout.as_millis() as u64,
                "Captioning timed out, using default"
            );
            default.to_string()
        }
    }
}
