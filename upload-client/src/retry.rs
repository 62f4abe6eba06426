//! Caller-driven retry with exponential backoff
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


use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::TransitionError;
use crate::request::UploadRequest;
use crate::transport::{UploadOutcome, UploadTransport};

/// Retry configuration for upload replays
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of replays after the first attempt
    pub max_retries: u32,
    /// Delay before the first replay, in milliseconds
    pub initial_delay_ms: u64,
    /// Cap for the exponential backoff, in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff (e.g., 2.0 for doubling)
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64, multiplier: f64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            max_delay_ms,
            multiplier,
        }
    }

    /// Get delay for a specific retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        // initial_delay * (multiplier ^ (attempt - 1))
        let delay_ms = (self.initial_delay_ms as f64) * self.multiplier.powi((attempt - 1) as i32);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64) as u64;

        Duration::from_millis(delay_ms)
    }
}

/// Send `request`, replaying it under the same id after transport faults.
///
/// Only `NetworkError` is retried; a rejection, an invalid response, a timeout
/// or a cancellation is returned as is. Progress from every attempt goes to
/// `on_progress`. Fails only when `request` is not in a startable state.
pub async fn upload_with_retry<F>(
    transport: &UploadTransport,
    request: &mut UploadRequest,
    config: &RetryConfig,
    mut on_progress: F,
) -> Result<UploadOutcome, TransitionError>
where
    F: FnMut(u8),
{
    let mut attempt = 0;

    loop {
        let handle = transport.start(request)?;

        let outcome = handle.wait_with_progress(&mut on_progress).await;
        let retryable = matches!(&outcome, UploadOutcome::Failed(failure) if failure.is_retryable());
        // Request state mirrors the outcome; a failed attempt stays replayable
        let _ = request.resolve(&outcome);

        if !retryable || attempt >= config.max_retries {
            if attempt > 0 {
                debug!(
                    media_id = %request.id,
                    attempts = attempt + 1,
                    "Upload finished after retries"
                );
            }
            return Ok(outcome);
        }

        attempt += 1;
        let delay = config.delay_for_attempt(attempt);
        warn!(
            media_id = %request.id,
            attempt,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Upload failed, replaying with exponential backoff"
        );
        sleep(delay).await;
    }
}
