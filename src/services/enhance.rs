use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::services::crop::{self, CropError};

/// Instruction sent with every edit request.
const EDIT_INSTRUCTION: &str =
    "Isolate the object on a clean neutral background with even studio lighting";

/// Raw transport for the external image-edit call. One invocation is one
/// attempt; the retry policy lives in [`EnhancementService`].
pub trait EditTransport: Send + Sync + 'static {
    fn edit(
        &self,
        image: &[u8],
        instruction: &str,
        target_dim: u32,
    ) -> impl Future<Output = Result<Vec<u8>, EditCallError>> + Send;
}

/// Failure modes of a single edit attempt, split by whether retrying can
/// help.
#[derive(Debug, thiserror::Error)]
pub enum EditCallError {
    /// 4xx: the request itself was rejected. Retrying cannot help.
    #[error("edit service rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// 5xx: the service is struggling; worth retrying.
    #[error("edit service unavailable ({status})")]
    Unavailable { status: u16 },

    /// 2xx with an unusable payload. Not retried.
    #[error("edit response payload was malformed: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl EditCallError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            EditCallError::Unavailable { .. } | EditCallError::Transport(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnhanceError {
    #[error("fallback crop could not be decoded: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to encode enhanced image: {0}")]
    Encode(#[from] CropError),
}

/// Delay applied before the next attempt: `2^attempt` seconds, so 2s, 4s,
/// 8s for attempts 1–3.
pub fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt))
}

/// Stylizes a cropped object image via the external edit service.
///
/// On exhausted retries (or a rejected request) it falls back
/// deterministically to a plain resize/recompress of the original crop, so
/// a vendor outage degrades output quality instead of failing the task.
/// Only a failure of the fallback path itself surfaces as an error.
pub struct EnhancementService<T> {
    transport: T,
    max_attempts: u32,
    target_dim: u32,
}

impl<T: EditTransport> EnhancementService<T> {
    pub fn new(transport: T, max_attempts: u32, target_dim: u32) -> Self {
        Self {
            transport,
            max_attempts,
            target_dim,
        }
    }

    /// Runs the retry loop. `None` means every usable attempt failed and
    /// the caller should fall back to the unenhanced crop.
    async fn try_edit(&self, crop: &[u8]) -> Option<Vec<u8>> {
        for attempt in 1..=self.max_attempts {
            match self
                .transport
                .edit(crop, EDIT_INSTRUCTION, self.target_dim)
                .await
            {
                Ok(bytes) => return Some(bytes),
                Err(err) if err.is_retryable() => {
                    warn!(attempt, max_attempts = self.max_attempts, error = %err, "edit attempt failed");
                    metrics::counter!("enhancement_retries_total").increment(1);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(retry_delay(attempt)).await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "edit request not retryable, using fallback");
                    return None;
                }
            }
        }
        None
    }
}

/// Enhancement entry point used by the pipeline.
pub trait ImageEnhancer: Send + Sync + 'static {
    /// Returns the final, bounded, re-encoded image bytes: enhanced when
    /// the service cooperated, the recompressed original crop otherwise.
    fn enhance(&self, crop: &[u8]) -> impl Future<Output = Result<Vec<u8>, EnhanceError>> + Send;
}

impl<T: EditTransport> ImageEnhancer for EnhancementService<T> {
    async fn enhance(&self, crop: &[u8]) -> Result<Vec<u8>, EnhanceError> {
        let image = match self.try_edit(crop).await {
            Some(bytes) => match image::load_from_memory(&bytes) {
                Ok(img) => img,
                Err(err) => {
                    warn!(error = %err, "enhanced output is not a decodable image, using original crop");
                    image::load_from_memory(crop)?
                }
            },
            None => image::load_from_memory(crop)?,
        };

        let bounded = crop::resize_within(image, self.target_dim);
        Ok(crop::encode_jpeg(&bounded)?)
    }
}

/// Client for the hosted image-edit API.
pub struct EnhanceApiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct EditResponse {
    /// Base64-encoded output image.
    image: String,
}

impl EnhanceApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

impl EditTransport for EnhanceApiClient {
    async fn edit(
        &self,
        image: &[u8],
        instruction: &str,
        target_dim: u32,
    ) -> Result<Vec<u8>, EditCallError> {
        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image),
            "prompt": instruction,
            "size": format!("{}x{}", target_dim, target_dim),
        });

        let response = self
            .http
            .post(format!("{}/v1/images/edits", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(60))
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(EditCallError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        if !status.is_success() {
            return Err(EditCallError::Unavailable {
                status: status.as_u16(),
            });
        }

        let parsed: EditResponse = response.json().await?;
        base64::engine::general_purpose::STANDARD
            .decode(&parsed.image)
            .map_err(|e| EditCallError::Malformed(e.to_string()))
    }
}
