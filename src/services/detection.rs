use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use crate::models::object::{BoundingBox, Detection};

/// Locates instances of a labelled object within an image.
///
/// Implementations return detections ranked by confidence, best first. An
/// empty list is a legitimate response meaning "no instance matched the
/// label", not a failure.
pub trait ObjectDetector: Send + Sync + 'static {
    fn detect(
        &self,
        image: &[u8],
        label: &str,
    ) -> impl Future<Output = Result<Vec<Detection>, DetectError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("detection service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse detection response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Client for the hosted object-localization API.
pub struct DetectApiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

/// Depending on model version the service emits boxes either as
/// `[x1, y1, x2, y2]` corner pairs or as `{x, y, width, height}` objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBox {
    Corners([f32; 4]),
    Rect {
        x: f32,
        y: f32,
        #[serde(alias = "w")]
        width: f32,
        #[serde(alias = "h")]
        height: f32,
    },
}

impl From<RawBox> for BoundingBox {
    fn from(raw: RawBox) -> Self {
        match raw {
            RawBox::Corners([x1, y1, x2, y2]) => BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
            },
            RawBox::Rect {
                x,
                y,
                width,
                height,
            } => BoundingBox {
                x,
                y,
                width,
                height,
            },
        }
    }
}

#[derive(Deserialize)]
struct RawDetection {
    #[serde(alias = "bbox")]
    bounding_box: RawBox,
    confidence: f32,
    #[serde(alias = "class_label")]
    label: String,
}

#[derive(Deserialize)]
struct DetectResponse {
    objects: Vec<RawDetection>,
}

impl DetectApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

impl ObjectDetector for DetectApiClient {
    async fn detect(&self, image: &[u8], label: &str) -> Result<Vec<Detection>, DetectError> {
        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image),
            "object": label,
        });

        let response = self
            .http
            .post(format!("{}/v1/detect", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(30))
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: DetectResponse = serde_json::from_slice(&bytes)?;

        let mut detections: Vec<Detection> = parsed
            .objects
            .into_iter()
            .map(|raw| Detection {
                bounding_box: raw.bounding_box.into(),
                confidence: raw.confidence,
                label: raw.label,
            })
            .collect();

        // Rank best-first; downstream always takes index 0.
        detections.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(detections)
    }
}
