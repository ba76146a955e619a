use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One physical object proposed by the upstream vision classification step.
/// Immutable once produced; at most the first K are promoted to enrichment
/// tasks per job.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CandidateObject {
    #[garde(length(min = 1, max = 200))]
    pub name: String,

    #[garde(length(min = 1, max = 100))]
    pub category: String,

    #[garde(skip)]
    pub description: String,

    #[garde(range(min = 0.0))]
    pub estimated_cost_usd: f64,
}

/// Axis-aligned box in source-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A located instance of a candidate object within the source image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    pub label: String,
}

/// Stage of a per-object enrichment task.
///
/// Transitions are forward-only: `waiting → detecting → (no_detection |
/// cropping) → enhancing → uploading → complete`, with `error` reachable
/// from any working stage. Terminal stages never change again.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObjectStage {
    Waiting,
    Detecting,
    Cropping,
    Enhancing,
    Uploading,
    Complete,
    /// The localization service found no instance matching the label.
    /// A legitimate outcome, deliberately distinct from `Error` so the
    /// client can prompt for manual entry instead of reporting a failure.
    NoDetection,
    Error,
}

impl ObjectStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ObjectStage::Complete | ObjectStage::NoDetection | ObjectStage::Error
        )
    }

    /// Position in the forward-only transition order. All terminal stages
    /// share the final rank.
    pub fn rank(self) -> u8 {
        match self {
            ObjectStage::Waiting => 0,
            ObjectStage::Detecting => 1,
            ObjectStage::Cropping => 2,
            ObjectStage::Enhancing => 3,
            ObjectStage::Uploading => 4,
            ObjectStage::Complete | ObjectStage::NoDetection | ObjectStage::Error => 5,
        }
    }
}

/// The mutable per-object record, one per promoted candidate, identified by
/// its position in the job's object list. Written by exactly one enrichment
/// task; read by arbitrarily many status requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStatus {
    pub position: usize,
    pub name: String,
    pub category: String,
    pub description: String,
    pub estimated_cost_usd: f64,
    pub status: ObjectStage,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    /// Final (enhanced or fallback) image, set on `uploading → complete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Unenhanced crop, kept even when enhancement later fails so the user
    /// always has a usable image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_crop_image_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_full_image_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl ObjectStatus {
    /// Placeholder record for a freshly created job, before its task runs.
    pub fn from_candidate(position: usize, candidate: &CandidateObject) -> Self {
        Self {
            position,
            name: candidate.name.clone(),
            category: candidate.category.clone(),
            description: candidate.description.clone(),
            estimated_cost_usd: candidate.estimated_cost_usd,
            status: ObjectStage::Waiting,
            detection_count: None,
            confidence: None,
            image_url: None,
            original_crop_image_url: None,
            original_full_image_url: None,
            error_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stages() {
        assert!(ObjectStage::Complete.is_terminal());
        assert!(ObjectStage::NoDetection.is_terminal());
        assert!(ObjectStage::Error.is_terminal());
        assert!(!ObjectStage::Waiting.is_terminal());
        assert!(!ObjectStage::Uploading.is_terminal());
    }

    #[test]
    fn test_stage_order_is_forward() {
        let happy_path = [
            ObjectStage::Waiting,
            ObjectStage::Detecting,
            ObjectStage::Cropping,
            ObjectStage::Enhancing,
            ObjectStage::Uploading,
            ObjectStage::Complete,
        ];
        for pair in happy_path.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&ObjectStage::NoDetection).unwrap();
        assert_eq!(json, "\"no_detection\"");
        assert_eq!(ObjectStage::NoDetection.to_string(), "no_detection");
    }

    #[test]
    fn test_placeholder_from_candidate() {
        let candidate = CandidateObject {
            name: "Reading Lamp".to_string(),
            category: "Lighting".to_string(),
            description: "Brass floor lamp with linen shade".to_string(),
            estimated_cost_usd: 85.0,
        };
        let status = ObjectStatus::from_candidate(1, &candidate);
        assert_eq!(status.position, 1);
        assert_eq!(status.name, "Reading Lamp");
        assert_eq!(status.status, ObjectStage::Waiting);
        assert!(status.image_url.is_none());
        assert!(status.error_reason.is_none());
    }
}
