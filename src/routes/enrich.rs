use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{CreateJobResponse, JobSnapshot};
use crate::models::object::CandidateObject;
use crate::services::pipeline::JobError;

/// POST /api/v1/enrich — submit a photo plus its candidate objects.
///
/// Responds as soon as the job record exists, before any enrichment task
/// has run, so the client can render placeholders immediately. No job id
/// is allocated on failure.
pub async fn submit_enrichment(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CreateJobResponse>, (StatusCode, String)> {
    let mut image_data: Option<Vec<u8>> = None;
    let mut candidates: Option<Vec<CandidateObject>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            "malformed multipart body".to_string(),
        )
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let data = field.bytes().await.map_err(|_| {
                    (
                        StatusCode::BAD_REQUEST,
                        "unreadable image field".to_string(),
                    )
                })?;

                // Validate image format using the `image` crate
                image::guess_format(&data).map_err(|_| {
                    (
                        StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        "unsupported image format".to_string(),
                    )
                })?;

                image_data = Some(data.to_vec());
            }
            Some("objects") => {
                let text = field.text().await.map_err(|_| {
                    (
                        StatusCode::BAD_REQUEST,
                        "unreadable objects field".to_string(),
                    )
                })?;
                let parsed: Vec<CandidateObject> = serde_json::from_str(&text).map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("invalid objects payload: {e}"),
                    )
                })?;
                candidates = Some(parsed);
            }
            _ => {}
        }
    }

    let image_data = image_data.ok_or((
        StatusCode::BAD_REQUEST,
        "missing image field".to_string(),
    ))?;
    let candidates = candidates.ok_or((
        StatusCode::BAD_REQUEST,
        "missing objects field".to_string(),
    ))?;

    for candidate in &candidates {
        candidate.validate().map_err(|e| {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("invalid candidate object: {e}"),
            )
        })?;
    }

    let (job_id, objects) = state
        .pipeline
        .start_job(image_data, candidates)
        .await
        .map_err(|e| match e {
            JobError::NoCandidates | JobError::BadImage(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            JobError::Decode(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        })?;

    Ok(Json(CreateJobResponse { job_id, objects }))
}

/// GET /api/v1/enrich/{job_id} — current enrichment snapshot.
///
/// Safe to call at any frequency; returns 404 once the job is evicted.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobSnapshot>, StatusCode> {
    state
        .store
        .snapshot(job_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
