use futures::future::join_all;
use image::DynamicImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::object::{CandidateObject, ObjectStage, ObjectStatus};
use crate::services::crop::{self, CropError};
use crate::services::detection::{DetectError, ObjectDetector};
use crate::services::enhance::{EnhanceError, ImageEnhancer};
use crate::services::status_store::StatusStore;
use crate::services::storage::{ImageStore, StorageError};

/// Per-job tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// At most this many candidates are promoted to enrichment tasks.
    pub max_objects_per_job: usize,
    pub crop_padding_px: u32,
    /// Wall-clock budget for the whole job; unfinished tasks are aborted
    /// and their slots marked as errors when it elapses.
    pub job_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_objects_per_job: 3,
            crop_padding_px: 20,
            job_timeout: Duration::from_secs(300),
        }
    }
}

/// Failures at job creation time. These abort the whole job before any
/// object task starts; per-object failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("no candidate objects supplied")]
    NoCandidates,

    #[error("uploaded image could not be decoded: {0}")]
    BadImage(#[from] image::ImageError),

    #[error("image decode task failed: {0}")]
    Decode(#[from] tokio::task::JoinError),
}

/// Orchestrates the per-object enrichment tasks for one uploaded photo.
///
/// `start_job` registers the job and returns immediately; each object then
/// runs `detect → crop → enhance → upload` on its own task, writing every
/// transition into the status store. Tasks are fully isolated: one
/// object's failure never cancels or blocks its siblings.
pub struct EnrichmentPipeline<D, E, S> {
    detector: Arc<D>,
    enhancer: Arc<E>,
    storage: Arc<S>,
    store: Arc<dyn StatusStore>,
    config: PipelineConfig,
}

impl<D, E, S> EnrichmentPipeline<D, E, S>
where
    D: ObjectDetector,
    E: ImageEnhancer,
    S: ImageStore,
{
    pub fn new(
        detector: Arc<D>,
        enhancer: Arc<E>,
        storage: Arc<S>,
        store: Arc<dyn StatusStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            detector,
            enhancer,
            storage,
            store,
            config,
        }
    }

    /// Create a job for `image` and spawn one enrichment task per promoted
    /// candidate. Returns the job id and the placeholder records as soon
    /// as the job exists; enrichment progresses in the background.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn start_job(
        &self,
        image: Vec<u8>,
        mut candidates: Vec<CandidateObject>,
    ) -> Result<(Uuid, Vec<ObjectStatus>), JobError> {
        if candidates.is_empty() {
            return Err(JobError::NoCandidates);
        }
        candidates.truncate(self.config.max_objects_per_job);

        let image_format = image::guess_format(&image);
        let image_bytes = Arc::new(image);

        // Decode up front so an unusable upload fails the request instead
        // of every object task.
        let decode_input = Arc::clone(&image_bytes);
        let decoded = Arc::new(
            tokio::task::spawn_blocking(move || image::load_from_memory(&decode_input)).await??,
        );

        let job_id = Uuid::new_v4();
        metrics::counter!("enrichment_jobs_total").increment(1);

        // Keep a copy of the full photo so the client can show each crop
        // in context. Losing it is not worth failing the job over.
        let full_image_url = match image_format {
            Ok(format) => {
                let ext = format.extensions_str().first().copied().unwrap_or("img");
                let key = format!("jobs/{job_id}/original.{ext}");
                match self
                    .storage
                    .store(&key, &image_bytes, format.to_mime_type())
                    .await
                {
                    Ok(url) => Some(url),
                    Err(err) => {
                        warn!(%job_id, error = %err, "failed to store full image, continuing without it");
                        None
                    }
                }
            }
            Err(_) => None,
        };

        let objects: Vec<ObjectStatus> = candidates
            .iter()
            .enumerate()
            .map(|(position, candidate)| {
                let mut status = ObjectStatus::from_candidate(position, candidate);
                status.original_full_image_url = full_image_url.clone();
                status
            })
            .collect();

        self.store.create(job_id, objects.clone());
        info!(%job_id, objects = objects.len(), "job created, spawning enrichment tasks");

        let handles: Vec<_> = candidates
            .into_iter()
            .enumerate()
            .map(|(position, candidate)| {
                let ctx = ObjectTaskCtx {
                    job_id,
                    position,
                    label: candidate.name,
                    detector: Arc::clone(&self.detector),
                    enhancer: Arc::clone(&self.enhancer),
                    storage: Arc::clone(&self.storage),
                    store: Arc::clone(&self.store),
                    image_bytes: Arc::clone(&image_bytes),
                    image: Arc::clone(&decoded),
                    crop_padding: self.config.crop_padding_px,
                };
                tokio::spawn(run_object_task(ctx))
            })
            .collect();

        // Supervisor: enforce the job-wide wall-clock budget without
        // blocking the caller.
        let store = Arc::clone(&self.store);
        let job_timeout = self.config.job_timeout;
        let total = objects.len();
        tokio::spawn(async move {
            let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
            if timeout(job_timeout, join_all(handles)).await.is_err() {
                warn!(
                    %job_id,
                    timeout_secs = job_timeout.as_secs(),
                    "job exceeded wall-clock budget, aborting unfinished tasks"
                );
                for handle in abort_handles {
                    handle.abort();
                }
                let mut mark_timed_out = |o: &mut ObjectStatus| {
                    o.status = ObjectStage::Error;
                    o.error_reason = Some("job timed out".to_string());
                };
                // Terminal slots ignore this write; only stuck tasks are
                // affected.
                for position in 0..total {
                    store.update_object(job_id, position, &mut mark_timed_out);
                }
            }
        });

        Ok((job_id, objects))
    }
}

struct ObjectTaskCtx<D, E, S> {
    job_id: Uuid,
    position: usize,
    label: String,
    detector: Arc<D>,
    enhancer: Arc<E>,
    storage: Arc<S>,
    store: Arc<dyn StatusStore>,
    image_bytes: Arc<Vec<u8>>,
    image: Arc<DynamicImage>,
    crop_padding: u32,
}

impl<D, E, S> ObjectTaskCtx<D, E, S> {
    fn update(&self, mut f: impl FnMut(&mut ObjectStatus)) {
        self.store.update_object(self.job_id, self.position, &mut f);
    }

    fn set_stage(&self, stage: ObjectStage) {
        self.update(|o| o.status = stage);
    }
}

#[derive(Debug, thiserror::Error)]
enum TaskError {
    #[error("detection failed: {0}")]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Crop(#[from] CropError),

    #[error("enhancement failed: {0}")]
    Enhance(#[from] EnhanceError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
}

#[instrument(skip_all, fields(job_id = %ctx.job_id, position = ctx.position, object = %ctx.label))]
async fn run_object_task<D, E, S>(ctx: ObjectTaskCtx<D, E, S>)
where
    D: ObjectDetector,
    E: ImageEnhancer,
    S: ImageStore,
{
    let started = Instant::now();
    match enrich_object(&ctx).await {
        Ok(terminal) => {
            metrics::counter!("enrichment_objects_completed").increment(1);
            metrics::histogram!("enrichment_object_seconds")
                .record(started.elapsed().as_secs_f64());
            info!(
                outcome = %terminal,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "object task finished"
            );
        }
        Err(err) => {
            metrics::counter!("enrichment_objects_failed").increment(1);
            warn!(error = %err, "object task failed");
            let reason = err.to_string();
            ctx.update(|o| {
                o.status = ObjectStage::Error;
                o.error_reason = Some(reason.clone());
            });
        }
    }
}

/// The per-object state machine: `detecting → (no_detection | cropping) →
/// enhancing → uploading → complete`. Any `Err` maps to the terminal
/// `error` state in the caller; fields recorded before the failure (the
/// crop URL in particular) stay visible to the client.
async fn enrich_object<D, E, S>(ctx: &ObjectTaskCtx<D, E, S>) -> Result<ObjectStage, TaskError>
where
    D: ObjectDetector,
    E: ImageEnhancer,
    S: ImageStore,
{
    ctx.set_stage(ObjectStage::Detecting);
    let detections = ctx.detector.detect(&ctx.image_bytes, &ctx.label).await?;

    if detections.is_empty() {
        info!("no detections for object, nothing to crop");
        ctx.update(|o| {
            o.detection_count = Some(0);
            o.status = ObjectStage::NoDetection;
        });
        return Ok(ObjectStage::NoDetection);
    }

    let best = detections[0].clone();
    let detection_count = detections.len();
    ctx.update(|o| {
        o.detection_count = Some(detection_count);
        o.confidence = Some(best.confidence);
        o.status = ObjectStage::Cropping;
    });

    let crop_jpeg = crop::crop_to_jpeg(&ctx.image, &best.bounding_box, ctx.crop_padding)?;

    // Persist the unenhanced crop before attempting enhancement, so the
    // user always has a usable image even if everything after this fails.
    let crop_key = format!("jobs/{}/object-{}-crop.jpg", ctx.job_id, ctx.position);
    let crop_url = ctx.storage.store(&crop_key, &crop_jpeg, "image/jpeg").await?;
    ctx.update(|o| {
        o.original_crop_image_url = Some(crop_url.clone());
        o.status = ObjectStage::Enhancing;
    });

    let final_jpeg = ctx.enhancer.enhance(&crop_jpeg).await?;
    ctx.set_stage(ObjectStage::Uploading);

    let key = format!("jobs/{}/object-{}.jpg", ctx.job_id, ctx.position);
    let url = ctx.storage.store(&key, &final_jpeg, "image/jpeg").await?;
    ctx.update(|o| {
        o.image_url = Some(url.clone());
        o.status = ObjectStage::Complete;
    });

    Ok(ObjectStage::Complete)
}
