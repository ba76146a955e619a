use std::sync::Arc;

use crate::services::detection::DetectApiClient;
use crate::services::enhance::{EnhanceApiClient, EnhancementService};
use crate::services::pipeline::EnrichmentPipeline;
use crate::services::status_store::StatusStore;
use crate::services::storage::R2Client;

/// The enrichment pipeline wired with the production adapters.
pub type ProductionPipeline =
    EnrichmentPipeline<DetectApiClient, EnhancementService<EnhanceApiClient>, R2Client>;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ProductionPipeline>,
    pub store: Arc<dyn StatusStore>,
}

impl AppState {
    pub fn new(pipeline: ProductionPipeline, store: Arc<dyn StatusStore>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            store,
        }
    }
}
