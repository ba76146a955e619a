use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the object-localization API
    pub detect_api_url: String,

    /// API token for the object-localization API
    pub detect_api_key: String,

    /// Base URL of the image-edit API
    pub enhance_api_url: String,

    /// API token for the image-edit API
    pub enhance_api_key: String,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// Public base URL under which stored objects are served
    pub r2_public_base_url: String,

    /// Candidates promoted to enrichment tasks per job
    #[serde(default = "default_max_objects_per_job")]
    pub max_objects_per_job: usize,

    /// Padding added around each detection box before cropping, in pixels
    #[serde(default = "default_crop_padding_px")]
    pub crop_padding_px: u32,

    /// Longest edge of the final enhanced image
    #[serde(default = "default_enhanced_max_dim")]
    pub enhanced_max_dim: u32,

    /// Attempts against the image-edit API before falling back
    #[serde(default = "default_enhance_max_attempts")]
    pub enhance_max_attempts: u32,

    /// Wall-clock budget for a whole job, in seconds
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// How long completed jobs stay queryable before eviction, in seconds
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: i64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_objects_per_job() -> usize {
    3
}

fn default_crop_padding_px() -> u32 {
    20
}

fn default_enhanced_max_dim() -> u32 {
    512
}

fn default_enhance_max_attempts() -> u32 {
    3
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_job_retention_secs() -> i64 {
    600
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
