mod config;
mod format;
mod product;
mod state;

pub use config::{
    Config, DEFAULT_DRIVE_API_URL, DEFAULT_DRIVE_UPLOAD_URL, DEFAULT_SEARCH_URL,
    DEFAULT_VISION_MODEL, DEFAULT_VISION_URL, ENV_DRIVE_FOLDER, ENV_DRIVE_TOKEN, ENV_SEARCH_KEY,
    ENV_VISION_KEY, OutputConfig, PipelineConfig, PublishConfig, RetryConfig, RunConfiguration,
    RunOverrides, SearchConfig, SinkKind, VisionConfig,
};
pub use format::OutputFormat;
pub use product::{
    ExtractedFact, ImageRef, OutputRow, ProductCandidate, ProductDetail, is_valid_product_id,
};
pub use state::{FailureKind, FailureReason, ItemState, Outcome, Stage};
