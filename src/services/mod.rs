pub mod checkpoint;
pub mod output;
pub mod pipeline;
pub mod publish;
pub mod vision;

pub use checkpoint::{CheckpointStore, CheckpointSummary, ItemRecord, RunRecord};
pub use output::OutputWriter;
pub use pipeline::{ItemSummary, Pipeline, PublishOutcome, RunReport, RunStats};
pub use publish::{DestinationRef, DriveSink, LocalDirSink, StorageSink, create_sink};
pub use vision::{DEFAULT_SYSTEM_PROMPT, FactExtractor, OpenAiVision};
