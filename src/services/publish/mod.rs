//! Publishing the output file to a storage destination.
//!
//! Publishing happens after the items of a run are processed. A failed
//! publish is reported but never touches the checkpoint or the local file,
//! which stays authoritative.

mod drive;
mod local;

pub use drive::DriveSink;
pub use local::LocalDirSink;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::models::{PublishConfig, SinkKind};

/// Where a published file ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRef {
    /// Sink that stored the file (`local`, `drive`)
    pub sink: String,
    /// File name at the destination
    pub name: String,
    /// Destination-specific identifier (path or remote file id)
    pub id: String,
    /// Link for humans, when the destination has one
    pub url: Option<String>,
}

impl fmt::Display for DestinationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "{}:{} ({})", self.sink, self.name, url),
            None => write!(f, "{}:{}", self.sink, self.id),
        }
    }
}

/// Trait for publish destinations.
///
/// Publishing the same file name twice overwrites the earlier copy.
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Upload or copy `local_path` to the destination.
    async fn publish(&self, local_path: &Path) -> Result<DestinationRef, PublishError>;
}

/// Remote file name for a local path, honouring an explicit override.
pub(crate) fn remote_name(local_path: &Path, configured: Option<&str>) -> Result<String, PublishError> {
    if let Some(name) = configured.filter(|n| !n.is_empty()) {
        return Ok(name.to_string());
    }
    local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PublishError::MissingFile(local_path.display().to_string()))
}

/// Create the sink selected in configuration, or `None` when publishing is off.
pub fn create_sink(config: &PublishConfig) -> Result<Option<Box<dyn StorageSink>>, PublishError> {
    match config.sink {
        SinkKind::None => Ok(None),
        SinkKind::Local => {
            let dir = config.dir.clone().ok_or_else(|| {
                PublishError::ServiceError("publish.dir is not set".to_string())
            })?;
            Ok(Some(Box::new(LocalDirSink::new(
                dir,
                config.remote_name.clone(),
            ))))
        }
        SinkKind::Drive => Ok(Some(Box::new(DriveSink::new(config)?))),
    }
}
