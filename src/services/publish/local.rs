use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{DestinationRef, StorageSink, remote_name};
use crate::error::PublishError;

/// Copies the output file into a directory, e.g. a mounted persistent disk.
#[derive(Debug, Clone)]
pub struct LocalDirSink {
    dir: PathBuf,
    remote_name: Option<String>,
}

impl LocalDirSink {
    pub fn new(dir: impl Into<PathBuf>, remote_name: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            remote_name,
        }
    }
}

#[async_trait]
impl StorageSink for LocalDirSink {
    fn name(&self) -> &str {
        "local"
    }

    async fn publish(&self, local_path: &Path) -> Result<DestinationRef, PublishError> {
        if !tokio::fs::try_exists(local_path).await.unwrap_or(false) {
            return Err(PublishError::MissingFile(local_path.display().to_string()));
        }

        let name = remote_name(local_path, self.remote_name.as_deref())?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.dir.join(&name);

        let same_file = match (
            tokio::fs::canonicalize(local_path).await,
            tokio::fs::canonicalize(&target).await,
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !same_file {
            tokio::fs::copy(local_path, &target).await?;
        }

        tracing::debug!(path = %target.display(), "copied output file");
        Ok(DestinationRef {
            sink: self.name().to_string(),
            name,
            id: target.display().to_string(),
            url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_overwrites_by_name() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("facts.csv");
        let target_dir = dir.path().join("published");

        let sink = LocalDirSink::new(&target_dir, None);
        std::fs::write(&source, "first").unwrap();
        sink.publish(&source).await.unwrap();
        std::fs::write(&source, "second").unwrap();
        let dest = sink.publish(&source).await.unwrap();

        assert_eq!(dest.name, "facts.csv");
        assert_eq!(
            std::fs::read_to_string(target_dir.join("facts.csv")).unwrap(),
            "second"
        );
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let sink = LocalDirSink::new(dir.path(), None);
        let err = sink
            .publish(&dir.path().join("missing.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::MissingFile(_)));
    }
}
