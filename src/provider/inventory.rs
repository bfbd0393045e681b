//! Volume listing from a JSON inventory file.
//!
//! The file holds a `DescribeVolumes` response body and is re-read on every
//! poll, so an external process (or an operator) can refresh it in place.

use std::path::PathBuf;

use super::VolumeProvider;
use super::aws_cli::parse_describe_volumes;
use super::error::ProviderError;
use crate::types::VolumeSnapshot;

/// Reads volume listings from a file.
#[derive(Debug, Clone)]
pub struct InventoryFileProvider {
    path: PathBuf,
}

impl InventoryFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        InventoryFileProvider { path: path.into() }
    }

    async fn read(&self) -> Result<Vec<u8>, ProviderError> {
        tokio::fs::read(&self.path).await.map_err(|e| {
            let message = format!("failed to read {}: {}", self.path.display(), e);
            let err = match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ProviderError::terminal(message)
                }
                _ => ProviderError::transient(message),
            };
            err.with_source(e)
        })
    }
}

impl VolumeProvider for InventoryFileProvider {
    async fn describe_volumes(&self) -> Result<Vec<VolumeSnapshot>, ProviderError> {
        let body = self.read().await?;
        parse_describe_volumes(&body)
    }

    async fn check_session(&self) -> Result<(), ProviderError> {
        self.read().await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderErrorKind;
    use crate::types::AttachmentToken;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reads_listing_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("volumes.json");
        std::fs::write(
            &path,
            r#"{"Volumes": [{"VolumeId": "vol-9", "AvailabilityZone": "eu-west-1b", "Attachments": [{"State": "detaching"}]}]}"#,
        )
        .unwrap();

        let provider = InventoryFileProvider::new(&path);
        provider.check_session().await.unwrap();

        let volumes = provider.describe_volumes().await.unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].attachments[0].state, AttachmentToken::Detaching);
    }

    #[tokio::test]
    async fn rereads_on_every_call() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("volumes.json");
        std::fs::write(&path, r#"{"Volumes": []}"#).unwrap();

        let provider = InventoryFileProvider::new(&path);
        assert!(provider.describe_volumes().await.unwrap().is_empty());

        std::fs::write(
            &path,
            r#"{"Volumes": [{"VolumeId": "vol-1", "AvailabilityZone": "us-east-1a"}]}"#,
        )
        .unwrap();
        assert_eq!(provider.describe_volumes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_terminal() {
        let dir = tempdir().unwrap();
        let provider = InventoryFileProvider::new(dir.path().join("absent.json"));

        let err = provider.check_session().await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Terminal);
    }
}
