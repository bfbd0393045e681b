//! Volume listing through the AWS CLI.
//!
//! Runs `aws ec2 describe-volumes --output json` and parses its stdout. The
//! CLI handles credentials, regions and pagination, so the monitor only needs
//! the binary on `PATH`. The child process is killed if the call is dropped,
//! which is how timeouts and shutdown cancel an in-flight listing.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::VolumeProvider;
use super::error::ProviderError;
use crate::types::{VolumeListing, VolumeSnapshot};

/// Default name of the AWS CLI binary.
const DEFAULT_AWS_BIN: &str = "aws";

/// Lists volumes by shelling out to the AWS CLI.
#[derive(Debug, Clone)]
pub struct AwsCliProvider {
    /// Path or name of the `aws` binary.
    binary: String,

    /// Region override (`--region`). Defaults to the CLI's configuration.
    region: Option<String>,

    /// Named profile (`--profile`). Defaults to the CLI's configuration.
    profile: Option<String>,
}

impl Default for AwsCliProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AwsCliProvider {
    pub fn new() -> Self {
        AwsCliProvider {
            binary: DEFAULT_AWS_BIN.to_string(),
            region: None,
            profile: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    /// Builds the argument list for one CLI call.
    fn args(&self, service: &str, operation: &str) -> Vec<String> {
        let mut args = vec![
            service.to_string(),
            operation.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }

    /// Runs the CLI and returns stdout, or a categorised error.
    async fn run(&self, service: &str, operation: &str) -> Result<Vec<u8>, ProviderError> {
        let args = self.args(service, operation);
        debug!(binary = %self.binary, ?args, "Running AWS CLI");

        let output = Command::new(&self.binary)
            .args(&args)
            .env("AWS_PAGER", "")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ProviderError::terminal(format!("failed to run {}: {}", self.binary, e)).with_source(e)
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::from_aws_cli_stderr(&stderr));
        }

        Ok(output.stdout)
    }
}

/// Parses a `DescribeVolumes` JSON body.
pub fn parse_describe_volumes(body: &[u8]) -> Result<Vec<VolumeSnapshot>, ProviderError> {
    let listing: VolumeListing = serde_json::from_slice(body).map_err(|e| {
        ProviderError::unknown(format!("malformed describe-volumes output: {}", e)).with_source(e)
    })?;
    Ok(listing.volumes)
}

impl VolumeProvider for AwsCliProvider {
    async fn describe_volumes(&self) -> Result<Vec<VolumeSnapshot>, ProviderError> {
        let stdout = self.run("ec2", "describe-volumes").await?;
        parse_describe_volumes(&stdout)
    }

    async fn check_session(&self) -> Result<(), ProviderError> {
        self.run("sts", "get-caller-identity").await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "aws-cli"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderErrorKind;

    #[test]
    fn args_include_overrides() {
        let provider = AwsCliProvider::new()
            .with_region(Some("us-east-1".to_string()))
            .with_profile(Some("ops".to_string()));

        assert_eq!(
            provider.args("ec2", "describe-volumes"),
            vec![
                "ec2",
                "describe-volumes",
                "--output",
                "json",
                "--region",
                "us-east-1",
                "--profile",
                "ops"
            ]
        );
    }

    #[test]
    fn args_without_overrides() {
        assert_eq!(
            AwsCliProvider::new().args("sts", "get-caller-identity"),
            vec!["sts", "get-caller-identity", "--output", "json"]
        );
    }

    #[test]
    fn parses_cli_output() {
        let body = br#"{"Volumes": [{"VolumeId": "vol-1", "AvailabilityZone": "us-east-1a", "Attachments": [{"State": "attaching"}]}]}"#;
        let volumes = parse_describe_volumes(body).unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].volume_id, "vol-1");
    }

    #[test]
    fn malformed_output_is_unknown_error() {
        let err = parse_describe_volumes(b"not json").unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unknown);
    }

    #[tokio::test]
    async fn missing_binary_is_terminal() {
        let provider = AwsCliProvider::new().with_binary("/nonexistent/aws-cli-binary");
        let err = provider.describe_volumes().await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Terminal);
    }
}
