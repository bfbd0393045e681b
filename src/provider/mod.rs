//! Volume providers: where listings come from.
//!
//! The poll loop only depends on the [`VolumeProvider`] trait. Two
//! implementations are provided:
//! - [`AwsCliProvider`]: `aws ec2 describe-volumes` through the AWS CLI
//! - [`InventoryFileProvider`]: a `DescribeVolumes`-shaped JSON file
//!
//! Errors carry an explicit [`ProviderErrorKind`] that the poll loop
//! switches on.

mod aws_cli;
mod error;
mod inventory;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use aws_cli::{AwsCliProvider, parse_describe_volumes};
pub use error::{ProviderError, ProviderErrorKind};
pub use inventory::InventoryFileProvider;

use crate::types::VolumeSnapshot;

/// A source of volume listings.
///
/// # Example (mock for testing)
///
/// ```ignore
/// struct FixedProvider(Vec<VolumeSnapshot>);
///
/// impl VolumeProvider for FixedProvider {
///     async fn describe_volumes(&self) -> Result<Vec<VolumeSnapshot>, ProviderError> {
///         Ok(self.0.clone())
///     }
///
///     async fn check_session(&self) -> Result<(), ProviderError> {
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "fixed"
///     }
/// }
/// ```
pub trait VolumeProvider: Send + Sync {
    /// Returns the complete current listing of volumes.
    fn describe_volumes(
        &self,
    ) -> impl Future<Output = Result<Vec<VolumeSnapshot>, ProviderError>> + Send;

    /// Verifies that the provider can be reached with the configured
    /// credentials. Called once at startup.
    fn check_session(&self) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

impl<P: VolumeProvider> VolumeProvider for Arc<P> {
    async fn describe_volumes(&self) -> Result<Vec<VolumeSnapshot>, ProviderError> {
        (**self).describe_volumes().await
    }

    async fn check_session(&self) -> Result<(), ProviderError> {
        (**self).check_session().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Runs a provider call, failing with a transient error after `limit`.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::timeout(limit)),
    }
}

/// The provider selected at startup.
#[derive(Debug, Clone)]
pub enum AnyProvider {
    AwsCli(AwsCliProvider),
    File(InventoryFileProvider),
}

impl VolumeProvider for AnyProvider {
    async fn describe_volumes(&self) -> Result<Vec<VolumeSnapshot>, ProviderError> {
        match self {
            AnyProvider::AwsCli(p) => p.describe_volumes().await,
            AnyProvider::File(p) => p.describe_volumes().await,
        }
    }

    async fn check_session(&self) -> Result<(), ProviderError> {
        match self {
            AnyProvider::AwsCli(p) => p.check_session().await,
            AnyProvider::File(p) => p.check_session().await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AnyProvider::AwsCli(p) => p.name(),
            AnyProvider::File(p) => p.name(),
        }
    }
}
