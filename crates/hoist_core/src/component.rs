//! Seams to the outside world: component installers, the handle factory they
//! share, and the durable record store.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CoreResult;
use crate::progress::ProgressReporter;
use crate::state::InstallationRecord;

/// Trait for component installer implementations.
///
/// An installer reports progress through the [`ProgressReporter`] it is
/// given and returns once the component is installed or has failed. It is
/// expected to watch the cancellation token and unwind early; timeouts and
/// retries are its own business.
///
/// # Example
///
/// ```rust,ignore
/// struct Registry;
///
/// #[async_trait]
/// impl ComponentInstaller<ClusterHandles> for Registry {
///     fn name(&self) -> &str { "registry" }
///
///     async fn install(
///         &self,
///         handles: &ClusterHandles,
///         progress: &ProgressReporter,
///         cancel: &CancellationToken,
///     ) -> CoreResult<()> {
///         progress.running("Deploying").await;
///         handles.helm.install("registry").await?;
///         progress.succeeded("Ready").await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ComponentInstaller<H>: Send + Sync {
    /// Unique component name, used as the status key.
    fn name(&self) -> &str;

    /// Install the component.
    async fn install(
        &self,
        handles: &H,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> CoreResult<()>;
}

/// Builds the client/handle set shared by all installers.
#[async_trait]
pub trait HandleFactory<H>: Send + Sync {
    async fn build(&self) -> CoreResult<H>;
}

/// Durable store for the final installation record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn persist(&self, record: &InstallationRecord) -> CoreResult<()>;
}
