mod cluster;
pub mod memory;

pub use cluster::KubeStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{CronJob, Job};

#[cfg(test)]
use mockall::automock;

use crate::crd::{ClusterScan, ClusterScanStatus, ResourceId};

/// Result of submitting a new object
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome<T> {
    Created(T),
    /// Another writer created the object first
    AlreadyExists,
}

/// Result of writing a status sub-object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Updated,
    /// The object changed since it was read
    Conflict,
}

/// Identity-addressed access to the cluster's object store.
///
/// Absence is `Ok(None)` and a lost create race is
/// `CreateOutcome::AlreadyExists`; only genuine failures are errors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_scan(&self, id: &ResourceId) -> crate::Result<Option<ClusterScan>>;

    async fn get_job(&self, id: &ResourceId) -> crate::Result<Option<Job>>;

    async fn get_cron_job(&self, id: &ResourceId) -> crate::Result<Option<CronJob>>;

    async fn create_job(&self, job: &Job) -> crate::Result<CreateOutcome<Job>>;

    async fn create_cron_job(&self, cron_job: &CronJob) -> crate::Result<CreateOutcome<CronJob>>;

    /// Replace an existing CronJob; `cron_job` carries the resourceVersion it was read at
    async fn replace_cron_job(&self, cron_job: &CronJob) -> crate::Result<CronJob>;

    /// Write `status` onto `scan`, guarded by the resourceVersion `scan` was read at
    async fn update_scan_status(
        &self,
        scan: &ClusterScan,
        status: &ClusterScanStatus,
    ) -> crate::Result<StatusOutcome>;
}
