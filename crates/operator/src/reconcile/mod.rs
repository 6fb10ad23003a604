//! Convergence engine for `ClusterScan`.
//!
//! A pass is level-triggered: it re-reads the parent and both children from
//! the store, creates whatever is missing, and projects child status back
//! onto the parent. The probe before each create is the only de-duplication
//! point, and a lost create race counts as success. The engine holds no
//! locks and caches nothing between passes; the dispatcher guarantees at
//! most one in-flight pass per identity.

pub mod status;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use tracing::{debug, info, warn};

use crate::config::{DriftPolicy, ReconcileConfig};
use crate::crd::{ClusterScan, ClusterScanStatus, ResourceId};
use crate::desired::{self, recorded_hash};
use crate::metrics::{CHILDREN_CREATED_TOTAL, CREATE_RACES_TOTAL, STATUS_WRITE_FAILURES_TOTAL};
use crate::store::{ClusterStore, CreateOutcome, StatusOutcome};
use crate::{Error, Result};

/// What the dispatcher should do with an identity after a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Converged; wait for the next change notification
    Done,
    /// Run another pass right away
    Requeue,
    RequeueAfter(Duration),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Done => "done",
            Outcome::Requeue => "requeue",
            Outcome::RequeueAfter(_) => "requeue_after",
        }
    }
}

/// A child as left by this pass
#[derive(Debug)]
enum Child<T> {
    Observed(T),
    Created(T),
    /// Create lost to a concurrent writer; contents unknown until the next pass
    Raced,
}

impl<T> Child<T> {
    fn object(&self) -> Option<&T> {
        match self {
            Child::Observed(obj) | Child::Created(obj) => Some(obj),
            Child::Raced => None,
        }
    }

    fn needs_redrive(&self) -> bool {
        !matches!(self, Child::Observed(_))
    }
}

pub struct Reconciler {
    store: Arc<dyn ClusterStore>,
    drift_policy: DriftPolicy,
    status_retry: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ClusterStore>, config: &ReconcileConfig) -> Self {
        Self {
            store,
            drift_policy: config.drift_policy,
            status_retry: config.status_retry(),
        }
    }

    pub async fn reconcile(&self, id: &ResourceId) -> Result<Outcome> {
        let scan = match self.store.get_scan(id).await? {
            Some(scan) => scan,
            None => {
                debug!("ClusterScan {} not found, nothing to converge", id);
                return Ok(Outcome::Done);
            }
        };

        let desired = match desired::generate(&scan) {
            Ok(desired) => desired,
            Err(Error::Validation(reason)) => return Ok(self.reject(id, &scan, &reason).await),
            Err(e) => return Err(e),
        };

        // Children the API server refuses are as persistent as a bad spec
        let job = match self.ensure_job(desired.job).await {
            Ok(job) => job,
            Err(Error::Validation(reason)) => return Ok(self.reject(id, &scan, &reason).await),
            Err(e) => return Err(e),
        };
        let cron_job = match self.ensure_cron_job(desired.cron_job).await {
            Ok(cron_job) => cron_job,
            Err(Error::Validation(reason)) => return Ok(self.reject(id, &scan, &reason).await),
            Err(e) => return Err(e),
        };

        let status = status::project(&scan, job.object(), cron_job.object(), Utc::now());
        let status_outcome = self.persist_status(id, &scan, status).await;

        if job.needs_redrive() || cron_job.needs_redrive() {
            return Ok(Outcome::Requeue);
        }
        Ok(status_outcome)
    }

    async fn ensure_job(&self, desired: Job) -> Result<Child<Job>> {
        let id = ResourceId::of(&desired);

        if let Some(existing) = self.store.get_job(&id).await? {
            if recorded_hash(&existing) != recorded_hash(&desired) {
                // Job pod templates are immutable, so drift is only reported
                info!("Job {} no longer matches its ClusterScan; leaving it in place", id);
            }
            debug!("Skip create: Job {} already exists", id);
            return Ok(Child::Observed(existing));
        }

        info!("Creating a new Job {}", id);
        match self.store.create_job(&desired).await? {
            CreateOutcome::Created(job) => {
                CHILDREN_CREATED_TOTAL.with_label_values(&["Job"]).inc();
                Ok(Child::Created(job))
            }
            CreateOutcome::AlreadyExists => {
                CREATE_RACES_TOTAL.with_label_values(&["Job"]).inc();
                warn!("Job {} was created concurrently; treating as created", id);
                Ok(Child::Raced)
            }
        }
    }

    async fn ensure_cron_job(&self, desired: CronJob) -> Result<Child<CronJob>> {
        let id = ResourceId::of(&desired);

        if let Some(existing) = self.store.get_cron_job(&id).await? {
            let drifted = recorded_hash(&existing) != recorded_hash(&desired);
            if drifted && self.drift_policy == DriftPolicy::Update {
                info!("CronJob {} no longer matches its ClusterScan, replacing it", id);
                let mut replacement = desired;
                replacement.metadata.resource_version = existing.metadata.resource_version.clone();
                replacement.metadata.uid = existing.metadata.uid.clone();
                let replaced = self.store.replace_cron_job(&replacement).await?;
                return Ok(Child::Observed(replaced));
            }
            if drifted {
                debug!("CronJob {} drifted from its ClusterScan; drift policy is ignore", id);
            }
            debug!("Skip create: CronJob {} already exists", id);
            return Ok(Child::Observed(existing));
        }

        info!("Creating a new CronJob {}", id);
        match self.store.create_cron_job(&desired).await? {
            CreateOutcome::Created(cron_job) => {
                CHILDREN_CREATED_TOTAL.with_label_values(&["CronJob"]).inc();
                Ok(Child::Created(cron_job))
            }
            CreateOutcome::AlreadyExists => {
                CREATE_RACES_TOTAL.with_label_values(&["CronJob"]).inc();
                warn!("CronJob {} was created concurrently; treating as created", id);
                Ok(Child::Raced)
            }
        }
    }

    /// Report a spec that cannot converge. Retrying cannot help, so the pass
    /// ends here and waits for the parent to change.
    async fn reject(&self, id: &ResourceId, scan: &ClusterScan, reason: &str) -> Outcome {
        warn!("ClusterScan {} has an invalid spec: {}", id, reason);
        let status = status::project_invalid(scan, reason, Utc::now());
        self.persist_status(id, scan, status).await
    }

    /// Best-effort status write. Failures never fail the pass; they only
    /// schedule a later retry.
    async fn persist_status(
        &self,
        id: &ResourceId,
        scan: &ClusterScan,
        status: ClusterScanStatus,
    ) -> Outcome {
        if !status::needs_write(scan, &status) {
            return Outcome::Done;
        }

        match self.store.update_scan_status(scan, &status).await {
            Ok(StatusOutcome::Updated) => {
                debug!("Updated status of ClusterScan {}", id);
                Outcome::Done
            }
            Ok(StatusOutcome::Conflict) => {
                STATUS_WRITE_FAILURES_TOTAL.inc();
                warn!("Status of ClusterScan {} changed concurrently, retrying later", id);
                Outcome::RequeueAfter(self.status_retry)
            }
            Err(e) => {
                STATUS_WRITE_FAILURES_TOTAL.inc();
                warn!("Failed to update status of ClusterScan {}: {}", id, e);
                Outcome::RequeueAfter(self.status_retry)
            }
        }
    }
}
