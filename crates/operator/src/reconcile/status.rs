//! Projects observed child state onto the parent's status sub-object.

use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::{CronJob, Job};

use crate::crd::common::{CONDITION_READY, STATUS_FALSE, STATUS_TRUE};
use crate::crd::{set_condition, ClusterScan, ClusterScanStatus, Condition};

pub const REASON_CHILDREN_PRESENT: &str = "ChildrenPresent";
pub const REASON_CONVERGING: &str = "Converging";
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";

/// Status after a pass that observed (or created) the given children.
///
/// A child that is unknown this pass keeps its previously projected status.
pub fn project(
    scan: &ClusterScan,
    job: Option<&Job>,
    cron_job: Option<&CronJob>,
    now: DateTime<Utc>,
) -> ClusterScanStatus {
    let mut status = scan.status.clone().unwrap_or_default();

    if let Some(job) = job {
        status.job_status = job.status.clone();
    }
    if let Some(cron_job) = cron_job {
        status.cron_job_status = cron_job.status.clone();
    }

    let ready = match (job, cron_job) {
        (Some(_), Some(_)) => Condition::new(
            CONDITION_READY,
            STATUS_TRUE,
            REASON_CHILDREN_PRESENT,
            "Job and CronJob are present",
            now,
        ),
        _ => Condition::new(
            CONDITION_READY,
            STATUS_FALSE,
            REASON_CONVERGING,
            "Waiting for child resources to be observed",
            now,
        ),
    };
    set_condition(&mut status.conditions, ready);
    status.observed_generation = scan.metadata.generation;
    status
}

/// Status for a parent whose spec cannot produce children
pub fn project_invalid(scan: &ClusterScan, message: &str, now: DateTime<Utc>) -> ClusterScanStatus {
    let mut status = scan.status.clone().unwrap_or_default();
    set_condition(
        &mut status.conditions,
        Condition::new(CONDITION_READY, STATUS_FALSE, REASON_INVALID_SPEC, message, now),
    );
    status.observed_generation = scan.metadata.generation;
    status
}

/// Whether `status` differs from what the parent already carries
pub fn needs_write(scan: &ClusterScan, status: &ClusterScanStatus) -> bool {
    scan.status.as_ref() != Some(status)
}
