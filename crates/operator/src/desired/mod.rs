//! Desired-state generation.
//!
//! Maps a `ClusterScan` onto the Job and CronJob it should own. Pure: no I/O,
//! no clock, no randomness, so identical parents always yield identical
//! children.

pub mod schedule;

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::crd::{ClusterScan, ResourceId};
use crate::{Error, Result};

pub use schedule::{validate_schedule, validate_time_zone};

pub const JOB_SUFFIX: &str = "job";
pub const CRON_JOB_SUFFIX: &str = "cronjob";

pub const SCAN_LABEL: &str = "batch.my.domain/scan";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGER_NAME: &str = "clusterscan-operator";
pub const TEMPLATE_HASH_ANNOTATION: &str = "batch.my.domain/template-hash";

const DEFAULT_RESTART_POLICY: &str = "OnFailure";
const CONCURRENCY_POLICIES: &[&str] = &["Allow", "Forbid", "Replace"];

#[derive(Debug, Clone, PartialEq)]
pub struct DesiredChildren {
    pub job: Job,
    pub cron_job: CronJob,
}

pub fn job_id(parent: &ResourceId) -> ResourceId {
    parent.child(JOB_SUFFIX)
}

pub fn cron_job_id(parent: &ResourceId) -> ResourceId {
    parent.child(CRON_JOB_SUFFIX)
}

/// Labels that make every child discoverable by its parent's name
pub fn child_labels(parent_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), parent_name.to_string()),
        (SCAN_LABEL.to_string(), parent_name.to_string()),
        (MANAGED_BY_LABEL.to_string(), MANAGER_NAME.to_string()),
    ])
}

/// The template hash recorded on a child, if any
pub fn recorded_hash<K: Resource>(child: &K) -> Option<&str> {
    child
        .meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(TEMPLATE_HASH_ANNOTATION))
        .map(String::as_str)
}

pub fn generate(scan: &ClusterScan) -> Result<DesiredChildren> {
    let namespace = scan
        .namespace()
        .ok_or_else(|| Error::Validation("ClusterScan must be namespaced".into()))?;
    let parent = ResourceId::new(namespace, scan.name_any());

    validate_schedule(&scan.spec.schedule)?;
    validate_concurrency_policy(scan.spec.concurrency_policy.as_deref())?;
    if let Some(zone) = scan.spec.time_zone.as_deref() {
        validate_time_zone(zone)?;
    }

    let mut pod_template = scan.spec.job_template.clone();
    let pod_spec = pod_template
        .spec
        .as_mut()
        .filter(|spec| !spec.containers.is_empty())
        .ok_or_else(|| Error::Validation("jobTemplate must declare at least one container".into()))?;

    match pod_spec.restart_policy.as_deref() {
        None => pod_spec.restart_policy = Some(DEFAULT_RESTART_POLICY.to_string()),
        Some("OnFailure") | Some("Never") => {}
        Some(other) => {
            return Err(Error::Validation(format!(
                "restartPolicy '{}' is not valid for jobs, use OnFailure or Never",
                other
            )))
        }
    }

    let labels = child_labels(&parent.name);
    let owner_references = scan.controller_owner_ref(&()).map(|owner| vec![owner]);

    let job_spec = JobSpec {
        template: pod_template,
        backoff_limit: scan.spec.backoff_limit,
        ..Default::default()
    };

    let cron_job_spec = CronJobSpec {
        schedule: scan.spec.schedule.clone(),
        suspend: scan.spec.suspend,
        concurrency_policy: scan.spec.concurrency_policy.clone(),
        time_zone: scan.spec.time_zone.clone(),
        successful_jobs_history_limit: scan.spec.successful_jobs_history_limit,
        failed_jobs_history_limit: scan.spec.failed_jobs_history_limit,
        job_template: JobTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels.clone()),
                ..Default::default()
            }),
            spec: Some(job_spec.clone()),
        },
        ..Default::default()
    };

    let job = Job {
        metadata: child_meta(&job_id(&parent), &labels, &owner_references, template_hash(&job_spec)?),
        spec: Some(job_spec),
        status: None,
    };

    let cron_job = CronJob {
        metadata: child_meta(
            &cron_job_id(&parent),
            &labels,
            &owner_references,
            template_hash(&cron_job_spec)?,
        ),
        spec: Some(cron_job_spec),
        status: None,
    };

    Ok(DesiredChildren { job, cron_job })
}

fn validate_concurrency_policy(policy: Option<&str>) -> Result<()> {
    match policy {
        Some(p) if !CONCURRENCY_POLICIES.contains(&p) => Err(Error::Validation(format!(
            "concurrencyPolicy '{}' must be one of {}",
            p,
            CONCURRENCY_POLICIES.join(", ")
        ))),
        _ => Ok(()),
    }
}

fn child_meta(
    id: &ResourceId,
    labels: &BTreeMap<String, String>,
    owner_references: &Option<Vec<OwnerReference>>,
    hash: String,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(id.name.clone()),
        namespace: Some(id.namespace.clone()),
        labels: Some(labels.clone()),
        annotations: Some(BTreeMap::from([(TEMPLATE_HASH_ANNOTATION.to_string(), hash)])),
        owner_references: owner_references.clone(),
        ..Default::default()
    }
}

/// SHA-256 over the JSON form of a child spec. Maps serialize in key order,
/// so the hash is stable across runs.
fn template_hash<T: Serialize>(spec: &T) -> Result<String> {
    let bytes = serde_json::to_vec(spec)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
