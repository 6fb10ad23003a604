//! In-process `ClusterStore`.
//!
//! Keeps objects in maps keyed by identity and mimics the API server's
//! create and optimistic-concurrency semantics. Every call suspends once
//! after doing its work so concurrent passes interleave the way they do
//! against a remote store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{CronJob, CronJobStatus, Job, JobStatus};
use kube::Resource;
use tokio::sync::RwLock;

use super::{ClusterStore, CreateOutcome, StatusOutcome};
use crate::crd::{ClusterScan, ClusterScanStatus, ResourceId};
use crate::{Error, Result};

#[derive(Default)]
struct State {
    scans: BTreeMap<ResourceId, ClusterScan>,
    jobs: BTreeMap<ResourceId, Job>,
    cron_jobs: BTreeMap<ResourceId, CronJob>,
    version: u64,
    writes: usize,
}

impl State {
    /// Stamp a fresh resourceVersion (and a uid on first write)
    fn stamp<K: Resource>(&mut self, obj: &mut K) {
        self.version += 1;
        let meta = obj.meta_mut();
        meta.resource_version = Some(self.version.to_string());
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{}", self.version));
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare or overwrite a parent, as an external actor would
    pub async fn put_scan(&self, mut scan: ClusterScan) -> ClusterScan {
        let mut state = self.state.write().await;
        state.stamp(&mut scan);
        state.scans.insert(ResourceId::of(&scan), scan.clone());
        scan
    }

    pub async fn delete_scan(&self, id: &ResourceId) -> Option<ClusterScan> {
        self.state.write().await.scans.remove(id)
    }

    pub async fn scan(&self, id: &ResourceId) -> Option<ClusterScan> {
        self.state.read().await.scans.get(id).cloned()
    }

    pub async fn job(&self, id: &ResourceId) -> Option<Job> {
        self.state.read().await.jobs.get(id).cloned()
    }

    pub async fn cron_job(&self, id: &ResourceId) -> Option<CronJob> {
        self.state.read().await.cron_jobs.get(id).cloned()
    }

    pub async fn job_count(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn cron_job_count(&self) -> usize {
        self.state.read().await.cron_jobs.len()
    }

    /// Number of successful mutations made through the `ClusterStore` interface
    pub async fn writes(&self) -> usize {
        self.state.read().await.writes
    }

    /// Report a Job's status, as the orchestrator's job controller would
    pub async fn set_job_status(&self, id: &ResourceId, status: JobStatus) -> bool {
        let mut state = self.state.write().await;
        let State { jobs, version, .. } = &mut *state;
        match jobs.get_mut(id) {
            Some(job) => {
                *version += 1;
                job.status = Some(status);
                job.metadata.resource_version = Some(version.to_string());
                true
            }
            None => false,
        }
    }

    pub async fn set_cron_job_status(&self, id: &ResourceId, status: CronJobStatus) -> bool {
        let mut state = self.state.write().await;
        let State { cron_jobs, version, .. } = &mut *state;
        match cron_jobs.get_mut(id) {
            Some(cron_job) => {
                *version += 1;
                cron_job.status = Some(status);
                cron_job.metadata.resource_version = Some(version.to_string());
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get_scan(&self, id: &ResourceId) -> Result<Option<ClusterScan>> {
        let scan = self.state.read().await.scans.get(id).cloned();
        tokio::task::yield_now().await;
        Ok(scan)
    }

    async fn get_job(&self, id: &ResourceId) -> Result<Option<Job>> {
        let job = self.state.read().await.jobs.get(id).cloned();
        tokio::task::yield_now().await;
        Ok(job)
    }

    async fn get_cron_job(&self, id: &ResourceId) -> Result<Option<CronJob>> {
        let cron_job = self.state.read().await.cron_jobs.get(id).cloned();
        tokio::task::yield_now().await;
        Ok(cron_job)
    }

    async fn create_job(&self, job: &Job) -> Result<CreateOutcome<Job>> {
        let outcome = {
            let mut state = self.state.write().await;
            let id = ResourceId::of(job);
            if state.jobs.contains_key(&id) {
                CreateOutcome::AlreadyExists
            } else {
                let mut created = job.clone();
                state.stamp(&mut created);
                state.jobs.insert(id, created.clone());
                state.writes += 1;
                CreateOutcome::Created(created)
            }
        };
        tokio::task::yield_now().await;
        Ok(outcome)
    }

    async fn create_cron_job(&self, cron_job: &CronJob) -> Result<CreateOutcome<CronJob>> {
        let outcome = {
            let mut state = self.state.write().await;
            let id = ResourceId::of(cron_job);
            if state.cron_jobs.contains_key(&id) {
                CreateOutcome::AlreadyExists
            } else {
                let mut created = cron_job.clone();
                state.stamp(&mut created);
                state.cron_jobs.insert(id, created.clone());
                state.writes += 1;
                CreateOutcome::Created(created)
            }
        };
        tokio::task::yield_now().await;
        Ok(outcome)
    }

    async fn replace_cron_job(&self, cron_job: &CronJob) -> Result<CronJob> {
        let replaced = {
            let mut state = self.state.write().await;
            let id = ResourceId::of(cron_job);
            let current = state
                .cron_jobs
                .get(&id)
                .ok_or_else(|| Error::Internal(format!("cronjob {} not found", id)))?;
            if current.metadata.resource_version != cron_job.metadata.resource_version {
                return Err(Error::Internal(format!("cronjob {} was modified concurrently", id)));
            }
            let mut replaced = cron_job.clone();
            replaced.status = current.status.clone();
            state.stamp(&mut replaced);
            state.cron_jobs.insert(id, replaced.clone());
            state.writes += 1;
            replaced
        };
        tokio::task::yield_now().await;
        Ok(replaced)
    }

    async fn update_scan_status(
        &self,
        scan: &ClusterScan,
        status: &ClusterScanStatus,
    ) -> Result<StatusOutcome> {
        let outcome = {
            let mut state = self.state.write().await;
            let id = ResourceId::of(scan);
            let State { scans, version, writes, .. } = &mut *state;
            let current = scans
                .get_mut(&id)
                .ok_or_else(|| Error::Internal(format!("clusterscan {} not found", id)))?;

            if scan.metadata.resource_version.is_some()
                && current.metadata.resource_version != scan.metadata.resource_version
            {
                StatusOutcome::Conflict
            } else {
                *version += 1;
                *writes += 1;
                // Replaced wholesale, as a status PUT does
                current.status = Some(status.clone());
                current.metadata.resource_version = Some(version.to_string());
                StatusOutcome::Updated
            }
        };
        tokio::task::yield_now().await;
        Ok(outcome)
    }
}
