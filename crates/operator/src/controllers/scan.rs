use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::{
    api::Api,
    runtime::{controller::{Action, Controller}, watcher::Config},
    Client, ResourceExt,
};
use tracing::{debug, error, info};

use crate::{
    config::{KubeConfig, ReconcileConfig},
    crd::{ClusterScan, ResourceId},
    metrics::{RECONCILE_DURATION_SECONDS, RECONCILE_TOTAL},
    reconcile::{Outcome, Reconciler},
    Error, Result,
};

pub struct ScanController {
    client: Client,
    reconciler: Reconciler,
    namespace: Option<String>,
    error_requeue: Duration,
}

impl ScanController {
    pub fn new(
        client: Client,
        reconciler: Reconciler,
        kube: &KubeConfig,
        reconcile: &ReconcileConfig,
    ) -> Self {
        Self {
            client,
            reconciler,
            namespace: kube.namespace.clone(),
            error_requeue: reconcile.error_requeue(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    pub async fn run(self: Arc<Self>) {
        match &self.namespace {
            Some(ns) => info!("Starting ClusterScan controller in namespace {}", ns),
            None => info!("Starting ClusterScan controller for all namespaces"),
        }

        let scans: Api<ClusterScan> = self.api();
        let jobs: Api<Job> = self.api();
        let cron_jobs: Api<CronJob> = self.api();

        // Child changes map back to the owning ClusterScan, so status
        // projection follows the orchestrator without polling
        Controller::new(scans, Config::default())
            .owns(jobs, Config::default())
            .owns(cron_jobs, Config::default())
            .shutdown_on_signal()
            .run(Self::reconcile, Self::error_policy, self)
            .for_each(|res| async move {
                match res {
                    Ok((obj, action)) => debug!("Reconciled {}: {:?}", obj.name, action),
                    Err(e) => error!("Reconciliation error: {}", e),
                }
            })
            .await;

        info!("ClusterScan controller stopped");
    }

    /// Only the identity of the notified object is used; the pass re-reads
    /// everything else from the store.
    async fn reconcile(scan: Arc<ClusterScan>, ctx: Arc<Self>) -> Result<Action> {
        let id = ResourceId::of(scan.as_ref());
        let started = Instant::now();

        let result = ctx.reconciler.reconcile(&id).await;
        RECONCILE_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                RECONCILE_TOTAL.with_label_values(&[outcome.label()]).inc();
                debug!("Reconcile of ClusterScan {} finished: {:?}", id, outcome);
                Ok(action_for(outcome))
            }
            Err(e) => {
                RECONCILE_TOTAL.with_label_values(&["error"]).inc();
                Err(e)
            }
        }
    }

    fn error_policy(scan: Arc<ClusterScan>, err: &Error, ctx: Arc<Self>) -> Action {
        error!(
            "Error reconciling ClusterScan {}/{}: {}",
            scan.namespace().unwrap_or_default(),
            scan.name_any(),
            err
        );
        Action::requeue(ctx.error_requeue)
    }
}

pub fn action_for(outcome: Outcome) -> Action {
    match outcome {
        Outcome::Done => Action::await_change(),
        Outcome::Requeue => Action::requeue(Duration::ZERO),
        Outcome::RequeueAfter(delay) => Action::requeue(delay),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_controller_actions() {
        assert_eq!(action_for(Outcome::Done), Action::await_change());
        assert_eq!(action_for(Outcome::Requeue), Action::requeue(Duration::ZERO));
        assert_eq!(
            action_for(Outcome::RequeueAfter(Duration::from_secs(10))),
            Action::requeue(Duration::from_secs(10))
        );
    }
}
