use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, PostParams},
    error::ErrorResponse,
    Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::{ClusterStore, CreateOutcome, StatusOutcome};
use crate::crd::{ClusterScan, ClusterScanStatus, ResourceId};
use crate::{Error, Result};

const FIELD_MANAGER: &str = "clusterscan-operator";

/// The server refused the object itself; resubmitting it unchanged cannot succeed
fn is_rejection(ae: &ErrorResponse) -> bool {
    matches!(ae.code, 400 | 422)
}

fn rejected(name: &str, ae: &ErrorResponse) -> Error {
    Error::Validation(format!("{} was rejected by the API server: {}", name, ae.message))
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// `ClusterStore` backed by the API server.
///
/// Requests are plain futures: dropping a pass mid-flight abandons the
/// in-flight request and leaves only what the server already committed.
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get<K>(&self, id: &ResourceId) -> Result<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        Ok(self.api::<K>(&id.namespace).get_opt(&id.name).await?)
    }

    async fn create<K>(&self, obj: &K) -> Result<CreateOutcome<K>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::Internal(format!("{} has no namespace", obj.name_any())))?;

        match self.api::<K>(&namespace).create(&post_params(), obj).await {
            Ok(created) => Ok(CreateOutcome::Created(created)),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                debug!("{}/{} already exists: {}", namespace, obj.name_any(), ae.message);
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(kube::Error::Api(ae)) if is_rejection(&ae) => Err(rejected(&obj.name_any(), &ae)),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_scan(&self, id: &ResourceId) -> Result<Option<ClusterScan>> {
        self.get(id).await
    }

    async fn get_job(&self, id: &ResourceId) -> Result<Option<Job>> {
        self.get(id).await
    }

    async fn get_cron_job(&self, id: &ResourceId) -> Result<Option<CronJob>> {
        self.get(id).await
    }

    async fn create_job(&self, job: &Job) -> Result<CreateOutcome<Job>> {
        self.create(job).await
    }

    async fn create_cron_job(&self, cron_job: &CronJob) -> Result<CreateOutcome<CronJob>> {
        self.create(cron_job).await
    }

    async fn replace_cron_job(&self, cron_job: &CronJob) -> Result<CronJob> {
        let id = ResourceId::of(cron_job);
        match self
            .api::<CronJob>(&id.namespace)
            .replace(&id.name, &post_params(), cron_job)
            .await
        {
            Ok(replaced) => Ok(replaced),
            Err(kube::Error::Api(ae)) if is_rejection(&ae) => Err(rejected(&id.name, &ae)),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_scan_status(
        &self,
        scan: &ClusterScan,
        status: &ClusterScanStatus,
    ) -> Result<StatusOutcome> {
        let id = ResourceId::of(scan);
        let api = self.api::<ClusterScan>(&id.namespace);

        // The whole status is replaced so fields the children dropped are
        // cleared; the resourceVersion read with `scan` guards against stale writes
        let mut updated = scan.clone();
        updated.status = Some(status.clone());
        let body = serde_json::to_vec(&updated)?;

        match api.replace_status(&id.name, &post_params(), body).await {
            Ok(_) => Ok(StatusOutcome::Updated),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(StatusOutcome::Conflict),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ClusterScanSpec;
    use http::{Method, Request, Response};
    use hyper::Body;
    use k8s_openapi::api::batch::v1::JobStatus;
    use serde_json::{json, Value};
    use tower_test::mock::{self, Handle};

    type MockHandle = Handle<Request<Body>, Response<Body>>;

    fn store() -> (KubeStore, MockHandle) {
        let (service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        (KubeStore::new(Client::new(service, "default")), handle)
    }

    fn status_response(code: u16, reason: &str, message: &str) -> Response<Body> {
        let body = json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": code,
        });
        Response::builder()
            .status(code)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn ok_response(body: Vec<u8>) -> Response<Body> {
        Response::builder().status(200).body(Body::from(body)).unwrap()
    }

    fn job(name: &str) -> Job {
        let mut job = Job::default();
        job.metadata.name = Some(name.into());
        job.metadata.namespace = Some("default".into());
        job
    }

    fn scan() -> ClusterScan {
        let mut scan = ClusterScan::new(
            "scan-a",
            ClusterScanSpec {
                job_template: Default::default(),
                schedule: "@daily".into(),
                suspend: None,
                concurrency_policy: None,
                time_zone: None,
                successful_jobs_history_limit: None,
                failed_jobs_history_limit: None,
                backoff_limit: None,
            },
        );
        scan.metadata.namespace = Some("default".into());
        scan.metadata.resource_version = Some("7".into());
        scan.status = Some(ClusterScanStatus {
            job_status: Some(JobStatus {
                active: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        });
        scan
    }

    #[tokio::test]
    async fn missing_object_reads_as_none() {
        let (store, mut handle) = store();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), Method::GET);
            assert_eq!(
                request.uri().path(),
                "/apis/batch/v1/namespaces/default/jobs/scan-a-job"
            );
            send.send_response(status_response(404, "NotFound", "jobs \"scan-a-job\" not found"));
        });

        let found = store
            .get_job(&ResourceId::new("default", "scan-a-job"))
            .await
            .unwrap();
        assert!(found.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn create_conflict_is_already_exists() {
        let (store, mut handle) = store();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), Method::POST);
            assert_eq!(request.uri().path(), "/apis/batch/v1/namespaces/default/jobs");
            assert!(request
                .uri()
                .query()
                .unwrap_or_default()
                .contains("fieldManager=clusterscan-operator"));
            send.send_response(status_response(409, "AlreadyExists", "already exists"));
        });

        let outcome = store.create_job(&job("scan-a-job")).await.unwrap();
        assert_eq!(outcome, CreateOutcome::AlreadyExists);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn rejected_create_is_a_validation_error() {
        let (store, mut handle) = store();
        let server = tokio::spawn(async move {
            let (_, send) = handle.next_request().await.expect("service not called");
            send.send_response(status_response(
                422,
                "Invalid",
                "spec.timeZone: Invalid value: \"Mars/Olympus_Mons\"",
            ));
        });

        let mut cron_job = CronJob::default();
        cron_job.metadata.name = Some("scan-a-cronjob".into());
        cron_job.metadata.namespace = Some("default".into());

        let err = store.create_cron_job(&cron_job).await.unwrap_err();
        assert!(err.is_semantic());
        assert!(err.to_string().contains("spec.timeZone"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn other_create_failures_stay_retryable() {
        let (store, mut handle) = store();
        let server = tokio::spawn(async move {
            let (_, send) = handle.next_request().await.expect("service not called");
            send.send_response(status_response(500, "InternalError", "etcd unavailable"));
        });

        let err = store.create_job(&job("scan-a-job")).await.unwrap_err();
        assert!(matches!(err, Error::Kube(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn status_write_replaces_the_whole_status() {
        let (store, mut handle) = store();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), Method::PUT);
            assert_eq!(
                request.uri().path(),
                "/apis/batch.my.domain/v1/namespaces/default/clusterscans/scan-a/status"
            );
            let bytes = hyper::body::to_bytes(request.into_body()).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["metadata"]["resourceVersion"], "7");
            assert_eq!(body["status"]["jobStatus"], json!({ "succeeded": 1 }));
            send.send_response(ok_response(bytes.to_vec()));
        });

        let finished = ClusterScanStatus {
            job_status: Some(JobStatus {
                succeeded: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };
        let outcome = store.update_scan_status(&scan(), &finished).await.unwrap();
        assert_eq!(outcome, StatusOutcome::Updated);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn stale_status_write_is_a_conflict() {
        let (store, mut handle) = store();
        let server = tokio::spawn(async move {
            let (_, send) = handle.next_request().await.expect("service not called");
            send.send_response(status_response(
                409,
                "Conflict",
                "the object has been modified; please apply your changes to the latest version",
            ));
        });

        let outcome = store
            .update_scan_status(&scan(), &ClusterScanStatus::default())
            .await
            .unwrap();
        assert_eq!(outcome, StatusOutcome::Conflict);
        server.await.unwrap();
    }
}
