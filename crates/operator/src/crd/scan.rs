use k8s_openapi::api::batch::v1::{CronJobStatus, JobStatus};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::Condition;

#[derive(CustomResource, Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "batch.my.domain",
    version = "v1",
    kind = "ClusterScan",
    plural = "clusterscans",
    shortname = "cscan",
    namespaced,
    status = "ClusterScanStatus",
    printcolumn = r#"{"name":"Schedule","type":"string","jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Active","type":"integer","jsonPath":".status.jobStatus.active"}"#,
    printcolumn = r#"{"name":"Succeeded","type":"integer","jsonPath":".status.jobStatus.succeeded"}"#,
    printcolumn = r#"{"name":"LastSchedule","type":"date","jsonPath":".status.cronJobStatus.lastScheduleTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterScanSpec {
    /// Pod template run by both the one-shot Job and the scheduled CronJob
    pub job_template: PodTemplateSpec,

    /// Cron expression for the recurring scan
    pub schedule: String,

    /// Suspend subsequent scheduled runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,

    /// How concurrent scheduled runs are treated: Allow, Forbid or Replace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_policy: Option<String>,

    /// Time zone the schedule is evaluated in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_jobs_history_limit: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_jobs_history_limit: Option<i32>,

    /// Retries before a scan run is marked failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterScanStatus {
    /// Last observed status of the one-shot Job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_status: Option<JobStatus>,

    /// Last observed status of the CronJob
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_job_status: Option<CronJobStatus>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Generation of the spec the status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn deserializes_declared_shape() {
        let scan: ClusterScan = serde_yaml::from_str(
            r#"
apiVersion: batch.my.domain/v1
kind: ClusterScan
metadata:
  name: scan-a
  namespace: default
spec:
  schedule: "*/5 * * * *"
  jobTemplate:
    spec:
      containers:
        - name: linter
          image: linter:1.0
          args: ["lint", "/data"]
"#,
        )
        .unwrap();

        assert_eq!(scan.spec.schedule, "*/5 * * * *");
        let pod = scan.spec.job_template.spec.as_ref().unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some("linter:1.0"));
        assert!(scan.status.is_none());
        assert!(scan.spec.suspend.is_none());
    }

    #[test]
    fn status_uses_camel_case_keys() {
        let status = ClusterScanStatus {
            job_status: Some(JobStatus {
                active: Some(1),
                ..Default::default()
            }),
            observed_generation: Some(2),
            ..Default::default()
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["jobStatus"]["active"], 1);
        assert_eq!(value["observedGeneration"], 2);
        assert!(value.get("cronJobStatus").is_none());
    }

    #[test]
    fn crd_is_namespaced_with_status_subresource() {
        let crd = ClusterScan::crd();
        assert_eq!(crd.spec.group, "batch.my.domain");
        assert_eq!(crd.spec.names.kind, "ClusterScan");
        assert_eq!(crd.spec.scope, "Namespaced");
        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1");
        assert!(version
            .subresources
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .is_some());
    }
}
