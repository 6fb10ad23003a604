use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with a child that already exists but no longer matches its parent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DriftPolicy {
    /// Leave existing children untouched
    #[default]
    #[serde(rename = "ignore")]
    Ignore,
    /// Replace a drifted CronJob with the desired one
    #[serde(rename = "update")]
    Update,
}

impl std::str::FromStr for DriftPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "ignore" => Ok(DriftPolicy::Ignore),
            "update" => Ok(DriftPolicy::Update),
            other => Err(crate::Error::Config(format!(
                "DRIFT_POLICY must be 'ignore' or 'update', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub kube: KubeConfig,
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeConfig {
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Delay before a failed pass is retried
    pub error_requeue_secs: u64,
    /// Delay before retrying a status write that failed or conflicted
    pub status_retry_secs: u64,
    #[serde(default)]
    pub drift_policy: DriftPolicy,
}

impl ReconcileConfig {
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    pub fn status_retry(&self) -> Duration {
        Duration::from_secs(self.status_retry_secs)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            error_requeue_secs: 30,
            status_retry_secs: 10,
            drift_policy: DriftPolicy::Ignore,
        }
    }
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; `load` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ReconcileConfig::default();

        let config = Config {
            server: ServerConfig {
                addr: lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            },
            kube: KubeConfig {
                namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
            },
            reconcile: ReconcileConfig {
                error_requeue_secs: parse_secs(
                    &lookup,
                    "RECONCILE_ERROR_REQUEUE_SECS",
                    defaults.error_requeue_secs,
                )?,
                status_retry_secs: parse_secs(&lookup, "STATUS_RETRY_SECS", defaults.status_retry_secs)?,
                drift_policy: match lookup("DRIFT_POLICY") {
                    Some(value) => value.parse()?,
                    None => DriftPolicy::Ignore,
                },
            },
        };

        if config.reconcile.error_requeue_secs == 0 {
            tracing::warn!("RECONCILE_ERROR_REQUEUE_SECS is 0; failed passes will retry immediately");
        }

        Ok(config)
    }
}

fn parse_secs<F>(lookup: &F, key: &str, default: u64) -> crate::Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            crate::Error::Config(format!("{} must be a whole number of seconds, got '{}'", key, raw))
        }),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                addr: "0.0.0.0:8080".to_string(),
            },
            kube: KubeConfig { namespace: None },
            reconcile: ReconcileConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert_eq!(config.kube.namespace, None);
        assert_eq!(config.reconcile.error_requeue(), Duration::from_secs(30));
        assert_eq!(config.reconcile.status_retry(), Duration::from_secs(10));
        assert_eq!(config.reconcile.drift_policy, DriftPolicy::Ignore);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "127.0.0.1:9000"),
            ("WATCH_NAMESPACE", "scans"),
            ("RECONCILE_ERROR_REQUEUE_SECS", "5"),
            ("DRIFT_POLICY", "Update"),
        ]))
        .unwrap();

        assert_eq!(config.server.addr, "127.0.0.1:9000");
        assert_eq!(config.kube.namespace.as_deref(), Some("scans"));
        assert_eq!(config.reconcile.error_requeue_secs, 5);
        assert_eq!(config.reconcile.drift_policy, DriftPolicy::Update);
    }

    #[test]
    fn blank_namespace_means_all_namespaces() {
        let config = Config::from_lookup(lookup(&[("WATCH_NAMESPACE", " ")])).unwrap();
        assert_eq!(config.kube.namespace, None);
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let err = Config::from_lookup(lookup(&[("DRIFT_POLICY", "sometimes")])).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));

        let err = Config::from_lookup(lookup(&[("STATUS_RETRY_SECS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("STATUS_RETRY_SECS"));
    }
}
