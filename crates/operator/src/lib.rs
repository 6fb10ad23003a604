pub mod config;
pub mod controllers;
pub mod crd;
pub mod desired;
pub mod metrics;
pub mod reconcile;
pub mod server;
pub mod store;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Semantic errors come from the declared spec itself. Retrying cannot fix
    /// them; they are reported on the parent's status instead.
    pub fn is_semantic(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
