use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref RECONCILE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clusterscan_reconcile_total", "Reconcile passes by outcome."),
        &["outcome"]
    )
    .expect("valid reconcile_total metric");
    pub static ref RECONCILE_DURATION_SECONDS: Histogram = Histogram::with_opts(HistogramOpts::new(
        "clusterscan_reconcile_duration_seconds",
        "Wall time of a reconcile pass."
    ))
    .expect("valid reconcile_duration metric");
    pub static ref CHILDREN_CREATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clusterscan_children_created_total", "Child objects created."),
        &["kind"]
    )
    .expect("valid children_created metric");
    pub static ref CREATE_RACES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "clusterscan_create_races_total",
            "Creates that found the child already present."
        ),
        &["kind"]
    )
    .expect("valid create_races metric");
    pub static ref STATUS_WRITE_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "clusterscan_status_write_failures_total",
        "Status writes that failed or conflicted."
    )
    .expect("valid status_write_failures metric");
    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        registry
            .register(Box::new(RECONCILE_TOTAL.clone()))
            .expect("register reconcile_total");
        registry
            .register(Box::new(RECONCILE_DURATION_SECONDS.clone()))
            .expect("register reconcile_duration");
        registry
            .register(Box::new(CHILDREN_CREATED_TOTAL.clone()))
            .expect("register children_created");
        registry
            .register(Box::new(CREATE_RACES_TOTAL.clone()))
            .expect("register create_races");
        registry
            .register(Box::new(STATUS_WRITE_FAILURES_TOTAL.clone()))
            .expect("register status_write_failures");
        registry
    };
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> crate::Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| crate::Error::Internal(e.to_string()))
}
