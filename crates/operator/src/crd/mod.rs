pub mod common;
pub mod identity;
pub mod scan;

pub use common::{set_condition, Condition};
pub use identity::ResourceId;
pub use scan::{ClusterScan, ClusterScanSpec, ClusterScanStatus};
