pub mod scan;

pub use scan::ScanController;
