//! Migration System
//!
//! File discovery, the tracking table and the up/down runner.

pub mod definitions;
pub mod manager;
pub mod rollback;
pub mod runner;
pub mod tracking;

pub use definitions::*;
pub use manager::{parse_header_name, MigrationManager};
pub use runner::MigrationRunner;
pub use tracking::TrackingStore;
