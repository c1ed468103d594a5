//! Domain services for the pill dispenser.
//!
//! Services contain business logic that operates on domain models.

pub mod activity;

pub use activity::{export_logs_csv, ActivityFeed, ActivitySummary};
