//! Repository implementations over the realtime store.

pub mod activity;
pub mod dispenser;
pub mod schedule;
pub mod telemetry;

pub use activity::ActivityRepository;
pub use dispenser::DispenserRepository;
pub use schedule::ScheduleRepository;
pub use telemetry::TelemetryRepository;
