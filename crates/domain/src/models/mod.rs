//! Domain models for the pill dispenser.

pub mod activity;
pub mod command;
pub mod container;
pub mod device;
pub mod dispenser;
pub mod level;
pub mod schedule;

pub use activity::{ActivityKind, PillLog, PillReport};
pub use command::{DeviceCommand, DispatchCommandRequest, DispatchReceipt};
pub use container::{ContainerSummary, DispenserContainer};
pub use device::{ConnectionState, DeviceOverview, DeviceStatus, DeviceStatusSummary};
pub use dispenser::{DispenseRequest, DispenserRecord, UpdateDispenserRequest};
pub use level::Level;
pub use schedule::{
    CreateScheduleRequest, DeviceSchedule, PillSize, Schedule, ScheduleEntry,
    UpdateScheduleRequest,
};
