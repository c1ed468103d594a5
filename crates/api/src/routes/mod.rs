//! HTTP route handlers.

pub mod containers;
pub mod device;
pub mod events;
pub mod health;
pub mod legacy;
pub mod logs;
pub mod schedules;
