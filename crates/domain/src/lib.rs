//! Domain layer for the pill dispenser backend.
//!
//! This crate contains:
//! - Domain models (containers, device status, schedules, commands, activity)
//! - Business logic services
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::DomainError;
