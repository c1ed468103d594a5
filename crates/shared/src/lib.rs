//! Shared utilities for the pill dispenser backend.
//!
//! Validation helpers used by request payloads and store path builders.

pub mod validation;
