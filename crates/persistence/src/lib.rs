//! Persistence layer for the pill dispenser backend.
//!
//! This crate contains:
//! - The realtime tree store abstraction and its memory and Firebase backends
//! - Push subscriptions and the state sync client
//! - Repository implementations

pub mod error;
pub mod firebase;
pub mod memory;
pub mod metrics;
pub mod path;
pub mod push_id;
pub mod repositories;
pub mod store;
pub mod subscription;
pub mod sync;
pub mod tree;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use path::{paths, StorePath};
pub use store::{create_store, RealtimeStore, StoreBackend, StoreSettings};
pub use subscription::{Snapshot, Subscription};
pub use sync::StateSyncClient;
