//! liftlog-core - Core library for LiftLog
//!
//! This crate contains the offline-first engine shared by all LiftLog
//! interfaces: the account-namespaced local store, the durable outbox of
//! pending remote mutations, the local/remote merge resolver, the sync
//! coordinator, and personal-record tracking.

pub mod config;
pub mod error;
pub mod merge;
pub mod models;
pub mod outbox;
pub mod records;
pub mod remote;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{SetLog, WorkoutSession};
pub use sync::SyncCoordinator;
