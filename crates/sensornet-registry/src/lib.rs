//! Sensornet Registry - group lifecycle and scatter-gather queries
//!
//! This crate is the core of the coordination layer:
//!
//! - **GroupRegistry**: owns the members of one device group, creates
//!   devices on demand, deduplicates registrations, watches members for
//!   termination and stops itself once its last member is gone
//! - **Query coordinator**: a short-lived task spawned per query that
//!   fans a read out to a snapshot of members and fans replies, liveness
//!   losses and the deadline back in to one aggregated result
//! - **GroupManager**: the directory one level up, creating groups on
//!   first reference and dropping them on teardown
//!
//! ## Concurrency model
//!
//! Every registry, query and manager instance is a single tokio task
//! draining one mailbox; commands, termination notifications and timer
//! firings are serialized into that one stream, so no instance state is
//! ever touched concurrently. Across instances everything runs in
//! parallel, and no component blocks a thread waiting for a reply.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod events;
pub mod group;
pub mod manager;
pub mod query;

// Re-exports
pub use config::RegistryConfig;
pub use error::{GroupError, Result};
pub use events::EventAggregator;
pub use group::{GroupHandle, GroupRegistry, ReplyDeviceList};
pub use manager::{GroupManager, ManagerHandle};
pub use query::ReplyAllReadings;
