//! Sensornet Types - Core types for the device coordination layer
//!
//! Sensornet is an in-process coordination layer for fleets of simple
//! stateful sensor devices. Devices are grouped under named groups; a
//! group can be asked for a deadline-bounded scatter-gather snapshot of
//! every member's current reading.
//!
//! ## Architectural Boundaries
//!
//! - **Group registry** owns: membership, device creation, termination
//!   tracking, query dispatch
//! - **Device** owns: its single optional reading
//! - **Group manager** owns: group creation on demand and group teardown
//!
//! This crate holds the vocabulary shared across those layers: the
//! identifier newtypes, the per-device read outcome taxonomy, and the
//! observability event stream types.

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod outcome;

// Re-export main types
pub use events::{EventSource, SensorEvent, SensorEventEnvelope};
pub use ids::{DeviceId, GroupId, RequestId};
pub use outcome::ReadOutcome;
