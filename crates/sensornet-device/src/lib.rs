//! Sensornet Device - the leaf actor of the coordination layer
//!
//! A device is an independently addressable unit holding zero-or-one
//! numeric reading. It runs as a single tokio task draining one mailbox,
//! so its state is never touched concurrently. Everything else in the
//! system talks to it through a cloneable [`DeviceHandle`].
//!
//! A device has no knowledge of the registry above it; the registry and
//! the query coordinator merely watch its mailbox for closure, which is
//! the termination signal.

#![deny(unsafe_code)]

pub mod device;
pub mod handle;
pub mod message;

pub use device::Device;
pub use handle::{DeviceError, DeviceHandle};
pub use message::{DeviceMessage, ReadingRecorded, RespondReading};
