//! Registry error types

use sensornet_types::GroupId;
use thiserror::Error;

/// Registry errors
///
/// Routing a list or query request to the wrong registry is a protocol
/// violation surfaced as [`GroupError::GroupMismatch`] so the caller can
/// tell it apart from a successful empty result. Track requests degrade
/// to a silent ignore instead; that asymmetry is deliberate.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("request addressed to group '{addressed}' reached group '{actual}'")]
    GroupMismatch { addressed: GroupId, actual: GroupId },

    #[error("group registry unavailable: {0}")]
    RegistryUnavailable(GroupId),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, GroupError>;
