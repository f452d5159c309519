//! Identifier newtypes shared across the coordination layer

use serde::{Deserialize, Serialize};

/// Identity of a device group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a device within a group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied correlation token, echoed back unchanged in replies.
///
/// The coordination layer never interprets the value. [`RequestId::ZERO`]
/// is reserved as the internal sentinel used between a query coordinator
/// and the devices it fans out to; it is unrelated to the caller's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Internal correlation sentinel for query fan-out reads.
    pub const ZERO: RequestId = RequestId(0);
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_roundtrip() {
        let id = GroupId::new("living-room");
        assert_eq!(id.as_str(), "living-room");
        assert_eq!(id.to_string(), "living-room");
        assert_eq!(id, GroupId::new(String::from("living-room")));
    }

    #[test]
    fn device_ids_hash_by_value() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(DeviceId::new("d1"));
        set.insert(DeviceId::new("d1"));
        set.insert(DeviceId::new("d2"));
        assert_eq!(set.len(), 2);
    }
}
