//! Per-device outcome taxonomy for scatter-gather queries
//!
//! Every device in a query snapshot resolves to exactly one of these
//! four outcomes. Partial failure is data, not an error: an unreachable
//! or timed-out device never fails the query as a whole.

use serde::{Deserialize, Serialize};

/// Outcome of one device's read within a group query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value")]
pub enum ReadOutcome {
    /// Device replied with its stored reading
    Value(f64),

    /// Device replied, but holds no reading yet
    NoReading,

    /// Device vanished before answering
    Unreachable,

    /// Deadline elapsed while the device was still pending
    TimedOut,
}

impl ReadOutcome {
    /// True when the device answered at all, with or without a value.
    pub fn is_responsive(&self) -> bool {
        matches!(self, ReadOutcome::Value(_) | ReadOutcome::NoReading)
    }

    /// The stored reading, when one was reported.
    pub fn value(&self) -> Option<f64> {
        match self {
            ReadOutcome::Value(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadOutcome::Value(v) => write!(f, "value({v})"),
            ReadOutcome::NoReading => write!(f, "no-reading"),
            ReadOutcome::Unreachable => write!(f, "unreachable"),
            ReadOutcome::TimedOut => write!(f, "timed-out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responsiveness() {
        assert!(ReadOutcome::Value(21.5).is_responsive());
        assert!(ReadOutcome::NoReading.is_responsive());
        assert!(!ReadOutcome::Unreachable.is_responsive());
        assert!(!ReadOutcome::TimedOut.is_responsive());
    }

    #[test]
    fn value_extraction() {
        assert_eq!(ReadOutcome::Value(21.5).value(), Some(21.5));
        assert_eq!(ReadOutcome::NoReading.value(), None);
        assert_eq!(ReadOutcome::TimedOut.value(), None);
    }
}
