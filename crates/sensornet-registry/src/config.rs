//! Registry configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables threaded through manager, group and device spawns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Mailbox capacity for every spawned task
    pub mailbox_capacity: usize,

    /// Deadline applied to a query when the caller does not supply one
    pub default_deadline: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 64,
            default_deadline: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sane_defaults() {
        let config = RegistryConfig::default();
        assert!(config.mailbox_capacity > 0);
        assert!(config.default_deadline > Duration::ZERO);
    }
}
