//! Gatekeeper configuration
//!
//! The cookie byte sequences and the signaling port are the only bit-exact
//! external contracts of the core; both are configurable here rather than
//! hard-coded at their use sites. The remaining knobs cover rule priorities,
//! the failed-path policy, and lock-table sizing.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// Defaults (wire-visible contracts)
// ============================================================================

/// Cookie that requests path setup for the packet's pair
pub const DEFAULT_GRANT_COOKIE: &str = "allowTraffic";

/// Cookie that requests path teardown for the packet's pair
pub const DEFAULT_REVOKE_COOKIE: &str = "stopTraffic";

/// UDP destination port of signaling traffic (DNS-port convention)
pub const DEFAULT_SIGNALING_PORT: u16 = 53;

/// Priority of back-channel rules; must beat every data-path priority so
/// signaling always reaches the controller
pub const DEFAULT_BACKCHANNEL_PRIORITY: u16 = 40001;

/// Priority submitted with new path requests
pub const DEFAULT_PATH_PRIORITY: u16 = 100;

/// Lifetime of the temporary drop rule installed for a failed path
pub const DEFAULT_DROP_RULE_TIMEOUT_SECS: u32 = 300;

/// Shards in the per-pair lock table
pub const DEFAULT_LOCK_SHARDS: usize = 64;

// ============================================================================
// Configuration
// ============================================================================

/// What a grant does when the pair's path previously failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedPolicy {
    /// Install a temporary lower-priority drop rule and stop; never
    /// resubmit the path
    DropRule,
    /// Treat the failed record like a released one and resubmit
    Resubmit,
}

/// Gatekeeper configuration, deserializable from JSON with per-field
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Byte sequence that triggers path setup
    pub grant_cookie: String,
    /// Byte sequence that triggers path teardown
    pub revoke_cookie: String,
    /// UDP destination port matched by back-channel rules
    pub signaling_port: u16,
    /// Priority of back-channel rules
    pub backchannel_priority: u16,
    /// Priority of submitted path requests
    pub path_priority: u16,
    /// Seconds before a failed-path drop rule expires
    pub drop_rule_timeout_secs: u32,
    /// Grant behavior against a failed path
    pub failed_policy: FailedPolicy,
    /// Shards in the per-pair lock table (nonzero power of two)
    pub lock_shards: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            grant_cookie: DEFAULT_GRANT_COOKIE.to_string(),
            revoke_cookie: DEFAULT_REVOKE_COOKIE.to_string(),
            signaling_port: DEFAULT_SIGNALING_PORT,
            backchannel_priority: DEFAULT_BACKCHANNEL_PRIORITY,
            path_priority: DEFAULT_PATH_PRIORITY,
            drop_rule_timeout_secs: DEFAULT_DROP_RULE_TIMEOUT_SECS,
            failed_policy: FailedPolicy::DropRule,
            lock_shards: DEFAULT_LOCK_SHARDS,
        }
    }
}

impl GateConfig {
    /// Check the invariants the rest of the core relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grant_cookie.is_empty() {
            return Err(ConfigError::EmptyCookie("grant"));
        }

        if self.revoke_cookie.is_empty() {
            return Err(ConfigError::EmptyCookie("revoke"));
        }

        if self.backchannel_priority <= self.path_priority {
            return Err(ConfigError::BackChannelPriorityTooLow {
                backchannel: self.backchannel_priority,
                path: self.path_priority,
            });
        }

        if self.lock_shards == 0 || !self.lock_shards.is_power_of_two() {
            return Err(ConfigError::BadShardCount(self.lock_shards));
        }

        Ok(())
    }
}
