//! Error types for the gatekeeper core
//!
//! No error here is fatal to the process: configuration errors surface once
//! at construction, and everything else is scoped to a single packet or
//! pair and logged where it occurs.

use std::fmt;

use crate::pair::EndpointId;
use crate::platform::PlatformError;

/// Rejected gatekeeper configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A cookie was configured empty; an empty pattern would match nothing
    /// and is disallowed outright
    EmptyCookie(&'static str),
    /// Back-channel priority does not strictly exceed the data-path
    /// priority, so signaling rules could lose arbitration
    BackChannelPriorityTooLow { backchannel: u16, path: u16 },
    /// Lock shard count must be a nonzero power of two
    BadShardCount(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyCookie(which) => {
                write!(f, "{} cookie must not be empty", which)
            }
            ConfigError::BackChannelPriorityTooLow { backchannel, path } => write!(
                f,
                "back-channel priority {} must be strictly greater than path priority {}",
                backchannel, path
            ),
            ConfigError::BadShardCount(count) => {
                write!(f, "lock shard count {} is not a nonzero power of two", count)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failure while driving a pair transition.
#[derive(Debug, Clone)]
pub enum GateError {
    /// Endpoint could not be resolved to an attachment point; the grant
    /// fails closed rather than installing a partial back-channel
    UnresolvedEndpoint(EndpointId),
    /// The external platform rejected a call
    Platform(PlatformError),
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::UnresolvedEndpoint(id) => {
                write!(f, "endpoint {} has no known attachment point", id)
            }
            GateError::Platform(err) => write!(f, "platform call failed: {}", err),
        }
    }
}

impl std::error::Error for GateError {}

impl From<PlatformError> for GateError {
    fn from(err: PlatformError) -> Self {
        GateError::Platform(err)
    }
}
