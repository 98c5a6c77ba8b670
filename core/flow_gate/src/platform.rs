//! Capability traits and data-plane types for the external platform
//!
//! The gatekeeper never talks to hardware, computes routes, or captures
//! packets itself. Everything potentially slow or stateful lives behind the
//! traits here: path provisioning, flow-rule installation, topology queries,
//! endpoint resolution, and packet emission. All calls are synchronous from
//! the core's perspective; timeout and retry policy belongs to the platform.
//!
//! Every trait is object safe and `Send + Sync` so a single implementation
//! can be shared across concurrent packet workers, and so tests can slot in
//! in-memory fakes.

use std::fmt;
use std::sync::Arc;

use crate::pair::{ApplicationId, EndpointId, PairKey};

// ============================================================================
// Locations
// ============================================================================

/// Identifier of a forwarding device (switch) in the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A device port: a concrete numbered port or one of the logical ports the
/// platform interprets (flood to all ports, punt to the controller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortNumber {
    Number(u32),
    Flood,
    Controller,
}

impl fmt::Display for PortNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortNumber::Number(n) => write!(f, "{}", n),
            PortNumber::Flood => write!(f, "FLOOD"),
            PortNumber::Controller => write!(f, "CONTROLLER"),
        }
    }
}

/// A device/port attachment point, e.g. a packet's ingress location or the
/// point an endpoint is attached at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectPoint {
    pub device: DeviceId,
    pub port: PortNumber,
}

impl ConnectPoint {
    pub fn new(device: DeviceId, port: PortNumber) -> Self {
        ConnectPoint { device, port }
    }
}

impl fmt::Display for ConnectPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.port)
    }
}

// ============================================================================
// Path Lifecycle
// ============================================================================

/// Externally observed lifecycle state of a provisioned path.
///
/// These are read-only observations; the core requests transitions but
/// never stores or mutates the state itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// Submission accepted, installation in flight
    Installing,
    /// Path is live end to end
    Installed,
    /// Withdrawal requested but not yet started
    WithdrawRequested,
    /// Withdrawal in progress
    Withdrawing,
    /// Path fully removed
    Withdrawn,
    /// Installation failed
    Failed,
}

impl PathState {
    /// Whether the path is in one of the released (withdraw-family) states.
    pub fn is_released(&self) -> bool {
        matches!(
            self,
            PathState::WithdrawRequested | PathState::Withdrawing | PathState::Withdrawn
        )
    }
}

/// The platform's record of a provisioned path for one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    pub key: PairKey,
    pub one: EndpointId,
    pub two: EndpointId,
    /// Priority the path's rules were installed at
    pub priority: u16,
}

/// A request for a new end-to-end path between two endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRequest {
    pub key: PairKey,
    pub one: EndpointId,
    pub two: EndpointId,
    pub priority: u16,
    /// Treatment applied along the path; empty leaves routing to the platform
    pub treatment: Treatment,
}

// ============================================================================
// Flow Rules
// ============================================================================

/// Match fields for a flow rule. Unset fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    /// Match the sending endpoint's address
    pub src: Option<EndpointId>,
    /// Match the receiving endpoint's address
    pub dst: Option<EndpointId>,
    /// Match the UDP destination port
    pub udp_dst: Option<u16>,
    /// Match the ingress port on the rule's device
    pub in_port: Option<PortNumber>,
}

/// Action applied to matching traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    /// No explicit action; the platform fills in routing
    Empty,
    /// Send out the given port (including the logical flood and
    /// controller ports)
    Output(PortNumber),
    /// Discard matching traffic
    Drop,
}

/// How long an installed rule lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleLifetime {
    Permanent,
    /// Removed by the platform after this many seconds
    Temporary(u32),
}

/// A forwarding instruction scoped to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRule {
    pub device: DeviceId,
    pub selector: Selector,
    pub treatment: Treatment,
    pub priority: u16,
    pub lifetime: RuleLifetime,
    pub app: ApplicationId,
}

// ============================================================================
// Packet Events
// ============================================================================

/// One inbound packet as delivered by the packet-in source.
///
/// Created per packet and discarded once processing returns.
#[derive(Debug, Clone)]
pub struct PacketEvent {
    /// Sender identity
    pub src: EndpointId,
    /// Receiver identity
    pub dst: EndpointId,
    /// Where the packet entered the network
    pub ingress: ConnectPoint,
    /// Raw, unparsed payload bytes
    pub payload: Vec<u8>,
    /// Destination resolution result, filled in during processing
    pub resolved_dst: Option<ConnectPoint>,
    handled: bool,
}

impl PacketEvent {
    pub fn new(
        src: EndpointId,
        dst: EndpointId,
        ingress: ConnectPoint,
        payload: Vec<u8>,
    ) -> Self {
        PacketEvent {
            src,
            dst,
            ingress,
            payload,
            resolved_dst: None,
            handled: false,
        }
    }

    /// Mark the packet as consumed so no later processor acts on it.
    pub fn mark_handled(&mut self) {
        self.handled = true;
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failure reported by a platform call.
///
/// Opaque by design: the core logs it and scopes the failure to the current
/// packet or pair, never inspecting platform internals.
#[derive(Debug, Clone)]
pub struct PlatformError {
    message: String,
}

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        PlatformError {
            message: message.into(),
        }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PlatformError {}

// ============================================================================
// Capability Traits
// ============================================================================

/// The path-provisioning ("intent") platform.
pub trait PathProvisioner: Send + Sync {
    /// Current record for a pair, if any path was ever requested.
    fn path(&self, key: &PairKey) -> Option<PathRecord>;

    /// Observed lifecycle state for a pair's path.
    fn state(&self, key: &PairKey) -> Option<PathState>;

    /// Request installation of a new path.
    fn submit(&self, request: PathRequest) -> Result<(), PlatformError>;

    /// Request withdrawal of an existing path.
    fn withdraw(&self, record: &PathRecord) -> Result<(), PlatformError>;
}

/// Installs flow rules on devices.
pub trait RuleInstaller: Send + Sync {
    /// Apply a batch of rules; the batch either reaches the platform as a
    /// whole or fails as a whole.
    fn apply(&self, rules: Vec<FlowRule>) -> Result<(), PlatformError>;
}

/// Read-only view of the current topology snapshot.
pub trait TopologyView: Send + Sync {
    /// Whether the given point is safe to broadcast from in the current
    /// topology.
    fn is_broadcast_point(&self, point: &ConnectPoint) -> bool;
}

/// Resolves endpoint identities to network locations.
pub trait EndpointDirectory: Send + Sync {
    /// The point the endpoint is currently attached at, if known.
    fn resolve(&self, id: &EndpointId) -> Option<ConnectPoint>;

    /// All devices the endpoint is attached to.
    fn devices_of(&self, id: &EndpointId) -> Vec<DeviceId>;
}

/// Injects packets back into the data plane.
pub trait PacketIo: Send + Sync {
    fn emit(
        &self,
        device: &DeviceId,
        treatment: &Treatment,
        payload: &[u8],
    ) -> Result<(), PlatformError>;
}

/// The full set of platform capabilities the gatekeeper consumes, shareable
/// across packet workers.
#[derive(Clone)]
pub struct PlatformServices {
    pub paths: Arc<dyn PathProvisioner>,
    pub rules: Arc<dyn RuleInstaller>,
    pub topology: Arc<dyn TopologyView>,
    pub endpoints: Arc<dyn EndpointDirectory>,
    pub packets: Arc<dyn PacketIo>,
}
