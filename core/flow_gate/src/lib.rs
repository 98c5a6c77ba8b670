//! Reactive connectivity gatekeeper core
//!
//! This crate decides, per inbound packet, whether traffic between two
//! endpoints may flow. All traffic is blocked by default; an end-to-end path
//! is provisioned or torn down only when a control cookie is spotted inside
//! an ordinary data-plane payload.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      Gatekeeper Structure                      │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                                │
//! │  classifier.rs  - byte-pattern cookie search                  │
//! │  pair.rs        - endpoint ids and canonical pair keys        │
//! │  platform.rs    - capability traits + data-plane types        │
//! │  locks.rs       - sharded per-pair lock table                 │
//! │  backchannel.rs - signaling back-channel provisioner          │
//! │  gate.rs        - connectivity state machine + packet loop    │
//! │  config.rs      - cookies, ports, priorities                  │
//! │                                                                │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Data Flow
//!
//! ```text
//! packet in ──► Gatekeeper::process
//!                 │  resolve destination (flood/block if unknown)
//!                 │  scan payload for grant + revoke cookies
//!                 │  drive the per-pair transition policy
//!                 ▼
//!           forward / flood / block / drop
//! ```
//!
//! Topology discovery, physical path computation, and raw packet I/O are
//! external: the core reaches them only through the traits in [`platform`],
//! so it runs unchanged against the real control plane or an in-memory fake.

pub mod backchannel;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gate;
pub mod locks;
pub mod pair;
pub mod platform;

// Re-export the types most callers need
pub use classifier::find_cookie;
pub use config::{FailedPolicy, GateConfig};
pub use error::{ConfigError, GateError};
pub use gate::{Gatekeeper, Verdict};
pub use pair::{ApplicationId, EndpointId, PairKey};
pub use platform::{
    ConnectPoint,
    DeviceId,
    EndpointDirectory,
    FlowRule,
    PacketEvent,
    PacketIo,
    PathProvisioner,
    PathRecord,
    PathRequest,
    PathState,
    PlatformError,
    PlatformServices,
    PortNumber,
    RuleInstaller,
    RuleLifetime,
    Selector,
    TopologyView,
    Treatment,
};
