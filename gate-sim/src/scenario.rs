//! Scenario file schema
//!
//! A scenario is a JSON description of a small network and a packet trace:
//! endpoint attachments, designated broadcast points, optional preset path
//! states (to start a pair off installed, withdrawn, or failed), and the
//! packets to replay.
//!
//! ```text
//! {
//!   "endpoints": [ {"id": "h1", "device": "of:1", "port": 1}, ... ],
//!   "broadcast_points": [ {"device": "of:1", "port": 1}, ... ],
//!   "preset_paths": [ {"a": "h1", "b": "h2", "state": "failed"}, ... ],
//!   "packets": [
//!     {"src": "h1", "dst": "h2",
//!      "ingress": {"device": "of:1", "port": 1},
//!      "payload": "allowTraffic"}
//!   ]
//! }
//! ```

use std::io;

use serde::Deserialize;

use flow_gate::{ConnectPoint, DeviceId, EndpointId, PacketEvent, PathState, PortNumber};

/// Default priority for preset paths, matching the gate's default
/// data-path priority.
fn default_priority() -> u16 {
    flow_gate::config::DEFAULT_PATH_PRIORITY
}

/// A full replay scenario.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
    #[serde(default)]
    pub broadcast_points: Vec<PointSpec>,
    #[serde(default)]
    pub preset_paths: Vec<PresetPath>,
    #[serde(default)]
    pub packets: Vec<PacketSpec>,
}

impl Scenario {
    pub fn from_reader(reader: impl io::Read) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }
}

/// An endpoint and the device/port it attaches at.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSpec {
    pub id: String,
    pub device: String,
    pub port: u32,
}

/// A device/port location.
#[derive(Debug, Clone, Deserialize)]
pub struct PointSpec {
    pub device: String,
    pub port: u32,
}

impl PointSpec {
    pub fn to_connect_point(&self) -> ConnectPoint {
        ConnectPoint::new(DeviceId::new(&self.device), PortNumber::Number(self.port))
    }
}

/// A pair whose path starts the replay in a given lifecycle state.
#[derive(Debug, Clone, Deserialize)]
pub struct PresetPath {
    pub a: String,
    pub b: String,
    pub state: PathStateSpec,
    #[serde(default = "default_priority")]
    pub priority: u16,
}

/// JSON-friendly spelling of [`PathState`].
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStateSpec {
    Installing,
    Installed,
    WithdrawRequested,
    Withdrawing,
    Withdrawn,
    Failed,
}

impl From<PathStateSpec> for PathState {
    fn from(spec: PathStateSpec) -> Self {
        match spec {
            PathStateSpec::Installing => PathState::Installing,
            PathStateSpec::Installed => PathState::Installed,
            PathStateSpec::WithdrawRequested => PathState::WithdrawRequested,
            PathStateSpec::Withdrawing => PathState::Withdrawing,
            PathStateSpec::Withdrawn => PathState::Withdrawn,
            PathStateSpec::Failed => PathState::Failed,
        }
    }
}

/// One packet to feed through the gate. The payload is given as text;
/// scenario cookies are plain ASCII.
#[derive(Debug, Clone, Deserialize)]
pub struct PacketSpec {
    pub src: String,
    pub dst: String,
    pub ingress: PointSpec,
    pub payload: String,
}

impl PacketSpec {
    pub fn to_event(&self) -> PacketEvent {
        PacketEvent::new(
            EndpointId::new(&self.src),
            EndpointId::new(&self.dst),
            self.ingress.to_connect_point(),
            self.payload.as_bytes().to_vec(),
        )
    }
}
