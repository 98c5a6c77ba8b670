//! In-memory data-plane simulation
//!
//! Implements the core's platform traits over plain maps so a scenario can
//! run without a controller or switches. Submitted paths install
//! immediately, withdrawals release immediately, and every rule and emitted
//! packet is counted for the end-of-run summary.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use flow_gate::{
    ApplicationId,
    ConnectPoint,
    DeviceId,
    EndpointDirectory,
    EndpointId,
    FlowRule,
    PacketIo,
    PairKey,
    PathProvisioner,
    PathRecord,
    PathRequest,
    PathState,
    PlatformError,
    RuleInstaller,
    TopologyView,
    Treatment,
};

use crate::scenario::Scenario;

#[derive(Debug, Default, Clone, Copy)]
struct SimStats {
    paths_submitted: u64,
    paths_withdrawn: u64,
    rules_installed: u64,
    packets_emitted: u64,
}

/// The simulated platform backing one replay run.
pub struct SimPlatform {
    locations: HashMap<EndpointId, ConnectPoint>,
    broadcast_points: HashSet<ConnectPoint>,
    paths: Mutex<HashMap<PairKey, (PathRecord, PathState)>>,
    stats: Mutex<SimStats>,
}

impl SimPlatform {
    /// Build the simulated network from a scenario, presetting any pair
    /// states it declares.
    pub fn from_scenario(app: &ApplicationId, scenario: &Scenario) -> Self {
        let locations = scenario
            .endpoints
            .iter()
            .map(|spec| {
                (
                    EndpointId::new(&spec.id),
                    ConnectPoint::new(
                        DeviceId::new(&spec.device),
                        flow_gate::PortNumber::Number(spec.port),
                    ),
                )
            })
            .collect();

        let broadcast_points = scenario
            .broadcast_points
            .iter()
            .map(|spec| spec.to_connect_point())
            .collect();

        let mut paths = HashMap::new();
        for preset in &scenario.preset_paths {
            let one = EndpointId::new(&preset.a);
            let two = EndpointId::new(&preset.b);
            let key = PairKey::new(app, &one, &two);
            let record = PathRecord {
                key: key.clone(),
                one,
                two,
                priority: preset.priority,
            };
            paths.insert(key, (record, preset.state.into()));
        }

        SimPlatform {
            locations,
            broadcast_points,
            paths: Mutex::new(paths),
            stats: Mutex::new(SimStats::default()),
        }
    }

    /// Log what the replay did to the simulated network.
    pub fn log_summary(&self) {
        let stats = *self.stats.lock();
        let live = self
            .paths
            .lock()
            .values()
            .filter(|(_, state)| *state == PathState::Installed)
            .count();

        log::info!(
            "summary: {} paths submitted, {} withdrawn, {} rules installed, {} packets emitted, {} pairs connected",
            stats.paths_submitted,
            stats.paths_withdrawn,
            stats.rules_installed,
            stats.packets_emitted,
            live,
        );
    }
}

impl PathProvisioner for SimPlatform {
    fn path(&self, key: &PairKey) -> Option<PathRecord> {
        self.paths.lock().get(key).map(|(record, _)| record.clone())
    }

    fn state(&self, key: &PairKey) -> Option<PathState> {
        self.paths.lock().get(key).map(|(_, state)| *state)
    }

    fn submit(&self, request: PathRequest) -> Result<(), PlatformError> {
        log::info!("sim: path submitted for {} (prio {})", request.key, request.priority);

        let record = PathRecord {
            key: request.key.clone(),
            one: request.one,
            two: request.two,
            priority: request.priority,
        };
        // Installation succeeds instantly in the simulation
        self.paths
            .lock()
            .insert(request.key, (record, PathState::Installed));
        self.stats.lock().paths_submitted += 1;
        Ok(())
    }

    fn withdraw(&self, record: &PathRecord) -> Result<(), PlatformError> {
        log::info!("sim: path withdrawn for {}", record.key);

        if let Some(entry) = self.paths.lock().get_mut(&record.key) {
            entry.1 = PathState::Withdrawn;
        }
        self.stats.lock().paths_withdrawn += 1;
        Ok(())
    }
}

impl RuleInstaller for SimPlatform {
    fn apply(&self, rules: Vec<FlowRule>) -> Result<(), PlatformError> {
        for rule in &rules {
            log::info!(
                "sim: rule on {} prio {} {:?} ({:?})",
                rule.device,
                rule.priority,
                rule.treatment,
                rule.lifetime,
            );
        }
        self.stats.lock().rules_installed += rules.len() as u64;
        Ok(())
    }
}

impl TopologyView for SimPlatform {
    fn is_broadcast_point(&self, point: &ConnectPoint) -> bool {
        self.broadcast_points.contains(point)
    }
}

impl EndpointDirectory for SimPlatform {
    fn resolve(&self, id: &EndpointId) -> Option<ConnectPoint> {
        self.locations.get(id).cloned()
    }

    fn devices_of(&self, id: &EndpointId) -> Vec<DeviceId> {
        self.locations
            .get(id)
            .map(|point| vec![point.device.clone()])
            .unwrap_or_default()
    }
}

impl PacketIo for SimPlatform {
    fn emit(
        &self,
        device: &DeviceId,
        treatment: &Treatment,
        payload: &[u8],
    ) -> Result<(), PlatformError> {
        log::info!("sim: emit {} bytes at {} {:?}", payload.len(), device, treatment);
        self.stats.lock().packets_emitted += 1;
        Ok(())
    }
}
