//! Integration tests for the gatekeeper loop and transition policy
//!
//! A recording fake stands in for the external platform: every submit,
//! withdraw, rule batch, and emitted packet is captured so tests can assert
//! exactly which requests a packet produced.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread;

use flow_gate::{
    ApplicationId,
    ConnectPoint,
    DeviceId,
    EndpointDirectory,
    EndpointId,
    FailedPolicy,
    FlowRule,
    GateConfig,
    Gatekeeper,
    PacketEvent,
    PacketIo,
    PairKey,
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
    Verdict,
};

const APP: &str = "gate-test";

// ============================================================================
// Recording fake platform
// ============================================================================

#[derive(Default)]
struct FakePlatform {
    locations: HashMap<EndpointId, ConnectPoint>,
    broadcast_points: HashSet<ConnectPoint>,
    paths: Mutex<HashMap<PairKey, (PathRecord, PathState)>>,
    submits: Mutex<Vec<PathRequest>>,
    withdraws: Mutex<Vec<PathRecord>>,
    rule_batches: Mutex<Vec<Vec<FlowRule>>>,
    emitted: Mutex<Vec<(DeviceId, Treatment, Vec<u8>)>>,
}

impl FakePlatform {
    fn new() -> Self {
        FakePlatform::default()
    }

    fn attach(mut self, id: &str, device: &str, port: u32) -> Self {
        self.locations.insert(
            EndpointId::new(id),
            ConnectPoint::new(DeviceId::new(device), PortNumber::Number(port)),
        );
        self
    }

    fn broadcast_point(mut self, device: &str, port: u32) -> Self {
        self.broadcast_points
            .insert(ConnectPoint::new(DeviceId::new(device), PortNumber::Number(port)));
        self
    }

    fn preset_path(&self, a: &str, b: &str, state: PathState, priority: u16) {
        let key = pair_key(a, b);
        let record = PathRecord {
            key: key.clone(),
            one: EndpointId::new(a),
            two: EndpointId::new(b),
            priority,
        };
        self.paths.lock().unwrap().insert(key, (record, state));
    }

    fn submit_count(&self) -> usize {
        self.submits.lock().unwrap().len()
    }

    fn withdraw_count(&self) -> usize {
        self.withdraws.lock().unwrap().len()
    }

    fn batch_count(&self) -> usize {
        self.rule_batches.lock().unwrap().len()
    }

    fn emit_count(&self) -> usize {
        self.emitted.lock().unwrap().len()
    }
}

impl PathProvisioner for FakePlatform {
    fn path(&self, key: &PairKey) -> Option<PathRecord> {
        self.paths
            .lock()
            .unwrap()
            .get(key)
            .map(|(record, _)| record.clone())
    }

    fn state(&self, key: &PairKey) -> Option<PathState> {
        self.paths.lock().unwrap().get(key).map(|(_, state)| *state)
    }

    fn submit(&self, request: PathRequest) -> Result<(), PlatformError> {
        let record = PathRecord {
            key: request.key.clone(),
            one: request.one.clone(),
            two: request.two.clone(),
            priority: request.priority,
        };
        // Accepted submissions install immediately in the fake
        self.paths
            .lock()
            .unwrap()
            .insert(request.key.clone(), (record, PathState::Installed));
        self.submits.lock().unwrap().push(request);
        Ok(())
    }

    fn withdraw(&self, record: &PathRecord) -> Result<(), PlatformError> {
        if let Some(entry) = self.paths.lock().unwrap().get_mut(&record.key) {
            entry.1 = PathState::WithdrawRequested;
        }
        self.withdraws.lock().unwrap().push(record.clone());
        Ok(())
    }
}

impl RuleInstaller for FakePlatform {
    fn apply(&self, rules: Vec<FlowRule>) -> Result<(), PlatformError> {
        self.rule_batches.lock().unwrap().push(rules);
        Ok(())
    }
}

impl TopologyView for FakePlatform {
    fn is_broadcast_point(&self, point: &ConnectPoint) -> bool {
        self.broadcast_points.contains(point)
    }
}

impl EndpointDirectory for FakePlatform {
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

impl PacketIo for FakePlatform {
    fn emit(
        &self,
        device: &DeviceId,
        treatment: &Treatment,
        payload: &[u8],
    ) -> Result<(), PlatformError> {
        self.emitted
            .lock()
            .unwrap()
            .push((device.clone(), *treatment, payload.to_vec()));
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn pair_key(a: &str, b: &str) -> PairKey {
    PairKey::new(
        &ApplicationId::new(APP),
        &EndpointId::new(a),
        &EndpointId::new(b),
    )
}

/// Two endpoints attached to separate edge devices.
fn two_host_fake() -> Arc<FakePlatform> {
    Arc::new(
        FakePlatform::new()
            .attach("aa", "of:1", 1)
            .attach("bb", "of:2", 2),
    )
}

fn gatekeeper_with(fake: &Arc<FakePlatform>, config: GateConfig) -> Gatekeeper {
    let platform = PlatformServices {
        paths: fake.clone(),
        rules: fake.clone(),
        topology: fake.clone(),
        endpoints: fake.clone(),
        packets: fake.clone(),
    };
    Gatekeeper::new(ApplicationId::new(APP), config, platform).unwrap()
}

fn gatekeeper(fake: &Arc<FakePlatform>) -> Gatekeeper {
    gatekeeper_with(fake, GateConfig::default())
}

fn packet(src: &str, dst: &str, payload: &[u8]) -> PacketEvent {
    PacketEvent::new(
        EndpointId::new(src),
        EndpointId::new(dst),
        ConnectPoint::new(DeviceId::new("of:1"), PortNumber::Number(1)),
        payload.to_vec(),
    )
}

// ============================================================================
// Signal handling
// ============================================================================

#[test]
fn test_revoke_on_absent_pair_is_noop() {
    let fake = two_host_fake();
    let gate = gatekeeper(&fake);

    let mut event = packet("aa", "bb", b"header stopTraffic trailer");
    let verdict = gate.process(&mut event);

    assert_eq!(verdict, Verdict::Dropped);
    assert_eq!(fake.withdraw_count(), 0);
    assert_eq!(fake.submit_count(), 0);
    assert!(fake.paths.lock().unwrap().is_empty());
}

#[test]
fn test_grant_on_absent_pair_opens_backchannel_then_submits() {
    let fake = two_host_fake();
    let gate = gatekeeper(&fake);

    let mut event = packet("aa", "bb", b"dns query carrying allowTraffic");
    let verdict = gate.process(&mut event);

    // The fake installs synchronously, so the granting packet itself is
    // handed on once the path is up.
    assert_eq!(verdict, Verdict::Forwarded);
    assert_eq!(fake.batch_count(), 1, "exactly one back-channel batch");
    assert_eq!(fake.submit_count(), 1, "exactly one path submission");

    let batches = fake.rule_batches.lock().unwrap();
    let rules = &batches[0];
    assert_eq!(rules.len(), 2, "one rule per endpoint side");

    let devices: Vec<&str> = rules.iter().map(|r| r.device.as_str()).collect();
    assert!(devices.contains(&"of:1"));
    assert!(devices.contains(&"of:2"));

    for rule in rules.iter() {
        assert_eq!(rule.priority, 40001);
        assert_eq!(rule.lifetime, RuleLifetime::Permanent);
        assert_eq!(rule.selector.udp_dst, Some(53));
        assert_eq!(rule.treatment, Treatment::Output(PortNumber::Controller));
    }

    let submits = fake.submits.lock().unwrap();
    assert_eq!(submits[0].key, pair_key("aa", "bb"));
    assert_eq!(submits[0].treatment, Treatment::Empty);
    assert_eq!(submits[0].priority, 100);
}

#[test]
fn test_grant_on_installed_pair_is_noop() {
    let fake = two_host_fake();
    fake.preset_path("aa", "bb", PathState::Installed, 100);
    let gate = gatekeeper(&fake);

    let mut event = packet("aa", "bb", b"allowTraffic");
    let verdict = gate.process(&mut event);

    // Installed and no revoke: the packet is forwarded, and the grant is
    // not reevaluated for it.
    assert_eq!(verdict, Verdict::Forwarded);
    assert_eq!(fake.submit_count(), 0);
    assert_eq!(fake.batch_count(), 0);
}

#[test]
fn test_grant_on_released_pair_resubmits_under_same_key() {
    let fake = two_host_fake();
    fake.preset_path("aa", "bb", PathState::Withdrawn, 100);
    let gate = gatekeeper(&fake);

    let mut event = packet("aa", "bb", b"allowTraffic");
    gate.process(&mut event);

    assert_eq!(fake.batch_count(), 1);
    assert_eq!(fake.submit_count(), 1);
    assert_eq!(fake.submits.lock().unwrap()[0].key, pair_key("aa", "bb"));
}

#[test]
fn test_grant_on_failed_pair_installs_drop_rule_not_submit() {
    let fake = two_host_fake();
    fake.preset_path("aa", "bb", PathState::Failed, 100);
    let gate = gatekeeper(&fake);

    let mut event = packet("aa", "bb", b"allowTraffic");
    let verdict = gate.process(&mut event);

    assert_eq!(verdict, Verdict::Dropped);
    assert_eq!(fake.submit_count(), 0, "failed paths are not resubmitted");
    assert_eq!(fake.batch_count(), 1);

    let batches = fake.rule_batches.lock().unwrap();
    let rule = &batches[0][0];
    assert_eq!(rule.priority, 99, "one below the failed path's priority");
    assert_eq!(rule.treatment, Treatment::Drop);
    assert_eq!(rule.lifetime, RuleLifetime::Temporary(300));
    assert_eq!(
        rule.selector,
        Selector {
            src: Some(EndpointId::new("aa")),
            dst: Some(EndpointId::new("bb")),
            ..Selector::default()
        }
    );
}

#[test]
fn test_failed_pair_resubmits_when_configured() {
    let fake = two_host_fake();
    fake.preset_path("aa", "bb", PathState::Failed, 100);
    let config = GateConfig {
        failed_policy: FailedPolicy::Resubmit,
        ..GateConfig::default()
    };
    let gate = gatekeeper_with(&fake, config);

    let mut event = packet("aa", "bb", b"allowTraffic");
    gate.process(&mut event);

    assert_eq!(fake.submit_count(), 1);
    // The only rule batch is the back-channel, not a drop rule
    let batches = fake.rule_batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert!(batches[0].iter().all(|r| r.treatment != Treatment::Drop));
}

#[test]
fn test_revoke_on_installed_pair_withdraws_and_does_not_forward() {
    let fake = two_host_fake();
    fake.preset_path("aa", "bb", PathState::Installed, 100);
    let gate = gatekeeper(&fake);

    let mut event = packet("aa", "bb", b"dig txt stopTraffic.example");
    let verdict = gate.process(&mut event);

    assert_eq!(fake.withdraw_count(), 1, "exactly one withdraw call");
    assert_eq!(verdict, Verdict::Dropped);
    assert_eq!(fake.emit_count(), 0, "packet must not be forwarded");
}

#[test]
fn test_payload_with_both_cookies_revokes_then_regrants() {
    // A payload can coincidentally carry both patterns; revoke runs first
    // and grant is still evaluated against the re-read state.
    let fake = two_host_fake();
    fake.preset_path("aa", "bb", PathState::Installed, 100);
    let gate = gatekeeper(&fake);

    let mut event = packet("aa", "bb", b"stopTraffic ... allowTraffic");
    let verdict = gate.process(&mut event);

    assert_eq!(fake.withdraw_count(), 1);
    assert_eq!(
        fake.submit_count(),
        1,
        "grant sees the released state left by the revoke and resubmits"
    );
    assert_eq!(verdict, Verdict::Dropped);
    assert_eq!(fake.emit_count(), 0);
}

#[test]
fn test_grant_aborts_when_source_unresolvable() {
    // Destination resolves (so the packet is not flooded) but the source
    // has no attachment point: fail closed, no rules, no submission.
    let fake = Arc::new(FakePlatform::new().attach("bb", "of:2", 2));
    let gate = gatekeeper(&fake);

    let mut event = packet("ghost", "bb", b"allowTraffic");
    let verdict = gate.process(&mut event);

    assert_eq!(verdict, Verdict::Dropped);
    assert_eq!(fake.batch_count(), 0);
    assert_eq!(fake.submit_count(), 0);
}

// ============================================================================
// Forwarding and flooding
// ============================================================================

#[test]
fn test_installed_pair_forwards_to_destination_attachment() {
    let fake = two_host_fake();
    fake.preset_path("aa", "bb", PathState::Installed, 100);
    let gate = gatekeeper(&fake);

    let mut event = packet("aa", "bb", b"ordinary data");
    let verdict = gate.process(&mut event);

    assert_eq!(verdict, Verdict::Forwarded);
    assert!(event.is_handled());
    assert_eq!(
        event.resolved_dst,
        Some(ConnectPoint::new(DeviceId::new("of:2"), PortNumber::Number(2)))
    );

    let emitted = fake.emitted.lock().unwrap();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].0, DeviceId::new("of:2"));
    assert_eq!(emitted[0].1, Treatment::Output(PortNumber::Number(2)));
    assert_eq!(emitted[0].2, b"ordinary data");
}

#[test]
fn test_forwarding_is_direction_agnostic() {
    // The path was granted for (aa, bb); a packet in the reverse direction
    // resolves to the same canonical key and is forwarded too.
    let fake = two_host_fake();
    fake.preset_path("aa", "bb", PathState::Installed, 100);
    let gate = gatekeeper(&fake);

    let mut event = PacketEvent::new(
        EndpointId::new("bb"),
        EndpointId::new("aa"),
        ConnectPoint::new(DeviceId::new("of:2"), PortNumber::Number(2)),
        b"reply data".to_vec(),
    );
    let verdict = gate.process(&mut event);

    assert_eq!(verdict, Verdict::Forwarded);
    let emitted = fake.emitted.lock().unwrap();
    assert_eq!(emitted[0].0, DeviceId::new("of:1"));
    assert_eq!(emitted[0].1, Treatment::Output(PortNumber::Number(1)));
}

#[test]
fn test_unknown_destination_floods_at_broadcast_point() {
    let fake = Arc::new(
        FakePlatform::new()
            .attach("aa", "of:1", 1)
            .broadcast_point("of:1", 1),
    );
    let gate = gatekeeper(&fake);

    let mut event = packet("aa", "unknown", b"who has unknown?");
    let verdict = gate.process(&mut event);

    assert_eq!(verdict, Verdict::Flooded);
    assert!(event.is_handled());
    assert_eq!(event.resolved_dst, None);

    let emitted = fake.emitted.lock().unwrap();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].0, DeviceId::new("of:1"));
    assert_eq!(emitted[0].1, Treatment::Output(PortNumber::Flood));
}

#[test]
fn test_unknown_destination_blocked_off_broadcast_point() {
    let fake = Arc::new(FakePlatform::new().attach("aa", "of:1", 1));
    let gate = gatekeeper(&fake);

    let mut event = packet("aa", "unknown", b"who has unknown?");
    let verdict = gate.process(&mut event);

    assert_eq!(verdict, Verdict::Blocked);
    assert_eq!(fake.emit_count(), 0, "no emission when blocked");
}

#[test]
fn test_cookie_in_unknown_destination_packet_does_not_provision() {
    // Flooded packets stop before signal evaluation
    let fake = Arc::new(
        FakePlatform::new()
            .attach("aa", "of:1", 1)
            .broadcast_point("of:1", 1),
    );
    let gate = gatekeeper(&fake);

    let mut event = packet("aa", "unknown", b"allowTraffic");
    let verdict = gate.process(&mut event);

    assert_eq!(verdict, Verdict::Flooded);
    assert_eq!(fake.submit_count(), 0);
    assert_eq!(fake.batch_count(), 0);
}

// ============================================================================
// Malformed and handled packets
// ============================================================================

#[test]
fn test_handled_packet_is_ignored() {
    let fake = two_host_fake();
    let gate = gatekeeper(&fake);

    let mut event = packet("aa", "bb", b"allowTraffic");
    event.mark_handled();
    let verdict = gate.process(&mut event);

    assert_eq!(verdict, Verdict::Ignored);
    assert_eq!(fake.submit_count(), 0);
    assert_eq!(fake.emit_count(), 0);
}

#[test]
fn test_malformed_packet_is_ignored() {
    let fake = two_host_fake();
    let gate = gatekeeper(&fake);

    let mut event = packet("", "bb", b"allowTraffic");
    assert_eq!(gate.process(&mut event), Verdict::Ignored);

    let mut event = packet("aa", "", b"allowTraffic");
    assert_eq!(gate.process(&mut event), Verdict::Ignored);

    assert_eq!(fake.submit_count(), 0);
    assert_eq!(fake.batch_count(), 0);
    assert_eq!(fake.emit_count(), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_grants_deduplicate_to_one_submit() {
    let fake = two_host_fake();
    let gate = Arc::new(gatekeeper(&fake));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let gate = gate.clone();
        handles.push(thread::spawn(move || {
            let mut event = packet("aa", "bb", b"allowTraffic");
            gate.process(&mut event);
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        fake.submit_count(),
        1,
        "racing grants must collapse to a single path submission"
    );
    assert_eq!(fake.batch_count(), 1, "and a single back-channel install");
}

#[test]
fn test_concurrent_mixed_signals_keep_state_consistent() {
    // Interleaved grants and revokes from both directions; whatever the
    // interleaving, the pair must end in a platform-known state and every
    // submission must have been preceded by a back-channel batch.
    let fake = two_host_fake();
    let gate = Arc::new(gatekeeper(&fake));

    let mut handles = Vec::new();
    for i in 0..8 {
        let gate = gate.clone();
        let payload: &[u8] = if i % 2 == 0 {
            b"allowTraffic"
        } else {
            b"stopTraffic"
        };
        let (src, dst) = if i % 4 < 2 { ("aa", "bb") } else { ("bb", "aa") };
        handles.push(thread::spawn({
            let payload = payload.to_vec();
            let src = src.to_string();
            let dst = dst.to_string();
            move || {
                let mut event = packet(&src, &dst, &payload);
                gate.process(&mut event);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(fake.batch_count() >= fake.submit_count());
    let paths = fake.paths.lock().unwrap();
    assert!(paths.len() <= 1, "both directions share one canonical key");
}
