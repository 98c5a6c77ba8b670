//! Connectivity state machine and packet-in gatekeeper loop
//!
//! # Per-packet flow
//!
//! ```text
//! packet ──► handled / malformed?  ──► ignore
//!        ──► destination unknown?  ──► flood at broadcast point, else block
//!        ──► scan payload for revoke + grant cookies
//!        ──► revoke: installed path → withdraw
//!        ──► no revoke and installed → forward to destination, done
//!        ──► grant: absent/released → back-channel + submit
//!                   failed          → temporary drop rule (or resubmit)
//!                   installed       → no-op
//!        ──► installed as a result of the grant (and no revoke) → forward
//!        ──► otherwise drop (no forwarding instruction)
//! ```
//!
//! # Transition policy
//!
//! A payload may carry both cookies at once; revoke is evaluated first and
//! grant is still evaluated afterwards on the same packet. The two are
//! deliberately not mutually exclusive.
//!
//! Every transition runs under the pair's shard lock, and the observed path
//! state is re-read inside the critical section right before any mutating
//! request: platform state is shared and externally mutable, so a check made
//! outside the lock is stale by definition.

use crate::backchannel::BackChannelProvisioner;
use crate::classifier::find_cookie;
use crate::config::{FailedPolicy, GateConfig};
use crate::error::ConfigError;
use crate::locks::PairLocks;
use crate::pair::{ApplicationId, PairKey};
use crate::platform::{
    ConnectPoint,
    FlowRule,
    PacketEvent,
    PathRequest,
    PathState,
    PlatformServices,
    PortNumber,
    RuleLifetime,
    Selector,
    Treatment,
};

use std::fmt;

// ============================================================================
// Verdict
// ============================================================================

/// The forwarding decision for one inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Already handled by another processor, or malformed; nothing done
    Ignored,
    /// Destination unknown and the ingress is a broadcast point
    Flooded,
    /// Destination unknown and the ingress is not a broadcast point
    Blocked,
    /// Pair installed; packet emitted at the destination's attachment
    Forwarded,
    /// No forwarding instruction issued; the packet is implicitly dropped
    Dropped,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Ignored => write!(f, "ignored"),
            Verdict::Flooded => write!(f, "flooded"),
            Verdict::Blocked => write!(f, "blocked"),
            Verdict::Forwarded => write!(f, "forwarded"),
            Verdict::Dropped => write!(f, "dropped"),
        }
    }
}

// ============================================================================
// Gatekeeper
// ============================================================================

/// The packet-in entry point: classifies cookies, drives per-pair
/// transitions, and decides flood / forward / block / drop.
///
/// All methods take `&self`; one instance is shared across concurrent
/// packet workers, with pair transitions serialized by the internal lock
/// table.
pub struct Gatekeeper {
    app: ApplicationId,
    grant_cookie: Vec<u8>,
    revoke_cookie: Vec<u8>,
    path_priority: u16,
    drop_rule_timeout_secs: u32,
    failed_policy: FailedPolicy,
    backchannel: BackChannelProvisioner,
    locks: PairLocks,
    platform: PlatformServices,
}

impl Gatekeeper {
    /// Validate the configuration and wire up the gatekeeper.
    pub fn new(
        app: ApplicationId,
        config: GateConfig,
        platform: PlatformServices,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        log::info!(
            "gatekeeper up for {} (grant={:?} revoke={:?} signaling port {} backchannel prio {})",
            app,
            config.grant_cookie,
            config.revoke_cookie,
            config.signaling_port,
            config.backchannel_priority,
        );

        Ok(Gatekeeper {
            backchannel: BackChannelProvisioner::new(
                app.clone(),
                config.signaling_port,
                config.backchannel_priority,
            ),
            locks: PairLocks::new(config.lock_shards),
            grant_cookie: config.grant_cookie.into_bytes(),
            revoke_cookie: config.revoke_cookie.into_bytes(),
            path_priority: config.path_priority,
            drop_rule_timeout_secs: config.drop_rule_timeout_secs,
            failed_policy: config.failed_policy,
            app,
            platform,
        })
    }

    /// Process one inbound packet and return the forwarding decision.
    pub fn process(&self, event: &mut PacketEvent) -> Verdict {
        if event.is_handled() || event.src.is_empty() || event.dst.is_empty() {
            return Verdict::Ignored;
        }

        event.resolved_dst = self.platform.endpoints.resolve(&event.dst);
        let dst_point = match event.resolved_dst.clone() {
            Some(point) => point,
            None => return self.flood(event),
        };

        let revoked = find_cookie(&event.payload, &self.revoke_cookie);
        let granted = find_cookie(&event.payload, &self.grant_cookie);
        let key = PairKey::new(&self.app, &event.src, &event.dst);

        if revoked {
            log::info!("revoke cookie from {} to {}, releasing {}", event.src, event.dst, key);
            self.revoke(&key);
        } else if self.installed(&key) {
            // Already granted: hand the packet straight to the destination
            // and skip further signal evaluation for it.
            return self.forward(event, &dst_point);
        }

        if granted {
            log::info!("grant cookie from {} to {}, provisioning {}", event.src, event.dst, key);
            self.grant(&key, event);

            // A synchronous platform may have the path installed already as
            // a result of this packet; if so hand the packet on instead of
            // dropping it. Never after a revoke on the same packet.
            if !revoked && self.installed(&key) {
                return self.forward(event, &dst_point);
            }
        }

        Verdict::Dropped
    }

    // ------------------------------------------------------------------
    // Transition policy
    // ------------------------------------------------------------------

    /// Withdraw the pair's path if one exists and is installed. Revoking an
    /// absent or already-released path is a no-op, not an error.
    fn revoke(&self, key: &PairKey) {
        let _guard = self.locks.guard(key);

        let record = match self.platform.paths.path(key) {
            Some(record) => record,
            None => {
                log::debug!("revoke for {} ignored, no path requested", key);
                return;
            }
        };

        if self.platform.paths.state(key) != Some(PathState::Installed) {
            log::debug!("revoke for {} ignored, path not installed", key);
            return;
        }

        if let Err(err) = self.platform.paths.withdraw(&record) {
            log::warn!("withdraw for {} failed: {}", key, err);
        }
    }

    /// Drive the grant transition for the pair, re-reading the observed
    /// state under the pair lock.
    fn grant(&self, key: &PairKey, event: &PacketEvent) {
        let _guard = self.locks.guard(key);

        let record = match self.platform.paths.path(key) {
            None => return self.open_and_submit(key, event),
            Some(record) => record,
        };

        match self.platform.paths.state(key) {
            // Record disappeared between the two reads; treat as absent.
            None => self.open_and_submit(key, event),
            Some(state) if state.is_released() => self.open_and_submit(key, event),
            Some(PathState::Failed) => match self.failed_policy {
                FailedPolicy::DropRule => self.install_drop_rule(record.priority, event),
                FailedPolicy::Resubmit => self.open_and_submit(key, event),
            },
            Some(state) => {
                log::debug!("grant for {} ignored, path already {:?}", key, state);
            }
        }
    }

    /// Provision the back-channel, then submit the path request. Called
    /// with the pair lock held. A back-channel failure aborts the grant
    /// before any path is requested.
    fn open_and_submit(&self, key: &PairKey, event: &PacketEvent) {
        if let Err(err) = self.backchannel.provision(
            self.platform.endpoints.as_ref(),
            self.platform.rules.as_ref(),
            &event.src,
            &event.dst,
        ) {
            log::warn!("back-channel for {} not provisioned, aborting grant: {}", key, err);
            return;
        }

        let request = PathRequest {
            key: key.clone(),
            one: event.src.clone(),
            two: event.dst.clone(),
            priority: self.path_priority,
            treatment: Treatment::Empty,
        };

        if let Err(err) = self.platform.paths.submit(request) {
            log::warn!("path submit for {} failed: {}", key, err);
        }
    }

    /// Convert a failed path into an explicit, time-bounded deny: one
    /// temporary drop rule between the endpoints, one priority below the
    /// failed path so a later successful install wins immediately.
    fn install_drop_rule(&self, path_priority: u16, event: &PacketEvent) {
        let mut devices = self.platform.endpoints.devices_of(&event.src);
        if devices.is_empty() {
            // Directory has nothing for the sender; the ingress device is
            // the one attachment we know is real.
            devices.push(event.ingress.device.clone());
        }

        let rules = devices
            .into_iter()
            .map(|device| FlowRule {
                device,
                selector: Selector {
                    src: Some(event.src.clone()),
                    dst: Some(event.dst.clone()),
                    ..Selector::default()
                },
                treatment: Treatment::Drop,
                priority: path_priority.saturating_sub(1),
                lifetime: RuleLifetime::Temporary(self.drop_rule_timeout_secs),
                app: self.app.clone(),
            })
            .collect::<Vec<_>>();

        log::info!(
            "path {} -> {} failed, installing temporary drop rule for {}s",
            event.src,
            event.dst,
            self.drop_rule_timeout_secs,
        );

        if let Err(err) = self.platform.rules.apply(rules) {
            log::warn!("drop rule install failed: {}", err);
        }
    }

    // ------------------------------------------------------------------
    // Forwarding
    // ------------------------------------------------------------------

    fn installed(&self, key: &PairKey) -> bool {
        self.platform.paths.state(key) == Some(PathState::Installed)
    }

    /// Emit the raw payload at the destination's attachment point.
    fn forward(&self, event: &mut PacketEvent, dst_point: &ConnectPoint) -> Verdict {
        log::debug!("pair installed, forwarding {} -> {} via {}", event.src, event.dst, dst_point);

        match self.platform.packets.emit(
            &dst_point.device,
            &Treatment::Output(dst_point.port),
            &event.payload,
        ) {
            Ok(()) => {
                event.mark_handled();
                Verdict::Forwarded
            }
            Err(err) => {
                log::warn!("forward to {} failed: {}", dst_point, err);
                Verdict::Dropped
            }
        }
    }

    /// Broadcast a packet with an unknown destination, but only from a
    /// designated broadcast point; anywhere else the packet is explicitly
    /// blocked rather than floated into an inconsistent state.
    fn flood(&self, event: &mut PacketEvent) -> Verdict {
        if !self.platform.topology.is_broadcast_point(&event.ingress) {
            log::debug!("blocking unknown-destination packet at {}", event.ingress);
            event.mark_handled();
            return Verdict::Blocked;
        }

        match self.platform.packets.emit(
            &event.ingress.device,
            &Treatment::Output(PortNumber::Flood),
            &event.payload,
        ) {
            Ok(()) => {
                event.mark_handled();
                Verdict::Flooded
            }
            Err(err) => {
                log::warn!("flood at {} failed: {}", event.ingress, err);
                Verdict::Dropped
            }
        }
    }
}
