//! Signaling back-channel provisioner
//!
//! Control cookies arrive inside signaling traffic (UDP destination port 53
//! by convention), and a revoke must stay deliverable even while the pair's
//! data traffic is blocked. Before any path is requested, one permanent
//! rule per endpoint side punts that endpoint's signaling traffic to the
//! controller, at a priority above every data-path rule so it always wins
//! arbitration.
//!
//! ```text
//! src endpoint ──► [src device: udp/53 from src → CONTROLLER  prio 40001]
//! dst endpoint ──► [dst device: udp/53 from dst → CONTROLLER  prio 40001]
//! ```
//!
//! If either endpoint cannot be resolved to an attachment point, nothing is
//! installed and the grant is aborted: a one-sided back-channel would leave
//! the unresolved side unable to signal at all.

use crate::error::GateError;
use crate::pair::{ApplicationId, EndpointId};
use crate::platform::{
    ConnectPoint,
    EndpointDirectory,
    FlowRule,
    PortNumber,
    RuleInstaller,
    RuleLifetime,
    Selector,
    Treatment,
};

/// Installs the pair's signaling back-channel ahead of each path request.
pub struct BackChannelProvisioner {
    app: ApplicationId,
    signaling_port: u16,
    priority: u16,
}

impl BackChannelProvisioner {
    pub fn new(app: ApplicationId, signaling_port: u16, priority: u16) -> Self {
        BackChannelProvisioner {
            app,
            signaling_port,
            priority,
        }
    }

    /// Resolve both endpoints and install their back-channel rules in one
    /// batch. Fails closed without touching the data plane if either
    /// resolution comes back empty.
    pub fn provision(
        &self,
        directory: &dyn EndpointDirectory,
        installer: &dyn RuleInstaller,
        src: &EndpointId,
        dst: &EndpointId,
    ) -> Result<(), GateError> {
        let src_point = directory
            .resolve(src)
            .ok_or_else(|| GateError::UnresolvedEndpoint(src.clone()))?;
        let dst_point = directory
            .resolve(dst)
            .ok_or_else(|| GateError::UnresolvedEndpoint(dst.clone()))?;

        log::debug!(
            "opening back-channel for {} at {} and {} at {}",
            src,
            src_point,
            dst,
            dst_point
        );

        let rules = vec![
            self.rule_for(src, &src_point),
            self.rule_for(dst, &dst_point),
        ];

        installer.apply(rules).map_err(GateError::Platform)
    }

    /// One rule at the endpoint's attachment device: match its signaling
    /// traffic on the attachment port, punt to the controller, permanent.
    fn rule_for(&self, endpoint: &EndpointId, attachment: &ConnectPoint) -> FlowRule {
        FlowRule {
            device: attachment.device.clone(),
            selector: Selector {
                src: Some(endpoint.clone()),
                udp_dst: Some(self.signaling_port),
                in_port: Some(attachment.port),
                ..Selector::default()
            },
            treatment: Treatment::Output(PortNumber::Controller),
            priority: self.priority,
            lifetime: RuleLifetime::Permanent,
            app: self.app.clone(),
        }
    }
}
