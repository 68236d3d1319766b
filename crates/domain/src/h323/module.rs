use std::collections::HashSet;

use crate::common::entity::{Binding, Endpoint, ModuleName, PinholeSpec, Transport};
use crate::common::packet::Packet;
use crate::module::entity::{ModuleInfo, Outcome, ProxyModule};
use crate::module::error::ModuleError;
use crate::session::entity::Session;

/// Well-known H.225/Q.931 call-signalling port.
pub const H323_PORT: u16 = 1720;

/// Per-session record of endpoints a pinhole was already requested for.
///
/// Signalling payloads are retransmitted and re-scanned; the ledger is
/// what makes the scan idempotent.
#[derive(Debug, Default)]
pub struct PinholeLedger {
    requested: HashSet<Endpoint>,
}

impl PinholeLedger {
    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.requested.contains(endpoint)
    }

    pub fn len(&self) -> usize {
        self.requested.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requested.is_empty()
    }
}

/// Scan a payload for 6-byte big-endian (address, port) tuples whose
/// address equals the binding's translated inside address, and queue one
/// pinhole request per previously unseen port.
fn scan_for_pinholes(
    session: &mut Session,
    binding: &Binding,
    payload: &[u8],
    companion: Option<&ModuleName>,
) {
    let Some(needle) = binding.inside.v4_octets() else {
        // The 6-byte tuple encoding is IPv4-only.
        return;
    };

    let mut offset = 0;
    while offset + 6 <= payload.len() {
        let window = &payload[offset..offset + 6];
        if window[..4] != needle {
            offset += 1;
            continue;
        }
        let port = u16::from_be_bytes([window[4], window[5]]);
        if port == 0 {
            offset += 1;
            continue;
        }

        let target = Endpoint::new(binding.inside.addr, port);
        let fresh = session
            .private_mut::<PinholeLedger>()
            .map(|ledger| ledger.requested.insert(target))
            .unwrap_or(false);
        if fresh {
            session.request_pinhole(PinholeSpec {
                owner: binding.id,
                target,
                module: companion.cloned(),
            });
        }
        offset += 6;
    }
}

/// H.323 call-signalling proxy (TCP 1720).
///
/// Does not reshape the payload, so the hook never reports a length
/// delta; its job is pinhole discovery for the H.245 control channel.
pub struct H323Module {
    info: ModuleInfo,
    companion: ModuleName,
}

impl H323Module {
    pub fn new() -> Self {
        Self {
            info: ModuleInfo {
                name: ModuleName::new("h323"),
                title: "H.323 call signalling".to_string(),
                transport: Transport::Tcp,
                port: H323_PORT,
            },
            companion: ModuleName::new("h245"),
        }
    }

    pub fn boxed() -> Box<Self> {
        Box::new(Self::new())
    }

    fn scan(&self, session: &mut Session, binding: &Binding, packet: &Packet) -> Outcome {
        scan_for_pinholes(session, binding, &packet.payload, Some(&self.companion));
        Outcome::Unchanged
    }
}

impl Default for H323Module {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyModule for H323Module {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn on_session_create(
        &self,
        session: &mut Session,
        _binding: &Binding,
    ) -> Result<(), ModuleError> {
        session.set_private(PinholeLedger::default());
        Ok(())
    }

    fn on_outbound(
        &self,
        session: &mut Session,
        binding: &Binding,
        packet: &mut Packet,
    ) -> Result<Outcome, ModuleError> {
        Ok(self.scan(session, binding, packet))
    }

    fn on_inbound(
        &self,
        session: &mut Session,
        binding: &Binding,
        packet: &mut Packet,
    ) -> Result<Outcome, ModuleError> {
        Ok(self.scan(session, binding, packet))
    }
}

/// H.245 media-control companion (dynamically negotiated TCP ports).
///
/// Sessions attach through pinholes the H.323 module opened, so there is
/// no fixed port to match on. OpenLogicalChannel exchanges embed the RTP
/// endpoints the same way; those get plain pinholes with no further
/// module behind them.
pub struct H245Module {
    info: ModuleInfo,
}

impl H245Module {
    pub fn new() -> Self {
        Self {
            info: ModuleInfo {
                name: ModuleName::new("h245"),
                title: "H.245 media control".to_string(),
                transport: Transport::Tcp,
                port: 0,
            },
        }
    }

    pub fn boxed() -> Box<Self> {
        Box::new(Self::new())
    }
}

impl Default for H245Module {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyModule for H245Module {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn on_session_create(
        &self,
        session: &mut Session,
        _binding: &Binding,
    ) -> Result<(), ModuleError> {
        session.set_private(PinholeLedger::default());
        Ok(())
    }

    fn on_outbound(
        &self,
        session: &mut Session,
        binding: &Binding,
        packet: &mut Packet,
    ) -> Result<Outcome, ModuleError> {
        scan_for_pinholes(session, binding, &packet.payload, None);
        Ok(Outcome::Unchanged)
    }

    fn on_inbound(
        &self,
        session: &mut Session,
        binding: &Binding,
        packet: &mut Packet,
    ) -> Result<Outcome, ModuleError> {
        scan_for_pinholes(session, binding, &packet.payload, None);
        Ok(Outcome::Unchanged)
    }

    /// Matched through dynamically created bindings at arbitrary ports.
    fn matches(&self, _binding: &Binding) -> bool {
        true
    }
}
