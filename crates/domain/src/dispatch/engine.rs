use crate::common::entity::{Binding, Direction, Transport};
use crate::common::packet::Packet;
use crate::module::entity::{Outcome, ProxyModule};
use crate::module::error::ModuleError;
use crate::session::entity::Session;

use super::error::DispatchError;

/// What the caller must do with the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Forward,
    Drop,
}

/// Record of one segment's trip through the proxy layer.
#[derive(Debug)]
pub struct DispatchReport {
    pub disposition: Disposition,
    /// Payload length change applied by the module hook.
    pub delta: i32,
    /// The module decided proxying is over; the caller destroys the
    /// session after forwarding this segment.
    pub release: bool,
    /// A hook failure that was absorbed as `Unchanged`.
    pub hook_error: Option<ModuleError>,
}

impl DispatchReport {
    fn forward() -> Self {
        Self {
            disposition: Disposition::Forward,
            delta: 0,
            release: false,
            hook_error: None,
        }
    }
}

/// Run one segment through the module hook and the renumbering engine.
///
/// The caller holds the session's exclusive lock for the whole call and
/// provides the flow direction (outbound = sourced by the host owning
/// the binding's inside address).
///
/// Failure semantics: `ChecksumMismatch` aborts proxy processing for
/// this segment only, leaving it unmodified; a hook error is absorbed as
/// `Unchanged` and surfaced in the report; `Drop` is authoritative.
pub fn process_packet(
    session: &mut Session,
    module: &dyn ProxyModule,
    binding: &Binding,
    packet: &mut Packet,
    direction: Direction,
) -> Result<DispatchReport, DispatchError> {
    let is_tcp = packet.flow.transport == Transport::Tcp;

    if is_tcp && !packet.verify_checksum() {
        return Err(DispatchError::ChecksumMismatch);
    }

    // A reset ends the connection; the binding layer tears the session
    // down on its own path.
    if is_tcp && packet.flags.is_rst() {
        return Ok(DispatchReport::forward());
    }

    let pre_len = packet.payload_len() as u32;
    let raw_seq = packet.seq;
    let raw_ack = packet.ack;

    let hook_result = match direction {
        Direction::Outbound => module.on_outbound(session, binding, packet),
        Direction::Inbound => module.on_inbound(session, binding, packet),
    };
    let (outcome, hook_error) = match hook_result {
        Ok(outcome) => (outcome, None),
        Err(e) => (Outcome::Unchanged, Some(e)),
    };

    if outcome == Outcome::Drop {
        return Ok(DispatchReport {
            disposition: Disposition::Drop,
            delta: 0,
            release: false,
            hook_error,
        });
    }

    let delta = match outcome {
        Outcome::Rewritten(delta) => delta,
        _ => 0,
    };
    let release = outcome == Outcome::ReleaseSession;

    if is_tcp {
        let [outbound, inbound] = &mut session.streams;
        let (own, peer) = match direction {
            Direction::Outbound => (outbound, inbound),
            Direction::Inbound => (inbound, outbound),
        };

        // Translate against the state as recorded before this segment,
        // then record its rewrite: the rewritten bytes themselves start
        // before the new threshold and keep the previous offset.
        let new_seq = own.translate_seq(raw_seq);
        let new_ack = peer.translate_ack(raw_ack);
        if delta != 0 {
            own.record_rewrite(raw_seq, pre_len, delta);
        }

        packet.seq = new_seq;
        packet.ack = new_ack;
        if delta != 0 || new_seq != raw_seq || new_ack != raw_ack {
            packet.refresh_checksum();
        }
    } else if delta != 0 {
        packet.refresh_checksum();
    }

    session.packets += 1;
    session.bytes += packet.payload_len() as u64;

    Ok(DispatchReport {
        disposition: Disposition::Forward,
        delta,
        release,
        hook_error,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::common::entity::{Binding, BindingId, Endpoint, ModuleName};
    use crate::common::packet::{FlowTuple, SegmentFlags};
    use crate::module::entity::ModuleInfo;
    use crate::module::registry::ModuleRegistry;
    use crate::session::table::SessionTable;

    /// Rewrites every 4-byte inside address in the payload to its
    /// 15-byte zero-padded dotted-decimal form, the way a classic
    /// address-in-payload protocol forces a length change.
    struct AddressTextModule {
        info: ModuleInfo,
        hooks: Arc<AtomicU32>,
        verdict: Option<Outcome>,
        fail: bool,
    }

    impl AddressTextModule {
        fn boxed() -> Box<Self> {
            Box::new(Self {
                info: ModuleInfo {
                    name: ModuleName::new("addrtext"),
                    title: "address rewriter".to_string(),
                    transport: Transport::Tcp,
                    port: 6000,
                },
                hooks: Arc::new(AtomicU32::new(0)),
                verdict: None,
                fail: false,
            })
        }

        fn with_verdict(verdict: Outcome) -> Box<Self> {
            let mut module = Self::boxed();
            module.verdict = Some(verdict);
            module
        }

        fn rewrite(&self, binding: &Binding, packet: &mut Packet) -> Outcome {
            let Some(needle) = binding.inside.v4_octets() else {
                return Outcome::Unchanged;
            };
            let Some(pos) = packet
                .payload
                .windows(4)
                .position(|window| window == needle)
            else {
                return Outcome::Unchanged;
            };
            let text = format!("{:<15}", binding.inside.addr);
            packet.payload.splice(pos..pos + 4, text.into_bytes());
            Outcome::Rewritten(11)
        }
    }

    impl ProxyModule for AddressTextModule {
        fn info(&self) -> &ModuleInfo {
            &self.info
        }

        fn on_outbound(
            &self,
            _session: &mut Session,
            binding: &Binding,
            packet: &mut Packet,
        ) -> Result<Outcome, ModuleError> {
            self.hooks.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ModuleError::HookFailed {
                    reason: "parse error".to_string(),
                });
            }
            if let Some(verdict) = self.verdict {
                return Ok(verdict);
            }
            Ok(self.rewrite(binding, packet))
        }

        fn on_inbound(
            &self,
            _session: &mut Session,
            _binding: &Binding,
            _packet: &mut Packet,
        ) -> Result<Outcome, ModuleError> {
            self.hooks.fetch_add(1, Ordering::SeqCst);
            Ok(Outcome::Unchanged)
        }
    }

    fn make_binding() -> Binding {
        Binding {
            id: BindingId(1),
            inside: Endpoint::new("10.0.0.1".parse().unwrap(), 40000),
            outside: Endpoint::new("203.0.113.9".parse().unwrap(), 40000),
            transport: Transport::Tcp,
            module: ModuleName::new("addrtext"),
            proxy_port: 6000,
        }
    }

    fn make_tcp_packet(direction: Direction, seq: u32, ack: u32, payload: &[u8]) -> Packet {
        let inside = Endpoint::new("10.0.0.1".parse().unwrap(), 40000);
        let outside = Endpoint::new("203.0.113.9".parse().unwrap(), 6000);
        let (src, dst) = match direction {
            Direction::Outbound => (inside, outside),
            Direction::Inbound => (outside, inside),
        };
        let mut packet = Packet {
            flow: FlowTuple {
                transport: Transport::Tcp,
                src,
                dst,
            },
            seq,
            ack,
            flags: SegmentFlags(SegmentFlags::ACK),
            checksum: 0,
            payload: payload.to_vec(),
        };
        packet.refresh_checksum();
        packet
    }

    fn setup(module: Box<AddressTextModule>) -> (SessionTable, ModuleRegistry, Binding) {
        let mut registry = ModuleRegistry::new();
        registry.register(module).unwrap();
        let binding = make_binding();
        let mut table = SessionTable::new();
        table.create(&binding, &mut registry).unwrap();
        (table, registry, binding)
    }

    fn run(
        table: &SessionTable,
        registry: &ModuleRegistry,
        binding: &Binding,
        packet: &mut Packet,
        direction: Direction,
    ) -> Result<DispatchReport, DispatchError> {
        let arc = table.session_for(binding.id).unwrap();
        let mut session = arc.lock().unwrap();
        let module = registry.get(session.module).unwrap();
        process_packet(&mut session, module, binding, packet, direction)
    }

    // ── Checksum gate ─────────────────────────────────────────────

    #[test]
    fn bad_checksum_aborts_untouched() {
        let (table, registry, binding) = setup(AddressTextModule::boxed());
        let mut packet = make_tcp_packet(Direction::Outbound, 1000, 0, b"data");
        packet.checksum ^= 0xFFFF;
        let before = packet.clone();

        let err = run(&table, &registry, &binding, &mut packet, Direction::Outbound).unwrap_err();
        assert!(matches!(err, DispatchError::ChecksumMismatch));
        assert_eq!(packet, before);
    }

    // ── Reset bypass ──────────────────────────────────────────────

    #[test]
    fn rst_skips_module_entirely() {
        let module = AddressTextModule::boxed();
        let hooks = Arc::clone(&module.hooks);
        let (table, registry, binding) = setup(module);

        let mut packet = make_tcp_packet(Direction::Outbound, 1000, 0, b"");
        packet.flags = SegmentFlags(SegmentFlags::RST);
        packet.refresh_checksum();

        let report = run(&table, &registry, &binding, &mut packet, Direction::Outbound).unwrap();
        assert_eq!(report.disposition, Disposition::Forward);
        assert_eq!(hooks.load(Ordering::SeqCst), 0);
    }

    // ── Plain forwarding ──────────────────────────────────────────

    #[test]
    fn unchanged_updates_counters_only() {
        let (table, registry, binding) = setup(AddressTextModule::boxed());
        let mut packet = make_tcp_packet(Direction::Outbound, 1000, 500, b"no address here");
        let before = packet.clone();

        let report = run(&table, &registry, &binding, &mut packet, Direction::Outbound).unwrap();
        assert_eq!(report.disposition, Disposition::Forward);
        assert_eq!(report.delta, 0);
        assert_eq!(packet, before);

        let arc = table.session_for(binding.id).unwrap();
        let session = arc.lock().unwrap();
        assert_eq!(session.packets, 1);
        assert_eq!(session.bytes, 15);
    }

    // ── Rewrite path, end to end ──────────────────────────────────

    #[test]
    fn rewrite_records_offset_and_renumbers_later_segments() {
        let (table, registry, binding) = setup(AddressTextModule::boxed());

        // 20-byte segment at seq 1000 carrying the 4-byte inside address:
        // rewritten to 15 bytes of text, delta +11, threshold 1019.
        let mut payload = b"ADDR....12345678....".to_vec();
        payload.splice(4..8, [10, 0, 0, 1]);
        assert_eq!(payload.len(), 20);

        let mut first = make_tcp_packet(Direction::Outbound, 1000, 0, &payload);
        let report = run(&table, &registry, &binding, &mut first, Direction::Outbound).unwrap();
        assert_eq!(report.delta, 11);
        assert_eq!(first.payload_len(), 31);
        assert!(first.verify_checksum());
        // The segment that carried the rewrite keeps its own number.
        assert_eq!(first.seq, 1000);

        // Boundary: raw 1019 is still the old generation.
        let mut boundary = make_tcp_packet(Direction::Outbound, 1019, 0, b"x");
        run(&table, &registry, &binding, &mut boundary, Direction::Outbound).unwrap();
        assert_eq!(boundary.seq, 1019);

        // One past the boundary shifts by the delta.
        let mut past = make_tcp_packet(Direction::Outbound, 1020, 0, b"x");
        run(&table, &registry, &binding, &mut past, Direction::Outbound).unwrap();
        assert_eq!(past.seq, 1031);
        assert!(past.verify_checksum());
    }

    #[test]
    fn inbound_ack_mirrors_outbound_rewrite() {
        let (table, registry, binding) = setup(AddressTextModule::boxed());

        let mut payload = vec![10, 0, 0, 1];
        payload.extend_from_slice(&[0u8; 16]);
        let mut first = make_tcp_packet(Direction::Outbound, 1000, 0, &payload);
        run(&table, &registry, &binding, &mut first, Direction::Outbound).unwrap();

        // Advance the outbound stream past the threshold.
        let mut next = make_tcp_packet(Direction::Outbound, 1020, 0, b"x");
        run(&table, &registry, &binding, &mut next, Direction::Outbound).unwrap();
        assert_eq!(next.seq, 1031);

        // The peer acknowledges the shifted stream position; the proxy
        // maps it back before the inside host sees it.
        let mut reply = make_tcp_packet(Direction::Inbound, 500, 1031, b"");
        let report = run(&table, &registry, &binding, &mut reply, Direction::Inbound).unwrap();
        assert_eq!(report.disposition, Disposition::Forward);
        assert_eq!(reply.ack, 1020);
        assert_eq!(reply.seq, 500);
        assert!(reply.verify_checksum());
    }

    // ── Module verdicts ───────────────────────────────────────────

    #[test]
    fn drop_verdict_is_authoritative() {
        let (table, registry, binding) = setup(AddressTextModule::with_verdict(Outcome::Drop));
        let mut packet = make_tcp_packet(Direction::Outbound, 1, 0, b"boom");
        let report = run(&table, &registry, &binding, &mut packet, Direction::Outbound).unwrap();
        assert_eq!(report.disposition, Disposition::Drop);

        // Dropped segments are not counted as proxied traffic.
        let arc = table.session_for(binding.id).unwrap();
        assert_eq!(arc.lock().unwrap().packets, 0);
    }

    #[test]
    fn release_verdict_forwards_and_flags() {
        let (table, registry, binding) =
            setup(AddressTextModule::with_verdict(Outcome::ReleaseSession));
        let mut packet = make_tcp_packet(Direction::Outbound, 1, 0, b"done");
        let report = run(&table, &registry, &binding, &mut packet, Direction::Outbound).unwrap();
        assert_eq!(report.disposition, Disposition::Forward);
        assert!(report.release);
    }

    #[test]
    fn hook_failure_is_soft_and_surfaces() {
        let mut module = AddressTextModule::boxed();
        module.fail = true;
        let (table, registry, binding) = setup(module);

        let mut packet = make_tcp_packet(Direction::Outbound, 1000, 0, b"payload");
        let before_payload = packet.payload.clone();
        let report = run(&table, &registry, &binding, &mut packet, Direction::Outbound).unwrap();

        assert_eq!(report.disposition, Disposition::Forward);
        assert!(report.hook_error.is_some());
        assert_eq!(report.delta, 0);
        assert_eq!(packet.payload, before_payload);
    }

    // ── UDP path ──────────────────────────────────────────────────

    #[test]
    fn udp_skips_checksum_gate_and_translation() {
        let module = AddressTextModule::boxed();
        let (table, registry, binding) = setup(module);

        let mut packet = make_tcp_packet(Direction::Outbound, 0, 0, b"datagram");
        packet.flow.transport = Transport::Udp;
        packet.checksum = 0xBEEF; // wrong on purpose; UDP is not gated here

        let report = run(&table, &registry, &binding, &mut packet, Direction::Outbound).unwrap();
        assert_eq!(report.disposition, Disposition::Forward);
        assert_eq!(packet.seq, 0);

        let arc = table.session_for(binding.id).unwrap();
        assert_eq!(arc.lock().unwrap().packets, 1);
    }
}
