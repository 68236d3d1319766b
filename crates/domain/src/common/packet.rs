use std::net::IpAddr;

use super::entity::{Endpoint, Transport};

/// TCP header flag bits, as a plain byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentFlags(pub u8);

impl SegmentFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;

    pub fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn is_rst(self) -> bool {
        self.has(Self::RST)
    }

    pub fn is_ack(self) -> bool {
        self.has(Self::ACK)
    }
}

/// Addresses and ports a segment travels between.
///
/// These are the post-translation values: the embedding engine rewrites
/// the address header before handing the segment to the proxy layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowTuple {
    pub transport: Transport,
    pub src: Endpoint,
    pub dst: Endpoint,
}

/// Mutable view of one transport segment.
///
/// `seq`, `ack`, and `flags` are meaningful for TCP only; UDP datagrams
/// carry zeroes there. The payload may be rewritten in place by a module
/// hook, which may change its length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub flow: FlowTuple,
    pub seq: u32,
    pub ack: u32,
    pub flags: SegmentFlags,
    pub checksum: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Compute the transport checksum over pseudo-header, transport
    /// header fields, and payload, with the checksum field taken as zero.
    pub fn compute_checksum(&self) -> u16 {
        let mut sum: u32 = 0;

        // Pseudo-header: addresses, protocol, transport length.
        sum = sum_addr(sum, &self.flow.src.addr);
        sum = sum_addr(sum, &self.flow.dst.addr);
        sum += u32::from(self.flow.transport.to_u8());
        let header_len: u32 = match self.flow.transport {
            Transport::Tcp => 20,
            Transport::Udp => 8,
        };
        let total_len = header_len + self.payload.len() as u32;
        sum += total_len >> 16;
        sum += total_len & 0xFFFF;

        // Transport header fields (checksum field omitted).
        sum += u32::from(self.flow.src.port);
        sum += u32::from(self.flow.dst.port);
        if self.flow.transport == Transport::Tcp {
            sum += self.seq >> 16;
            sum += self.seq & 0xFFFF;
            sum += self.ack >> 16;
            sum += self.ack & 0xFFFF;
            sum += u32::from(self.flags.0);
        }

        sum = sum_bytes(sum, &self.payload);
        fold(sum)
    }

    /// Whether the stored checksum matches the segment's current content.
    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Recompute and store the checksum after a modification.
    pub fn refresh_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }
}

fn sum_addr(sum: u32, addr: &IpAddr) -> u32 {
    match addr {
        IpAddr::V4(v4) => sum_bytes(sum, &v4.octets()),
        IpAddr::V6(v6) => sum_bytes(sum, &v6.octets()),
    }
}

/// One's-complement sum of 16-bit big-endian words, odd tail zero-padded.
fn sum_bytes(mut sum: u32, bytes: &[u8]) -> u32 {
    let mut chunks = bytes.chunks_exact(2);
    for pair in &mut chunks {
        sum += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(u16::from_be_bytes([*last, 0]));
    }
    sum
}

fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet(payload: &[u8]) -> Packet {
        let mut packet = Packet {
            flow: FlowTuple {
                transport: Transport::Tcp,
                src: Endpoint::new("192.168.0.5".parse().unwrap(), 40001),
                dst: Endpoint::new("10.0.0.1".parse().unwrap(), 1720),
            },
            seq: 1000,
            ack: 5000,
            flags: SegmentFlags(SegmentFlags::ACK | SegmentFlags::PSH),
            checksum: 0,
            payload: payload.to_vec(),
        };
        packet.refresh_checksum();
        packet
    }

    // ── Flags ─────────────────────────────────────────────────────

    #[test]
    fn flag_bits() {
        let flags = SegmentFlags(SegmentFlags::RST | SegmentFlags::ACK);
        assert!(flags.is_rst());
        assert!(flags.is_ack());
        assert!(!flags.has(SegmentFlags::SYN));
    }

    // ── Checksum ──────────────────────────────────────────────────

    #[test]
    fn refresh_then_verify() {
        let packet = make_packet(b"PORT 10,0,0,1,4,1\r\n");
        assert!(packet.verify_checksum());
    }

    #[test]
    fn payload_change_invalidates() {
        let mut packet = make_packet(b"hello");
        packet.payload[0] ^= 0xFF;
        assert!(!packet.verify_checksum());
    }

    #[test]
    fn seq_change_invalidates() {
        let mut packet = make_packet(b"hello");
        packet.seq += 1;
        assert!(!packet.verify_checksum());
        packet.refresh_checksum();
        assert!(packet.verify_checksum());
    }

    #[test]
    fn odd_payload_length() {
        let packet = make_packet(b"odd");
        assert!(packet.verify_checksum());
    }

    #[test]
    fn empty_payload() {
        let packet = make_packet(b"");
        assert!(packet.verify_checksum());
        assert_eq!(packet.payload_len(), 0);
    }

    #[test]
    fn udp_checksum_ignores_seq_ack() {
        let mut packet = make_packet(b"datagram");
        packet.flow.transport = Transport::Udp;
        packet.refresh_checksum();
        let before = packet.checksum;
        packet.seq = 999;
        packet.ack = 999;
        assert_eq!(packet.compute_checksum(), before);
    }

    #[test]
    fn v6_addresses_sum() {
        let mut packet = make_packet(b"payload");
        packet.flow.src = Endpoint::new("2001:db8::1".parse().unwrap(), 40001);
        packet.flow.dst = Endpoint::new("2001:db8::2".parse().unwrap(), 1720);
        packet.refresh_checksum();
        assert!(packet.verify_checksum());
    }
}
