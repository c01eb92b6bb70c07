use std::net::Ipv4Addr;

use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpType, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};

use crate::error::PingError;

/// Total size of every echo frame we send, header included.
pub const ECHO_FRAME_SIZE: usize = 64;
pub const ECHO_HEADER_SIZE: usize = 8;
pub const ECHO_PAYLOAD_SIZE: usize = ECHO_FRAME_SIZE - ECHO_HEADER_SIZE;
pub const PAYLOAD_FILL: u8 = 0x42;

const MIN_IPV4_HEADER_SIZE: usize = 20;

pub type EchoFrame = [u8; ECHO_FRAME_SIZE];

/// One's-complement sum of big-endian 16-bit words, complemented.
///
/// A trailing odd byte is padded with a zero low byte.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u64 = 0;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u16::from_be_bytes([word[0], word[1]]) as u64;
    }
    if let [last] = words.remainder() {
        sum += (*last as u64) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// A frame carrying its own checksum sums to zero.
pub fn verify_checksum(data: &[u8]) -> bool {
    internet_checksum(data) == 0
}

pub fn build_echo_request(sequence: u16, identifier: u16) -> EchoFrame {
    make_packet(IcmpTypes::EchoRequest, sequence, identifier)
}

/// The frame a well-behaved destination answers a request with.
pub fn build_echo_reply(sequence: u16, identifier: u16) -> EchoFrame {
    make_packet(IcmpTypes::EchoReply, sequence, identifier)
}

// Echo request and reply share one layout, only the type differs.
fn make_packet(icmp_type: IcmpType, sequence: u16, identifier: u16) -> EchoFrame {
    let mut frame = [0u8; ECHO_FRAME_SIZE];
    // ECHO_FRAME_SIZE always holds the 8 byte echo header
    if let Some(mut echo_packet) = MutableEchoRequestPacket::new(&mut frame[..]) {
        echo_packet.set_icmp_type(icmp_type);
        echo_packet.set_icmp_code(IcmpCode::new(0));
        echo_packet.set_identifier(identifier);
        echo_packet.set_sequence_number(sequence);
        echo_packet.set_payload(&[PAYLOAD_FILL; ECHO_PAYLOAD_SIZE]);
        echo_packet.set_checksum(0);
    }
    let echo_checksum = internet_checksum(&frame);
    frame[2..4].copy_from_slice(&echo_checksum.to_be_bytes());
    frame
}

/// Header fields of a frame read from the raw socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFrame {
    /// Length of the IPv4 header in bytes, options included.
    pub header_length: usize,
    pub ttl: u8,
    pub source: Ipv4Addr,
    pub icmp_type: IcmpType,
    pub icmp_code: IcmpCode,
    pub identifier: u16,
    pub sequence: u16,
    /// Bytes following the IPv4 header.
    pub icmp_length: usize,
}

/// Locates the ICMP message behind a variable length IPv4 header.
///
/// The header length field is read first and the buffer is checked against
/// it before any ICMP field is touched. The ICMP section must carry a valid
/// checksum.
pub fn parse_reply(raw: &[u8]) -> Result<ReplyFrame, PingError> {
    let ip_packet = Ipv4Packet::new(raw).ok_or_else(|| {
        PingError::MalformedFrame(format!("{} bytes is shorter than an ipv4 header", raw.len()))
    })?;
    if ip_packet.get_version() != 4 {
        return Err(PingError::MalformedFrame(format!(
            "ip version {}",
            ip_packet.get_version()
        )));
    }
    let header_length = ip_packet.get_header_length() as usize * 4;
    if header_length < MIN_IPV4_HEADER_SIZE {
        return Err(PingError::MalformedFrame(format!(
            "declared ip header length {} is below the minimum",
            header_length
        )));
    }
    if raw.len() < header_length {
        return Err(PingError::MalformedFrame(format!(
            "{} bytes is shorter than the declared ip header length {}",
            raw.len(),
            header_length
        )));
    }

    let icmp = &raw[header_length..];
    let echo_packet = EchoReplyPacket::new(icmp).ok_or_else(|| {
        PingError::MalformedFrame(format!("{} byte icmp message is truncated", icmp.len()))
    })?;
    if !verify_checksum(icmp) {
        return Err(PingError::MalformedFrame(format!(
            "bad icmp checksum {:#06x}",
            echo_packet.get_checksum()
        )));
    }

    Ok(ReplyFrame {
        header_length,
        ttl: ip_packet.get_ttl(),
        source: ip_packet.get_source(),
        icmp_type: echo_packet.get_icmp_type(),
        icmp_code: echo_packet.get_icmp_code(),
        identifier: echo_packet.get_identifier(),
        sequence: echo_packet.get_sequence_number(),
        icmp_length: icmp.len(),
    })
}

/// Wraps an ICMP message in the IPv4 header a raw socket hands back.
///
/// `option_words` adds that many zeroed 4-byte option words to the header.
pub fn build_ipv4_datagram(
    icmp: &[u8],
    source: Ipv4Addr,
    destination: Ipv4Addr,
    ttl: u8,
    option_words: u8,
) -> Vec<u8> {
    let option_words = option_words.min(10);
    let header_length = MIN_IPV4_HEADER_SIZE + option_words as usize * 4;
    let mut buf = vec![0u8; header_length + icmp.len()];
    if let Some(mut ip_packet) = MutableIpv4Packet::new(&mut buf[..]) {
        ip_packet.set_version(4);
        ip_packet.set_header_length(5 + option_words);
        ip_packet.set_total_length((header_length + icmp.len()) as u16);
        ip_packet.set_ttl(ttl);
        ip_packet.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
        ip_packet.set_source(source);
        ip_packet.set_destination(destination);
        let ip_checksum = ipv4::checksum(&ip_packet.to_immutable());
        ip_packet.set_checksum(ip_checksum);
    }
    buf[header_length..].copy_from_slice(icmp);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::icmp::{checksum, IcmpPacket};

    const SOURCE: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 7);
    const LOCAL: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

    #[test]
    fn request_layout() {
        let frame = build_echo_request(0x0102, 0xbeef);
        assert_eq!(frame.len(), ECHO_FRAME_SIZE);
        assert_eq!(frame[0], 8);
        assert_eq!(frame[1], 0);
        assert_eq!(&frame[4..6], &[0xbe, 0xef]);
        assert_eq!(&frame[6..8], &[0x01, 0x02]);
        assert!(frame[ECHO_HEADER_SIZE..].iter().all(|b| *b == PAYLOAD_FILL));
    }

    #[test]
    fn built_frames_validate() {
        for sequence in [0u16, 1, 255, 256, 40000, u16::MAX] {
            assert!(verify_checksum(&build_echo_request(sequence, 4242)));
            assert!(verify_checksum(&build_echo_reply(sequence, 4242)));
        }
    }

    #[test]
    fn checksum_agrees_with_pnet() {
        let frame = build_echo_request(17, 0x1234);
        let expected = checksum(&IcmpPacket::new(&frame).unwrap());
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), expected);
    }

    #[test]
    fn single_byte_mutation_breaks_validation() {
        let frame = build_echo_request(9, 77);
        for index in 0..frame.len() {
            let mut mutated = frame;
            mutated[index] ^= 0x5a;
            assert!(!verify_checksum(&mutated), "mutation at {} went unnoticed", index);
        }
    }

    #[test]
    fn checksum_folds_carries_and_pads_odd_bytes() {
        // 0xffff + 0x0001 carries out and folds back to 0x0001
        assert_eq!(internet_checksum(&[0xff, 0xff, 0x00, 0x01]), !0x0001);
        assert_eq!(internet_checksum(&[0x12]), !0x1200);
        assert_eq!(internet_checksum(&[]), 0xffff);
    }

    #[test]
    fn parse_plain_header() {
        let datagram = build_ipv4_datagram(&build_echo_reply(5, 99), SOURCE, LOCAL, 57, 0);
        let reply = parse_reply(&datagram).unwrap();
        assert_eq!(reply.header_length, 20);
        assert_eq!(reply.ttl, 57);
        assert_eq!(reply.source, SOURCE);
        assert_eq!(reply.icmp_type, IcmpTypes::EchoReply);
        assert_eq!(reply.icmp_code, IcmpCode::new(0));
        assert_eq!(reply.identifier, 99);
        assert_eq!(reply.sequence, 5);
        assert_eq!(reply.icmp_length, ECHO_FRAME_SIZE);
    }

    #[test]
    fn parse_honours_ip_options() {
        let datagram = build_ipv4_datagram(&build_echo_reply(11, 3), SOURCE, LOCAL, 64, 3);
        let reply = parse_reply(&datagram).unwrap();
        assert_eq!(reply.header_length, 32);
        assert_eq!(reply.identifier, 3);
        assert_eq!(reply.sequence, 11);
    }

    #[test]
    fn parse_rejects_buffer_shorter_than_declared_header() {
        let datagram = build_ipv4_datagram(&build_echo_reply(1, 1), SOURCE, LOCAL, 64, 4);
        // declared header is 36 bytes, keep only 30
        match parse_reply(&datagram[..30]) {
            Err(PingError::MalformedFrame(_)) => {}
            other => panic!("expected a malformed frame, got {:?}", other),
        }
    }

    #[test]
    fn parse_rejects_short_and_truncated_frames() {
        assert!(matches!(parse_reply(&[0x45; 12]), Err(PingError::MalformedFrame(_))));

        let datagram = build_ipv4_datagram(&build_echo_reply(1, 1), SOURCE, LOCAL, 64, 0);
        assert!(matches!(parse_reply(&datagram[..24]), Err(PingError::MalformedFrame(_))));

        let mut bad_length = datagram.clone();
        bad_length[0] = 0x43;
        assert!(matches!(parse_reply(&bad_length), Err(PingError::MalformedFrame(_))));
    }

    #[test]
    fn parse_rejects_corrupted_icmp() {
        let mut datagram = build_ipv4_datagram(&build_echo_reply(2, 8), SOURCE, LOCAL, 64, 0);
        let last = datagram.len() - 1;
        datagram[last] ^= 0xff;
        assert!(matches!(parse_reply(&datagram), Err(PingError::MalformedFrame(_))));
    }
}
