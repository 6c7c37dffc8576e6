use std::net::{IpAddr, SocketAddr};

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap_parser::Linktype;
use thiserror::Error;

const UDP_HEADER_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum UdpError {
    #[error("packet slice error: {0}")]
    Slice(String),
    #[error("missing network layer in packet")]
    MissingNetworkLayer,
    #[error("missing IP payload in packet")]
    MissingIpPayload,
    #[error("UDP datagram too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
}

/// UDP datagram lifted out of a link-layer frame.
#[derive(Debug)]
pub struct UdpDatagram<'a> {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub payload: &'a [u8],
}

/// Extract the UDP datagram carried by `data`.
///
/// Returns `Ok(None)` for link types other than Ethernet and raw IP, and for
/// non-UDP transports.
pub fn extract_udp(linktype: Linktype, data: &[u8]) -> Result<Option<UdpDatagram<'_>>, UdpError> {
    let sliced = match linktype {
        Linktype::ETHERNET => {
            SlicedPacket::from_ethernet(data).map_err(|err| UdpError::Slice(err.to_string()))?
        }
        Linktype::RAW => {
            SlicedPacket::from_ip(data).map_err(|err| UdpError::Slice(err.to_string()))?
        }
        _ => return Ok(None),
    };

    let net = sliced.net.ok_or(UdpError::MissingNetworkLayer)?;
    let udp = match sliced.transport {
        Some(TransportSlice::Udp(udp)) => udp,
        _ => return Ok(None),
    };

    let (src_ip, dst_ip) = match net {
        NetSlice::Ipv4(ref ipv4) => (
            IpAddr::V4(ipv4.header().source_addr()),
            IpAddr::V4(ipv4.header().destination_addr()),
        ),
        NetSlice::Ipv6(ref ipv6) => (
            IpAddr::V6(ipv6.header().source_addr()),
            IpAddr::V6(ipv6.header().destination_addr()),
        ),
    };

    let ip_payload = net.ip_payload_ref().ok_or(UdpError::MissingIpPayload)?;
    let payload = ip_payload
        .payload
        .get(UDP_HEADER_LEN..)
        .ok_or(UdpError::TooShort {
            needed: UDP_HEADER_LEN,
            actual: ip_payload.payload.len(),
        })?;

    Ok(Some(UdpDatagram {
        src: SocketAddr::new(src_ip, udp.source_port()),
        dst: SocketAddr::new(dst_ip, udp.destination_port()),
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use etherparse::PacketBuilder;
    use pcap_parser::Linktype;

    use super::extract_udp;

    #[test]
    fn extracts_udp_payload_and_endpoints() {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([10, 0, 2, 1], [10, 0, 2, 10], 64)
            .udp(10940, 5005);
        let payload = b"\x02AB\x03";
        let mut packet = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut packet, payload).unwrap();

        let datagram = extract_udp(Linktype::ETHERNET, &packet).unwrap().unwrap();
        assert_eq!(datagram.src.to_string(), "10.0.2.1:10940");
        assert_eq!(datagram.dst.port(), 5005);
        assert_eq!(datagram.payload, payload);
    }

    #[test]
    fn tcp_is_skipped() {
        let builder = PacketBuilder::ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64).tcp(1, 2, 0, 1024);
        let mut packet = Vec::with_capacity(builder.size(0));
        builder.write(&mut packet, &[]).unwrap();

        assert!(extract_udp(Linktype::RAW, &packet).unwrap().is_none());
    }

    #[test]
    fn unsupported_linktype_is_skipped() {
        assert!(extract_udp(Linktype::NULL, &[0u8; 4]).unwrap().is_none());
    }

    #[test]
    fn garbage_ethernet_is_a_slice_error() {
        assert!(extract_udp(Linktype::ETHERNET, &[0u8; 3]).is_err());
    }
}
