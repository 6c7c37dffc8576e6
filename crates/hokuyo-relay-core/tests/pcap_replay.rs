use std::fs;
use std::path::{Path, PathBuf};

use etherparse::PacketBuilder;
use hokuyo_relay_core::{
    PacketSource, PcapFileSource, ReplayOptions, SCANNER_LAYOUT, SourceError,
    analyze_capture_file, fragment, synthetic_scan,
};
use pcap_parser::Linktype;
use tempfile::TempDir;

fn udp_ipv4(dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ipv4([10, 0, 2, 1], [10, 0, 2, 10], 64).udp(10940, dst_port);
    let mut packet = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut packet, payload).unwrap();
    packet
}

fn udp_ethernet(dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
        .ipv4([10, 0, 2, 1], [10, 0, 2, 10], 64)
        .udp(10940, dst_port);
    let mut packet = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut packet, payload).unwrap();
    packet
}

/// Datagrams carrying the scan stamped `stamp`, split like the sensor does.
fn scan_datagrams(stamp: u32) -> Vec<Vec<u8>> {
    let frame = synthetic_scan(&SCANNER_LAYOUT, 0, stamp).unwrap();
    fragment(&frame, 1400)
        .into_iter()
        .map(<[u8]>::to_vec)
        .collect()
}

fn write_legacy_pcap(path: &Path, packets: &[(u32, u32, Vec<u8>)]) {
    let mut file = Vec::new();
    file.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    file.extend_from_slice(&2u16.to_le_bytes());
    file.extend_from_slice(&4u16.to_le_bytes());
    file.extend_from_slice(&0i32.to_le_bytes());
    file.extend_from_slice(&0u32.to_le_bytes());
    file.extend_from_slice(&65_535u32.to_le_bytes());
    file.extend_from_slice(&1u32.to_le_bytes());
    for (sec, usec, data) in packets {
        file.extend_from_slice(&sec.to_le_bytes());
        file.extend_from_slice(&usec.to_le_bytes());
        file.extend_from_slice(&(data.len() as u32).to_le_bytes());
        file.extend_from_slice(&(data.len() as u32).to_le_bytes());
        file.extend_from_slice(data);
    }
    fs::write(path, file).unwrap();
}

fn pcapng_block(block_type: u32, body: &[u8]) -> Vec<u8> {
    let padded = body.len().div_ceil(4) * 4;
    let total = (12 + padded) as u32;
    let mut block = Vec::with_capacity(total as usize);
    block.extend_from_slice(&block_type.to_le_bytes());
    block.extend_from_slice(&total.to_le_bytes());
    block.extend_from_slice(body);
    block.resize(8 + padded, 0);
    block.extend_from_slice(&total.to_le_bytes());
    block
}

/// Single-interface raw-IP pcapng with microsecond timestamps.
fn write_pcapng(path: &Path, packets: &[(u64, Vec<u8>)]) {
    let mut shb = Vec::new();
    shb.extend_from_slice(&0x1a2b_3c4du32.to_le_bytes());
    shb.extend_from_slice(&1u16.to_le_bytes());
    shb.extend_from_slice(&0u16.to_le_bytes());
    shb.extend_from_slice(&(-1i64).to_le_bytes());

    let mut idb = Vec::new();
    idb.extend_from_slice(&(Linktype::RAW.0 as u16).to_le_bytes());
    idb.extend_from_slice(&0u16.to_le_bytes());
    idb.extend_from_slice(&0u32.to_le_bytes());

    let mut file = pcapng_block(0x0a0d_0d0a, &shb);
    file.extend(pcapng_block(1, &idb));
    for (ts, data) in packets {
        let mut epb = Vec::new();
        epb.extend_from_slice(&0u32.to_le_bytes());
        epb.extend_from_slice(&((ts >> 32) as u32).to_le_bytes());
        epb.extend_from_slice(&(*ts as u32).to_le_bytes());
        epb.extend_from_slice(&(data.len() as u32).to_le_bytes());
        epb.extend_from_slice(&(data.len() as u32).to_le_bytes());
        epb.extend_from_slice(data);
        epb.resize(20 + data.len().div_ceil(4) * 4, 0);
        file.extend(pcapng_block(6, &epb));
    }
    fs::write(path, file).unwrap();
}

fn fixture(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

#[test]
fn legacy_capture_replays_two_channels() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "scanners.pcap");

    let mut packets = Vec::new();
    for (i, payload) in scan_datagrams(300).into_iter().enumerate() {
        packets.push((1, i as u32, udp_ethernet(5005, &payload)));
    }
    for (i, payload) in scan_datagrams(301).into_iter().enumerate() {
        packets.push((1, 100 + i as u32, udp_ethernet(5006, &payload)));
    }
    // A stray tail without its head.
    packets.push((2, 0, udp_ethernet(5005, b"00FF\x03")));
    write_legacy_pcap(&path, &packets);

    let report = analyze_capture_file(&path, &ReplayOptions::default()).unwrap();

    let summary = report.capture_summary.as_ref().unwrap();
    assert_eq!(summary.packets_total, 9);
    assert_eq!(summary.time_start.as_deref(), Some("1970-01-01T00:00:01Z"));
    assert_eq!(report.generated_at, "1970-01-01T00:00:02Z");

    let ports: Vec<_> = report.ports.iter().map(|port| port.port).collect();
    assert_eq!(ports, vec![5005, 5006]);
    let first = &report.ports[0];
    assert_eq!(first.datagrams, 5);
    assert_eq!(first.decoded_frames, 1);
    assert_eq!(first.orphan_fragments, 1);
    assert_eq!(first.first_scan_timestamp, Some(300));
    assert_eq!(report.ports[1].last_scan_timestamp, Some(301));
}

#[test]
fn interrupted_frame_counts_as_torn() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "torn.pcap");

    let scan = scan_datagrams(7);
    let mut packets = vec![(0, 0, udp_ethernet(5005, &scan[0]))];
    for (i, payload) in scan.iter().enumerate() {
        packets.push((0, 10 + i as u32, udp_ethernet(5005, payload)));
    }
    write_legacy_pcap(&path, &packets);

    let report = analyze_capture_file(&path, &ReplayOptions::default()).unwrap();
    let port = &report.ports[0];
    assert_eq!(port.torn_frames, 1);
    assert_eq!(port.decoded_frames, 1);
    assert_eq!(port.malformed_frames, 0);
}

#[test]
fn pcapng_raw_ip_capture_replays() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "scanner.pcapng");

    let packets: Vec<_> = scan_datagrams(0xdead)
        .into_iter()
        .enumerate()
        .map(|(i, payload)| (1_500_000 + i as u64, udp_ipv4(5005, &payload)))
        .collect();
    write_pcapng(&path, &packets);

    let mut source = PcapFileSource::open(&path).unwrap();
    let first = source.next_packet().unwrap().unwrap();
    assert_eq!(first.linktype, Linktype::RAW);
    assert_eq!(first.ts_micros, Some(1_500_000));

    let report = analyze_capture_file(&path, &ReplayOptions::default()).unwrap();
    assert_eq!(report.ports[0].decoded_frames, 1);
    assert_eq!(report.ports[0].first_scan_timestamp, Some(0xdead));
}

#[test]
fn truncated_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "truncated.pcapng");
    fs::write(&path, [0x0a, 0x0d, 0x0d]).unwrap();

    let err = match PcapFileSource::open(&path) {
        Ok(_) => panic!("expected truncated file to be rejected"),
        Err(err) => err,
    };
    assert!(matches!(err, SourceError::Io(_)));
}
