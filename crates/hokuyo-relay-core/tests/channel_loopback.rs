use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::Duration;

use hokuyo_relay_core::{
    ActiveSource, Channel, ChannelSettings, SCANNER_LAYOUT, ShutdownToken, fragment,
    synthetic_scan,
};

const TIME_STAMP: &str = "Time Stamp";

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn receiver() -> UdpSocket {
    let socket = UdpSocket::bind(loopback()).unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    socket
}

fn settings(target: SocketAddr, silence: Duration) -> ChannelSettings {
    let mut settings = ChannelSettings::new("loopback", loopback(), loopback(), target);
    settings.poll_timeout = Duration::from_millis(20);
    settings.silence_timeout = silence;
    settings
}

fn send_scan(sender: &UdpSocket, to: SocketAddr, stamp: u32) {
    let frame = synthetic_scan(&SCANNER_LAYOUT, u64::from(stamp), stamp).unwrap();
    for chunk in fragment(&frame, 1400) {
        sender.send_to(chunk, to).unwrap();
    }
}

fn recv_stamp(socket: &UdpSocket) -> u32 {
    let mut buf = vec![0u8; 4096];
    let (len, _) = socket.recv_from(&mut buf).unwrap();
    assert_eq!(len, SCANNER_LAYOUT.decoded_len());

    let offset: usize = SCANNER_LAYOUT
        .fields()
        .iter()
        .take_while(|field| field.name != TIME_STAMP)
        .map(|field| field.decoded_len())
        .sum();
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

#[test]
fn simulator_takes_over_and_real_is_muted() {
    let output = receiver();
    let channel = Channel::bind(&settings(
        output.local_addr().unwrap(),
        Duration::from_secs(60),
    ))
    .unwrap();
    let (real, sim) = (channel.real_addr(), channel.sim_addr());
    let shutdown = ShutdownToken::new();
    let token = shutdown.clone();
    let worker = thread::spawn(move || channel.run(&token));

    let sender = UdpSocket::bind(loopback()).unwrap();
    send_scan(&sender, real, 1);
    assert_eq!(recv_stamp(&output), 1);

    send_scan(&sender, sim, 2);
    assert_eq!(recv_stamp(&output), 2);

    // Real traffic during simulation is read and dropped.
    send_scan(&sender, real, 3);
    send_scan(&sender, sim, 4);
    assert_eq!(recv_stamp(&output), 4);

    shutdown.cancel();
    let summary = worker.join().unwrap();
    assert_eq!(summary.final_source, ActiveSource::Simulated);
    assert_eq!(summary.stats.switches_to_sim, 1);
    assert_eq!(summary.stats.frames_sent, 3);
    assert_eq!(summary.stats.real_discarded, 4);
}

#[test]
fn real_source_resumes_after_sim_silence() {
    let output = receiver();
    let channel = Channel::bind(&settings(
        output.local_addr().unwrap(),
        Duration::from_millis(200),
    ))
    .unwrap();
    let (real, sim) = (channel.real_addr(), channel.sim_addr());
    let shutdown = ShutdownToken::new();
    let token = shutdown.clone();
    let worker = thread::spawn(move || channel.run(&token));

    let sender = UdpSocket::bind(loopback()).unwrap();
    send_scan(&sender, sim, 10);
    assert_eq!(recv_stamp(&output), 10);

    thread::sleep(Duration::from_millis(600));
    send_scan(&sender, real, 11);
    assert_eq!(recv_stamp(&output), 11);

    shutdown.cancel();
    let summary = worker.join().unwrap();
    assert_eq!(summary.final_source, ActiveSource::Real);
    assert_eq!(summary.stats.switches_to_sim, 1);
    assert_eq!(summary.stats.switches_to_real, 1);
}

#[test]
fn bind_conflict_is_reported() {
    let taken = UdpSocket::bind(loopback()).unwrap();
    let addr = taken.local_addr().unwrap();
    let mut settings = settings(addr, Duration::from_secs(10));
    settings.real_bind = addr;

    let err = match Channel::bind(&settings) {
        Ok(_) => panic!("expected bind failure"),
        Err(err) => err,
    };
    assert!(err.to_string().contains("real"));
}
