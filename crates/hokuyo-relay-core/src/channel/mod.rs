//! Per-scanner relay channel.
//!
//! A channel owns the real-feed socket, the simulated-feed socket and an
//! output socket. Its loop waits on both inputs with a bounded timeout,
//! drains whichever became readable, forwards decoded frames to the relay
//! target and evaluates the failover timer once per iteration. Channels
//! share nothing; run one per scanner on its own thread.
//!
//! ```text
//! real socket ──► FrameAssembler ──┐ (only while Real is active)
//!                                  ├──► decode_frame ──► output socket
//! sim socket  ──► FrameAssembler ──┘ (always)
//!                   │
//!                   └──► FailoverArbiter::sim_packet_arrived
//! ```

mod error;
mod pipeline;

pub use error::ChannelError;
pub use pipeline::{ChannelStats, RelayPipeline};

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use mio::{Events, Interest, Poll, Token};

use crate::ChannelSummary;
use crate::failover::{Clock, DEFAULT_SILENCE_TIMEOUT, MonotonicClock};
use crate::protocols::scanner::{FieldLayout, SCANNER_LAYOUT};
use crate::shutdown::ShutdownToken;

const REAL_TOKEN: Token = Token(0);
const SIM_TOKEN: Token = Token(1);

/// Resolved settings for one channel.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub name: String,
    pub real_bind: SocketAddr,
    pub sim_bind: SocketAddr,
    /// Destination of decoded messages.
    pub target: SocketAddr,
    pub poll_timeout: Duration,
    pub silence_timeout: Duration,
    pub max_frame_len: usize,
    pub recv_buffer_len: usize,
    pub layout: FieldLayout,
}

impl ChannelSettings {
    /// Settings with the reference timings for the given addresses.
    pub fn new(
        name: impl Into<String>,
        real_bind: SocketAddr,
        sim_bind: SocketAddr,
        target: SocketAddr,
    ) -> Self {
        Self {
            name: name.into(),
            real_bind,
            sim_bind,
            target,
            poll_timeout: Duration::from_secs(1),
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            max_frame_len: 64 * 1024,
            recv_buffer_len: 8192,
            layout: SCANNER_LAYOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Real,
    Simulated,
}

/// Bound channel, ready to run.
pub struct Channel<C: Clock = MonotonicClock> {
    pipeline: RelayPipeline,
    poll: Poll,
    events: Events,
    real_socket: mio::net::UdpSocket,
    sim_socket: mio::net::UdpSocket,
    output: UdpSocket,
    real_addr: SocketAddr,
    sim_addr: SocketAddr,
    target: SocketAddr,
    poll_timeout: Duration,
    recv_buffer: Vec<u8>,
    clock: C,
}

impl Channel<MonotonicClock> {
    /// Bind every socket of the channel.
    ///
    /// # Errors
    /// Returns `ChannelError::Bind` when an input or the output socket cannot
    /// be bound, which is fatal for this channel.
    pub fn bind(settings: &ChannelSettings) -> Result<Self, ChannelError> {
        Self::bind_with_clock(settings, MonotonicClock)
    }
}

impl<C: Clock> Channel<C> {
    pub fn bind_with_clock(settings: &ChannelSettings, clock: C) -> Result<Self, ChannelError> {
        let bind_error = |role: &'static str, addr: SocketAddr| {
            let channel = settings.name.clone();
            move |source: io::Error| ChannelError::Bind {
                channel,
                role,
                addr,
                source,
            }
        };
        let poll_error = |source: io::Error| ChannelError::Poll {
            channel: settings.name.clone(),
            source,
        };

        let mut real_socket = mio::net::UdpSocket::bind(settings.real_bind)
            .map_err(bind_error("real", settings.real_bind))?;
        let mut sim_socket = mio::net::UdpSocket::bind(settings.sim_bind)
            .map_err(bind_error("sim", settings.sim_bind))?;
        let output_bind = unspecified_for(settings.target);
        let output = UdpSocket::bind(output_bind).map_err(bind_error("output", output_bind))?;

        let real_addr = real_socket.local_addr().map_err(poll_error)?;
        let sim_addr = sim_socket.local_addr().map_err(poll_error)?;

        let poll = Poll::new().map_err(poll_error)?;
        poll.registry()
            .register(&mut real_socket, REAL_TOKEN, Interest::READABLE)
            .map_err(poll_error)?;
        poll.registry()
            .register(&mut sim_socket, SIM_TOKEN, Interest::READABLE)
            .map_err(poll_error)?;

        Ok(Self {
            pipeline: RelayPipeline::new(
                settings.name.clone(),
                settings.layout,
                settings.max_frame_len,
                settings.silence_timeout,
            ),
            poll,
            events: Events::with_capacity(16),
            real_socket,
            sim_socket,
            output,
            real_addr,
            sim_addr,
            target: settings.target,
            poll_timeout: settings.poll_timeout,
            recv_buffer: vec![0u8; settings.recv_buffer_len.max(1)],
            clock,
        })
    }

    pub fn name(&self) -> &str {
        self.pipeline.name()
    }

    /// Local address of the real-feed socket.
    pub fn real_addr(&self) -> SocketAddr {
        self.real_addr
    }

    /// Local address of the simulated-feed socket.
    pub fn sim_addr(&self) -> SocketAddr {
        self.sim_addr
    }

    /// Run until `shutdown` is cancelled, then close the sockets.
    pub fn run(mut self, shutdown: &ShutdownToken) -> ChannelSummary {
        log::info!(
            "[{}] relaying real {} / sim {} -> {}",
            self.name(),
            self.real_addr,
            self.sim_addr,
            self.target
        );

        while !shutdown.is_cancelled() {
            if let Err(err) = self.poll.poll(&mut self.events, Some(self.poll_timeout)) {
                if err.kind() != io::ErrorKind::Interrupted {
                    log::warn!("[{}] poll error: {}", self.pipeline.name(), err);
                }
            }

            let mut real_ready = false;
            let mut sim_ready = false;
            for event in self.events.iter() {
                match event.token() {
                    REAL_TOKEN => real_ready = true,
                    SIM_TOKEN => sim_ready = true,
                    _ => {}
                }
            }

            let now = self.clock.now();
            if real_ready {
                self.drain(Input::Real, now);
            }
            if sim_ready {
                self.drain(Input::Simulated, now);
            }
            self.pipeline.tick(self.clock.now());
        }

        log::info!("[{}] stopped", self.name());
        ChannelSummary {
            name: self.pipeline.name().to_string(),
            real_bind: self.real_addr.to_string(),
            sim_bind: self.sim_addr.to_string(),
            target: self.target.to_string(),
            final_source: self.pipeline.active(),
            stats: self.pipeline.stats(),
        }
    }

    /// Read until the socket would block; mio readiness is edge-triggered.
    fn drain(&mut self, input: Input, now: Instant) {
        loop {
            let socket = match input {
                Input::Real => &self.real_socket,
                Input::Simulated => &self.sim_socket,
            };
            let len = match socket.recv_from(&mut self.recv_buffer) {
                Ok((len, _peer)) => len,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::warn!("[{}] recv error: {}", self.pipeline.name(), err);
                    self.pipeline.record_recv_error();
                    return;
                }
            };

            let datagram = &self.recv_buffer[..len];
            let message = match input {
                Input::Real => self.pipeline.on_real_datagram(datagram),
                Input::Simulated => self.pipeline.on_sim_datagram(now, datagram),
            };
            if let Some(message) = message {
                self.forward(&message);
            }
        }
    }

    fn forward(&mut self, message: &[u8]) {
        match self.output.send_to(message, self.target) {
            Ok(_) => self.pipeline.record_send(true),
            Err(err) => {
                log::warn!(
                    "[{}] send to {} failed: {}",
                    self.pipeline.name(),
                    self.target,
                    err
                );
                self.pipeline.record_send(false);
            }
        }
    }
}

fn unspecified_for(target: SocketAddr) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}
