use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::assembly::{Assembly, FrameAssembler};
use crate::failover::{ActiveSource, FailoverArbiter, Transition};
use crate::protocols::scanner::{FieldLayout, decode_frame};

/// Counters kept per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub real_datagrams: u64,
    pub sim_datagrams: u64,
    /// Real datagrams read while the simulator owned the channel.
    pub real_discarded: u64,
    pub frames_decoded: u64,
    pub frames_sent: u64,
    pub frames_malformed: u64,
    pub torn_frames: u64,
    pub orphan_fragments: u64,
    pub overflow_resets: u64,
    pub switches_to_sim: u64,
    pub switches_to_real: u64,
    pub recv_errors: u64,
    pub send_errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feed {
    Real,
    Simulated,
}

impl Feed {
    fn label(self) -> &'static str {
        match self {
            Feed::Real => "real",
            Feed::Simulated => "sim",
        }
    }
}

/// Socket-free part of a channel: reassembly, failover gating and decoding.
///
/// Each handler returns the decoded message to forward, if any.
#[derive(Debug)]
pub struct RelayPipeline {
    name: String,
    layout: FieldLayout,
    real: FrameAssembler,
    sim: FrameAssembler,
    arbiter: FailoverArbiter,
    stats: ChannelStats,
}

impl RelayPipeline {
    pub fn new(
        name: impl Into<String>,
        layout: FieldLayout,
        max_frame_len: usize,
        silence_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            layout,
            real: FrameAssembler::new(max_frame_len),
            sim: FrameAssembler::new(max_frame_len),
            arbiter: FailoverArbiter::new(silence_timeout),
            stats: ChannelStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn active(&self) -> ActiveSource {
        self.arbiter.active()
    }

    pub fn on_real_datagram(&mut self, datagram: &[u8]) -> Option<Vec<u8>> {
        self.stats.real_datagrams += 1;
        if self.arbiter.active() == ActiveSource::Simulated {
            self.stats.real_discarded += 1;
            return None;
        }
        self.assemble(Feed::Real, datagram)
    }

    /// Simulated frames are forwarded whichever feed owns the channel.
    pub fn on_sim_datagram(&mut self, now: Instant, datagram: &[u8]) -> Option<Vec<u8>> {
        self.stats.sim_datagrams += 1;
        if let Some(transition) = self.arbiter.sim_packet_arrived(now) {
            self.record(transition);
        }
        self.assemble(Feed::Simulated, datagram)
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(transition) = self.arbiter.tick(now) {
            self.record(transition);
        }
    }

    pub fn record_send(&mut self, sent: bool) {
        if sent {
            self.stats.frames_sent += 1;
        } else {
            self.stats.send_errors += 1;
        }
    }

    pub fn record_recv_error(&mut self) {
        self.stats.recv_errors += 1;
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            torn_frames: self.real.torn_frames() + self.sim.torn_frames(),
            ..self.stats
        }
    }

    fn record(&mut self, transition: Transition) {
        match transition {
            Transition::ToSimulated => {
                self.stats.switches_to_sim += 1;
                log::info!("[{}] switching to simulated source", self.name);
            }
            Transition::ToReal => {
                self.stats.switches_to_real += 1;
                log::info!("[{}] switching back to real source", self.name);
            }
        }
    }

    fn assemble(&mut self, feed: Feed, datagram: &[u8]) -> Option<Vec<u8>> {
        let assembler = match feed {
            Feed::Real => &mut self.real,
            Feed::Simulated => &mut self.sim,
        };
        let frame = match assembler.push(datagram) {
            Assembly::Pending => return None,
            Assembly::Frame(frame) => frame,
            Assembly::Orphan { len } => {
                self.stats.orphan_fragments += 1;
                log::debug!(
                    "[{}] {} fragment of {} bytes has no start marker",
                    self.name,
                    feed.label(),
                    len
                );
                return None;
            }
            Assembly::Overflow { len } => {
                self.stats.overflow_resets += 1;
                log::warn!(
                    "[{}] {} buffer reached {} bytes without a frame; reset",
                    self.name,
                    feed.label(),
                    len
                );
                return None;
            }
        };

        match decode_frame(&frame, &self.layout) {
            Ok(message) => {
                self.stats.frames_decoded += 1;
                Some(message)
            }
            Err(err) => {
                self.stats.frames_malformed += 1;
                log::warn!("[{}] dropping {} frame: {}", self.name, feed.label(), err);
                None
            }
        }
    }
}
