// RTP stream emulator
//
// Emits fixed-size filler packets at a fixed cadence until cancelled.
// The payload is not encoded audio.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SimError;
use crate::stats::StatsCollector;
use crate::transport::Transport;

/// First two bytes of every packet: V=2, no padding/extension/CSRC, PT 96.
pub const RTP_MARKER: [u8; 2] = [0x80, 0x60];
pub const DEFAULT_PACKET_SIZE: usize = 160;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(20);

/// Build one packet of `size` bytes: the marker followed by random filler.
/// Sizes below the marker length are raised to it.
pub fn build_rtp_packet(size: usize) -> Vec<u8> {
    let size = size.max(RTP_MARKER.len());
    let mut packet = vec![0u8; size];
    packet[..RTP_MARKER.len()].copy_from_slice(&RTP_MARKER);
    rand::thread_rng().fill_bytes(&mut packet[RTP_MARKER.len()..]);
    packet
}

/// One media stream for an active call.
pub struct RtpStream {
    transport: Arc<dyn Transport>,
    remote: SocketAddr,
    interval: Duration,
    packet_size: usize,
    stats: Option<Arc<StatsCollector>>,
}

impl RtpStream {
    pub fn new(transport: Arc<dyn Transport>, remote: SocketAddr) -> Self {
        Self {
            transport,
            remote,
            interval: DEFAULT_INTERVAL,
            packet_size: DEFAULT_PACKET_SIZE,
            stats: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Stream until `token` is cancelled and return the number of packets sent.
    ///
    /// The first packet goes out immediately, then one per interval. A send
    /// failure ends the stream with that error.
    pub async fn run(self, token: CancellationToken) -> Result<u64, SimError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sent = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let packet = build_rtp_packet(self.packet_size);
                    self.transport.send_to(&packet, self.remote).await?;
                    sent += 1;
                    if let Some(stats) = &self.stats {
                        stats.record_rtp_packet();
                    }
                }
            }
        }

        debug!(remote = %self.remote, packets = sent, "RTP stream stopped");
        Ok(sent)
    }
}
