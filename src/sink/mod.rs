// Local UDP sink
//
// Receives simulator traffic, parses SIP requests and keeps per-method
// counts. Useful as a stand-in server when no backend is available.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::SimError;
use crate::rtp::RTP_MARKER;
use crate::sip::message::SipRequest;
use crate::sip::parser::parse_request;
use crate::transport::UdpTransport;

const MAX_DATAGRAM: usize = 65_535;

/// What a received datagram turned out to be.
#[derive(Debug)]
pub enum Datagram {
    Request(Box<SipRequest>),
    Rtp,
    Invalid(SimError),
}

pub fn classify(data: &[u8]) -> Datagram {
    if data.starts_with(&RTP_MARKER) {
        return Datagram::Rtp;
    }
    match parse_request(data) {
        Ok(req) => Datagram::Request(Box::new(req)),
        Err(e) => Datagram::Invalid(e),
    }
}

#[derive(Default)]
pub struct SinkStats {
    requests: DashMap<String, AtomicU64>,
    rtp_packets: AtomicU64,
    invalid: AtomicU64,
    bytes: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SinkSummary {
    pub requests: BTreeMap<String, u64>,
    pub rtp_packets: u64,
    pub invalid: u64,
    pub bytes: u64,
}

impl SinkStats {
    pub fn record(&self, datagram: &Datagram, len: usize) {
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
        match datagram {
            Datagram::Request(req) => {
                self.requests
                    .entry(req.method.to_string())
                    .or_insert_with(|| AtomicU64::new(0))
                    .fetch_add(1, Ordering::Relaxed);
            }
            Datagram::Rtp => {
                self.rtp_packets.fetch_add(1, Ordering::Relaxed);
            }
            Datagram::Invalid(_) => {
                self.invalid.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn summary(&self) -> SinkSummary {
        SinkSummary {
            requests: self
                .requests
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect(),
            rtp_packets: self.rtp_packets.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

pub struct Sink {
    transport: UdpTransport,
    stats: Arc<SinkStats>,
}

impl Sink {
    pub async fn bind(addr: SocketAddr) -> Result<Self, SimError> {
        Ok(Self {
            transport: UdpTransport::bind(addr.ip(), addr.port()).await?,
            stats: Arc::new(SinkStats::default()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SimError> {
        self.transport.local_addr()
    }

    pub fn stats(&self) -> Arc<SinkStats> {
        self.stats.clone()
    }

    /// Receive until `token` is cancelled, then return the totals.
    pub async fn run(&self, token: CancellationToken) -> Result<SinkSummary, SimError> {
        info!(addr = %self.local_addr()?, "sink listening");
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                received = self.transport.recv_from(&mut buf) => received?,
            };
            let datagram = classify(&buf[..len]);
            match &datagram {
                Datagram::Request(req) => info!(
                    from = %from,
                    method = %req.method,
                    call_id = req.headers.get("Call-ID").unwrap_or("-"),
                    cseq = req.headers.get("CSeq").unwrap_or("-"),
                    bytes = len,
                    "request received"
                ),
                Datagram::Rtp => {}
                Datagram::Invalid(e) => debug!(from = %from, error = %e, bytes = len, "unparseable datagram"),
            }
            self.stats.record(&datagram, len);
        }
        let summary = self.stats.summary();
        info!(
            requests = ?summary.requests,
            rtp_packets = summary.rtp_packets,
            invalid = summary.invalid,
            "sink stopped"
        );
        Ok(summary)
    }
}
