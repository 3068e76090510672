// Statistics collector module

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

use crate::error::SimError;

#[derive(Default)]
struct ClientCounters {
    registers: AtomicU64,
    invites: AtomicU64,
    errors: AtomicU64,
}

/// Thread-safe traffic counters shared by every client and media task.
pub struct StatsCollector {
    clients_started: AtomicU64,
    registers_sent: AtomicU64,
    invites_sent: AtomicU64,
    rtp_packets_sent: AtomicU64,
    calls_completed: AtomicU64,
    send_errors: AtomicU64,
    active_calls: AtomicU64,
    per_client: DashMap<String, ClientCounters>,
    start_time: Instant,
}

/// Per-client counters in a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientStats {
    pub registers: u64,
    pub invites: u64,
    pub errors: u64,
}

/// A point-in-time snapshot of collected statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub elapsed_secs: f64,
    pub clients_started: u64,
    pub registers_sent: u64,
    pub invites_sent: u64,
    pub rtp_packets_sent: u64,
    pub calls_completed: u64,
    pub send_errors: u64,
    pub active_calls: u64,
    /// SIP requests per second since start.
    pub sip_rate: f64,
    pub per_client: BTreeMap<String, ClientStats>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            clients_started: AtomicU64::new(0),
            registers_sent: AtomicU64::new(0),
            invites_sent: AtomicU64::new(0),
            rtp_packets_sent: AtomicU64::new(0),
            calls_completed: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            active_calls: AtomicU64::new(0),
            per_client: DashMap::new(),
            start_time: Instant::now(),
        }
    }

    fn with_client<F: FnOnce(&ClientCounters)>(&self, client: &str, f: F) {
        if let Some(counters) = self.per_client.get(client) {
            f(&counters);
            return;
        }
        let entry = self.per_client.entry(client.to_string()).or_default();
        f(&entry);
    }

    pub fn record_client_started(&self, client: &str) {
        self.clients_started.fetch_add(1, Ordering::Relaxed);
        self.with_client(client, |_| {});
    }

    pub fn record_register(&self, client: &str) {
        self.registers_sent.fetch_add(1, Ordering::Relaxed);
        self.with_client(client, |c| {
            c.registers.fetch_add(1, Ordering::Relaxed);
        });
    }

    pub fn record_invite(&self, client: &str) {
        self.invites_sent.fetch_add(1, Ordering::Relaxed);
        self.with_client(client, |c| {
            c.invites.fetch_add(1, Ordering::Relaxed);
        });
    }

    /// Record a failed traffic cycle for `client`.
    pub fn record_error(&self, client: &str) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
        self.with_client(client, |c| {
            c.errors.fetch_add(1, Ordering::Relaxed);
        });
    }

    pub fn record_rtp_packet(&self) {
        self.rtp_packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_started(&self) {
        self.active_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_finished(&self) {
        // Saturate at zero in case of unbalanced calls.
        let _ = self
            .active_calls
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        self.calls_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();
        let registers_sent = self.registers_sent.load(Ordering::Relaxed);
        let invites_sent = self.invites_sent.load(Ordering::Relaxed);
        let sip_rate = if elapsed_secs > 0.0 {
            (registers_sent + invites_sent) as f64 / elapsed_secs
        } else {
            0.0
        };

        let per_client = self
            .per_client
            .iter()
            .map(|entry| {
                let c = entry.value();
                (
                    entry.key().clone(),
                    ClientStats {
                        registers: c.registers.load(Ordering::Relaxed),
                        invites: c.invites.load(Ordering::Relaxed),
                        errors: c.errors.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();

        StatsSnapshot {
            elapsed_secs,
            clients_started: self.clients_started.load(Ordering::Relaxed),
            registers_sent,
            invites_sent,
            rtp_packets_sent: self.rtp_packets_sent.load(Ordering::Relaxed),
            calls_completed: self.calls_completed.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            active_calls: self.active_calls.load(Ordering::Relaxed),
            sip_rate,
            per_client,
        }
    }
}

impl StatsSnapshot {
    /// Emit the aggregate counters as one structured log line.
    pub fn log(&self) {
        info!(
            elapsed_secs = format_args!("{:.1}", self.elapsed_secs),
            clients = self.clients_started,
            registers = self.registers_sent,
            invites = self.invites_sent,
            rtp_packets = self.rtp_packets_sent,
            active_calls = self.active_calls,
            calls_completed = self.calls_completed,
            errors = self.send_errors,
            sip_rate = format_args!("{:.2}", self.sip_rate),
            "traffic stats"
        );
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SimError::OutputError(format!("failed to serialize stats: {}", e)))
    }

    /// Write the snapshot as pretty JSON to `path`.
    pub fn write_json(&self, path: &Path) -> Result<(), SimError> {
        std::fs::write(path, self.to_json()?).map_err(|e| {
            SimError::OutputError(format!("failed to write '{}': {}", path.display(), e))
        })
    }
}
