// Traffic orchestrator module
//
// Spawns one supervised loop per simulated client, staggers their starts,
// and runs a periodic stats reporter. Each call spawns a supervised RTP
// task on a per-call child token that is cancelled when the call ends.

mod planner;
mod supervisor;

pub use planner::{CallPlan, Cycle, PlannerSettings, TrafficPlanner, CALLEE_RANGE};
pub use supervisor::{sleep_or_cancel, TaskSupervisor};

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::SimError;
use crate::ident::{RandomTokens, TokenSource};
use crate::rtp::RtpStream;
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::uac::{ClientSession, SessionConfig};

/// Timing knobs of the per-client loop that are not randomized.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub error_backoff: Duration,
    pub rtp_interval: Duration,
    pub rtp_packet_size: usize,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            error_backoff: config.error_backoff(),
            rtp_interval: config.rtp_interval(),
            rtp_packet_size: config.rtp_packet_size,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Outcome of one successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle finished and the loop should pause for this long.
    Completed(Duration),
    /// Shutdown was requested while a call was active.
    Cancelled,
}

/// Everything a client loop needs besides its session.
#[derive(Clone)]
pub struct LoopContext {
    pub settings: LoopSettings,
    pub stats: Arc<StatsCollector>,
    pub supervisor: TaskSupervisor,
}

/// REGISTER, maybe place a call and hold it, then report the pause.
pub async fn run_cycle(
    session: &mut ClientSession,
    planner: &mut TrafficPlanner,
    ctx: &LoopContext,
    token: &CancellationToken,
) -> Result<CycleOutcome, SimError> {
    let cycle = planner.next_cycle();

    let cseq = session.register().await?;
    ctx.stats.record_register(session.client_id());
    debug!(client = session.client_id(), cseq, "registered");

    let call = match cycle.call {
        Some(call) => call,
        None => return Ok(CycleOutcome::Completed(cycle.pause)),
    };

    let attempt = session.place_call(&call.callee).await?;
    ctx.stats.record_invite(session.client_id());
    let remote = session.rtp_destination()?;
    info!(
        client = session.client_id(),
        callee = %attempt.callee,
        call_id = %attempt.call_id,
        duration_ms = call.duration.as_millis() as u64,
        rtp = %remote,
        "call placed"
    );

    let call_token = token.child_token();
    let stream = RtpStream::new(session.media_transport(), remote)
        .with_interval(ctx.settings.rtp_interval)
        .with_packet_size(ctx.settings.rtp_packet_size)
        .with_stats(ctx.stats.clone());
    ctx.stats.call_started();
    let media = ctx.supervisor.spawn(stream.run(call_token.clone()));

    let held = sleep_or_cancel(call.duration, token).await;
    call_token.cancel();
    let joined = media.await;
    ctx.stats.call_finished();

    match joined {
        Ok(Ok(packets)) => {
            debug!(client = session.client_id(), call_id = %attempt.call_id, packets, "call ended")
        }
        Ok(Err(e)) => return Err(e),
        Err(e) => error!(client = session.client_id(), error = %e, "RTP task panicked"),
    }

    if held {
        Ok(CycleOutcome::Completed(cycle.pause))
    } else {
        Ok(CycleOutcome::Cancelled)
    }
}

/// Run cycles until `token` is cancelled. Errors are logged and followed by
/// the configured backoff; they never end the loop.
pub async fn run_client_loop(
    mut session: ClientSession,
    mut planner: TrafficPlanner,
    ctx: LoopContext,
    token: CancellationToken,
) {
    ctx.stats.record_client_started(session.client_id());
    info!(
        client = session.client_id(),
        local = %session.local_addr(),
        rtp_port = session.rtp_port(),
        "client started"
    );

    while !token.is_cancelled() {
        let pause = match run_cycle(&mut session, &mut planner, &ctx, &token).await {
            Ok(CycleOutcome::Completed(pause)) => pause,
            Ok(CycleOutcome::Cancelled) => break,
            Err(e) => {
                warn!(
                    client = session.client_id(),
                    error = %e,
                    backoff_ms = ctx.settings.error_backoff.as_millis() as u64,
                    "traffic cycle failed"
                );
                ctx.stats.record_error(session.client_id());
                ctx.settings.error_backoff
            }
        };
        if !sleep_or_cancel(pause, &token).await {
            break;
        }
    }

    info!(client = session.client_id(), "client stopped");
}

/// Owns the configuration, the supervisor and the shared stats of one run.
pub struct Orchestrator {
    config: Config,
    stats: Arc<StatsCollector>,
    supervisor: TaskSupervisor,
    tokens: Arc<dyn TokenSource>,
}

impl Orchestrator {
    /// Validate `config` and check the randomness source.
    pub fn new(config: Config) -> Result<Self, SimError> {
        config.ensure_valid()?;
        Ok(Self {
            config,
            stats: Arc::new(StatsCollector::new()),
            supervisor: TaskSupervisor::new(),
            tokens: Arc::new(RandomTokens::new()?),
        })
    }

    /// Replace the identifier source (deterministic tokens in tests).
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    pub fn token_source(&self) -> Arc<dyn TokenSource> {
        self.tokens.clone()
    }

    /// Bind one session per configured client, then launch them.
    /// Any bind failure aborts before a single client starts.
    pub async fn start(&self) -> Result<usize, SimError> {
        let settings = SessionConfig::from_config(&self.config)?;
        let local_ip = self.config.local_ip()?;

        let mut sessions = Vec::with_capacity(self.config.clients);
        for client_id in self.config.client_ids() {
            let session =
                ClientSession::bind(client_id, settings.clone(), local_ip, self.tokens.clone())
                    .await?;
            sessions.push(session);
        }

        info!(
            clients = sessions.len(),
            server = %settings.server_addr,
            domain = %settings.domain,
            profile = ?settings.profile,
            "starting traffic"
        );
        self.launch(sessions)
    }

    /// Spawn a supervised loop per session. Session `i` starts after
    /// `i * start_stagger`. Returns the number of client tasks spawned.
    pub fn launch(&self, sessions: Vec<ClientSession>) -> Result<usize, SimError> {
        let planner_settings = PlannerSettings::from_config(&self.config);
        let ctx = LoopContext {
            settings: LoopSettings::from_config(&self.config),
            stats: self.stats.clone(),
            supervisor: self.supervisor.clone(),
        };
        let stagger = self.config.start_stagger();

        let mut launched = 0;
        for (i, session) in sessions.into_iter().enumerate() {
            let planner = TrafficPlanner::new(planner_settings.clone())?;
            let token = self.supervisor.child_token();
            let ctx = ctx.clone();
            let delay = stagger * i as u32;
            self.supervisor.spawn(async move {
                if sleep_or_cancel(delay, &token).await {
                    run_client_loop(session, planner, ctx, token).await;
                }
            });
            launched += 1;
        }

        self.spawn_stats_reporter();
        Ok(launched)
    }

    fn spawn_stats_reporter(&self) {
        if self.config.stats_interval_secs == 0 {
            return;
        }
        let period = Duration::from_secs(self.config.stats_interval_secs);
        let stats = self.stats.clone();
        let token = self.supervisor.child_token();
        self.supervisor.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => stats.snapshot().log(),
                }
            }
        });
    }

    /// Cancel the root token when the process receives Ctrl-C.
    pub fn setup_signal_handler(&self) -> Result<(), SimError> {
        let token = self.supervisor.token();
        ctrlc::set_handler(move || {
            token.cancel();
        })
        .map_err(|e| SimError::ConfigError(format!("Failed to set signal handler: {}", e)))
    }

    pub fn request_shutdown(&self) {
        self.supervisor.cancel();
    }

    pub async fn wait_for_shutdown(&self) {
        self.supervisor.cancelled().await
    }

    /// Cancel and join every client and media task, then return final stats.
    pub async fn graceful_shutdown(&self) -> Result<StatsSnapshot, SimError> {
        info!(tasks = self.supervisor.task_count(), "shutting down");
        self.supervisor.shutdown(self.config.shutdown_timeout()).await?;
        let snapshot = self.stats.snapshot();
        snapshot.log();
        Ok(snapshot)
    }

    /// Start, block until shutdown is requested, then shut down gracefully.
    pub async fn run(&self) -> Result<StatsSnapshot, SimError> {
        self.start().await?;
        self.wait_for_shutdown().await;
        self.graceful_shutdown().await
    }
}
