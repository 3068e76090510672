// CLI subcommand definitions using clap derive macros
use clap::{Args, Parser};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

use crate::config::{self, Config, Profile};
use crate::error::SimError;
use crate::orchestrator::Orchestrator;
use crate::sink::{Sink, SinkSummary};
use crate::stats::StatsSnapshot;

/// Synthetic SIP/VoLTE signaling and RTP traffic generator
#[derive(Parser, Debug, PartialEq)]
#[command(name = "sip-traffic-sim", version)]
pub enum Cli {
    /// Generate traffic until interrupted
    Run {
        #[command(flatten)]
        config: ConfigArgs,
        /// Write the final stats snapshot as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        log: LogArgs,
    },
    /// Print the effective configuration as JSON and exit
    ShowConfig {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        log: LogArgs,
    },
    /// Listen for traffic, parse and count received requests
    Sink {
        /// Address to listen on
        #[arg(long, env = "SIM_SINK_LISTEN", default_value = "127.0.0.1:5060")]
        listen: SocketAddr,
        /// Write the final counts as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        log: LogArgs,
    },
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct LogArgs {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "SIM_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Configuration sources. File values are overridden by environment
/// variables, which are overridden by flags.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ConfigArgs {
    /// JSON configuration file
    #[arg(long, env = "SIM_CONFIG")]
    pub config: Option<PathBuf>,
    #[arg(long, env = "SIM_SERVER_HOST")]
    pub server_host: Option<String>,
    #[arg(long, env = "SIM_SERVER_PORT")]
    pub server_port: Option<u16>,
    #[arg(long, env = "SIM_LOCAL_IP")]
    pub local_ip: Option<String>,
    /// Number of simulated clients
    #[arg(long, env = "SIM_CLIENTS")]
    pub clients: Option<usize>,
    #[arg(long, env = "SIM_CLIENT_PREFIX")]
    pub client_prefix: Option<String>,
    #[arg(long, env = "SIM_CLIENT_START")]
    pub client_start: Option<u32>,
    #[arg(long, env = "SIM_PROFILE", value_enum)]
    pub profile: Option<Profile>,
    /// SIP domain / IMS realm
    #[arg(long, env = "SIM_DOMAIN")]
    pub domain: Option<String>,
    #[arg(long, env = "SIM_USER_AGENT")]
    pub user_agent: Option<String>,
    #[arg(long, env = "SIM_REGISTER_INTERVAL_MIN_MS")]
    pub register_interval_min_ms: Option<u64>,
    #[arg(long, env = "SIM_REGISTER_INTERVAL_MAX_MS")]
    pub register_interval_max_ms: Option<u64>,
    /// Probability in [0, 1] that a cycle places a call
    #[arg(long, env = "SIM_CALL_PROBABILITY")]
    pub call_probability: Option<f64>,
    #[arg(long, env = "SIM_CALL_DURATION_MIN_MS")]
    pub call_duration_min_ms: Option<u64>,
    #[arg(long, env = "SIM_CALL_DURATION_MAX_MS")]
    pub call_duration_max_ms: Option<u64>,
    #[arg(long, env = "SIM_START_STAGGER_MS")]
    pub start_stagger_ms: Option<u64>,
    #[arg(long, env = "SIM_ERROR_BACKOFF_MS")]
    pub error_backoff_ms: Option<u64>,
    #[arg(long, env = "SIM_RTP_INTERVAL_MS")]
    pub rtp_interval_ms: Option<u64>,
    #[arg(long, env = "SIM_RTP_PACKET_SIZE")]
    pub rtp_packet_size: Option<usize>,
    #[arg(long, env = "SIM_RTP_PORT_OFFSET")]
    pub rtp_port_offset: Option<u16>,
    /// Seconds between stats log lines (0 disables)
    #[arg(long, env = "SIM_STATS_INTERVAL_SECS")]
    pub stats_interval_secs: Option<u64>,
    #[arg(long, env = "SIM_SHUTDOWN_TIMEOUT_SECS")]
    pub shutdown_timeout_secs: Option<u64>,
}

macro_rules! override_fields {
    ($args:expr, $config:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $args.$field.clone() {
                $config.$field = value;
            }
        )+
    };
}

impl ConfigArgs {
    /// Apply the overrides on top of `base`.
    pub fn apply(&self, mut base: Config) -> Config {
        override_fields!(
            self,
            base,
            server_host,
            server_port,
            local_ip,
            clients,
            client_prefix,
            client_start,
            profile,
            register_interval_min_ms,
            register_interval_max_ms,
            call_probability,
            call_duration_min_ms,
            call_duration_max_ms,
            start_stagger_ms,
            error_backoff_ms,
            rtp_interval_ms,
            rtp_packet_size,
            rtp_port_offset,
            stats_interval_secs,
            shutdown_timeout_secs,
        );
        if self.domain.is_some() {
            base.domain = self.domain.clone();
        }
        if self.user_agent.is_some() {
            base.user_agent = self.user_agent.clone();
        }
        base
    }

    /// Load the file (if any), apply overrides and validate.
    pub fn resolve(&self) -> Result<Config, SimError> {
        let base = match &self.config {
            Some(path) => config::read_file(path)?,
            None => Config::default(),
        };
        let resolved = self.apply(base);
        resolved.ensure_valid()?;
        Ok(resolved)
    }
}

impl Cli {
    pub fn log_level(&self) -> &str {
        match self {
            Cli::Run { log, .. } | Cli::ShowConfig { log, .. } | Cli::Sink { log, .. } => {
                &log.log_level
            }
        }
    }
}

/// Build the log filter: RUST_LOG when set, otherwise `level`.
pub fn env_filter(level: &str) -> Result<EnvFilter, SimError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| SimError::ConfigError(format!("Invalid log level '{}': {}", level, e))),
    }
}

/// Install the global tracing subscriber.
pub fn init_logging(level: &str) -> Result<(), SimError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level)?)
        .with_target(false)
        .try_init()
        .map_err(|e| SimError::ConfigError(format!("Failed to initialize logging: {}", e)))
}

/// runサブコマンドの実行
pub async fn run_simulation(
    args: &ConfigArgs,
    output: Option<&Path>,
) -> Result<StatsSnapshot, SimError> {
    let config = args.resolve()?;
    let orchestrator = Orchestrator::new(config)?;
    orchestrator.setup_signal_handler()?;
    let snapshot = orchestrator.run().await?;
    if let Some(path) = output {
        snapshot.write_json(path)?;
        tracing::info!(path = %path.display(), "stats written");
    }
    Ok(snapshot)
}

/// show-configサブコマンドの実行
pub fn show_config(args: &ConfigArgs) -> Result<String, SimError> {
    let config = args.resolve()?;
    serde_json::to_string_pretty(&config)
        .map_err(|e| SimError::OutputError(format!("failed to serialize config: {}", e)))
}

/// sinkサブコマンドの実行
pub async fn run_sink(listen: SocketAddr, output: Option<&Path>) -> Result<SinkSummary, SimError> {
    let sink = Sink::bind(listen).await?;
    let token = tokio_util::sync::CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .map_err(|e| SimError::ConfigError(format!("Failed to set signal handler: {}", e)))?;
    let summary = sink.run(token).await?;
    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| SimError::OutputError(format!("failed to serialize summary: {}", e)))?;
        std::fs::write(path, json).map_err(|e| {
            SimError::OutputError(format!("failed to write '{}': {}", path.display(), e))
        })?;
    }
    Ok(summary)
}
