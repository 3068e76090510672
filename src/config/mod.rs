// Configuration manager module
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::SimError;

/// Default IMS home domain used by the VoLTE profile.
pub const DEFAULT_IMS_DOMAIN: &str = "ims.mnc001.mcc001.3gppnetwork.org";
/// Default domain used by the basic SIP profile.
pub const DEFAULT_SIP_DOMAIN: &str = "service.com";

/// Signaling flavour generated by every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Plain RFC 3261 REGISTER/INVITE
    Basic,
    /// IMS/VoLTE headers on top of the basic profile
    Volte,
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Volte
    }
}

impl Profile {
    pub fn default_domain(self) -> &'static str {
        match self {
            Profile::Basic => DEFAULT_SIP_DOMAIN,
            Profile::Volte => DEFAULT_IMS_DOMAIN,
        }
    }

    pub fn default_user_agent(self) -> String {
        let flavour = match self {
            Profile::Basic => "sip",
            Profile::Volte => "volte",
        };
        format!("sip-traffic-sim/{} ({})", env!("CARGO_PKG_VERSION"), flavour)
    }

    pub fn session_name(self) -> &'static str {
        match self {
            Profile::Basic => "SIP Call",
            Profile::Volte => "VoLTE Call",
        }
    }
}

/// Simulator configuration. Every tunable has a named field and a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub local_ip: String,
    pub clients: usize,
    pub client_prefix: String,
    pub client_start: u32,
    pub profile: Profile,
    pub domain: Option<String>,
    pub user_agent: Option<String>,
    pub register_interval_min_ms: u64,
    pub register_interval_max_ms: u64,
    pub call_probability: f64,
    pub call_duration_min_ms: u64,
    pub call_duration_max_ms: u64,
    pub start_stagger_ms: u64,
    pub error_backoff_ms: u64,
    pub rtp_interval_ms: u64,
    pub rtp_packet_size: usize,
    pub rtp_port_offset: u16,
    pub stats_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 5060,
            local_ip: "127.0.0.1".to_string(),
            clients: 5,
            client_prefix: "client".to_string(),
            client_start: 1,
            profile: Profile::default(),
            domain: None,
            user_agent: None,
            register_interval_min_ms: 5_000,
            register_interval_max_ms: 15_000,
            call_probability: 0.3,
            call_duration_min_ms: 10_000,
            call_duration_max_ms: 30_000,
            start_stagger_ms: 1_000,
            error_backoff_ms: 5_000,
            rtp_interval_ms: 20,
            rtp_packet_size: 160,
            rtp_port_offset: 1,
            stats_interval_secs: 10,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Reason `value` cannot be used as a SIP user part or host, if any.
///
/// Whitespace, control characters and `<>@;` would split or reshape the
/// URIs and header values they are placed in.
pub fn identity_violation(value: &str) -> Option<&'static str> {
    if value.trim().is_empty() {
        Some("must not be empty")
    } else if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("must not contain whitespace or control characters")
    } else if value.chars().any(|c| matches!(c, '<' | '>' | '@' | ';')) {
        Some("must not contain any of <>@;")
    } else {
        None
    }
}

impl Config {
    /// 設定値のバリデーション
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server_port == 0 {
            errors.push("server_port must be greater than 0".to_string());
        }
        if self.server_host.parse::<IpAddr>().is_err() {
            errors.push(format!("server_host '{}' is not an IP address", self.server_host));
        }
        if self.local_ip.parse::<IpAddr>().is_err() {
            errors.push(format!("local_ip '{}' is not an IP address", self.local_ip));
        }
        if self.clients == 0 {
            errors.push("clients must be greater than 0".to_string());
        }
        if let Some(reason) = identity_violation(&self.client_prefix) {
            errors.push(format!("client_prefix {}", reason));
        }
        if let Some(reason) = self.domain.as_deref().and_then(identity_violation) {
            errors.push(format!("domain {}", reason));
        }
        if let Some(ua) = &self.user_agent {
            if ua.trim().is_empty() {
                errors.push("user_agent must not be empty".to_string());
            } else if ua.chars().any(char::is_control) {
                errors.push("user_agent must not contain CR, LF or other control characters".to_string());
            }
        }
        if self.register_interval_min_ms > self.register_interval_max_ms {
            errors.push("register_interval_min_ms must be <= register_interval_max_ms".to_string());
        }
        if self.call_duration_min_ms > self.call_duration_max_ms {
            errors.push("call_duration_min_ms must be <= call_duration_max_ms".to_string());
        }
        if !(0.0..=1.0).contains(&self.call_probability) {
            errors.push("call_probability must be within [0, 1]".to_string());
        }
        if self.rtp_interval_ms == 0 {
            errors.push("rtp_interval_ms must be greater than 0".to_string());
        }
        if self.rtp_packet_size < 2 {
            errors.push("rtp_packet_size must be at least 2".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and convert the violations into a single [`SimError`].
    pub fn ensure_valid(&self) -> Result<(), SimError> {
        self.validate().map_err(|errors| {
            SimError::ConfigError(format!("Validation errors: {}", errors.join("; ")))
        })
    }

    pub fn server_addr(&self) -> Result<SocketAddr, SimError> {
        let ip: IpAddr = self.server_host.parse().map_err(|e| {
            SimError::ConfigError(format!("Invalid server_host '{}': {}", self.server_host, e))
        })?;
        Ok(SocketAddr::new(ip, self.server_port))
    }

    pub fn local_ip(&self) -> Result<IpAddr, SimError> {
        self.local_ip.parse().map_err(|e| {
            SimError::ConfigError(format!("Invalid local_ip '{}': {}", self.local_ip, e))
        })
    }

    pub fn domain(&self) -> &str {
        self.domain
            .as_deref()
            .unwrap_or_else(|| self.profile.default_domain())
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| self.profile.default_user_agent())
    }

    /// Client identities in start order: `<prefix><start>`, `<prefix><start + 1>`, ...
    pub fn client_ids(&self) -> Vec<String> {
        (0..self.clients)
            .map(|i| format!("{}{}", self.client_prefix, self.client_start as usize + i))
            .collect()
    }

    pub fn start_stagger(&self) -> Duration {
        Duration::from_millis(self.start_stagger_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn rtp_interval(&self) -> Duration {
        Duration::from_millis(self.rtp_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// JSON文字列から設定を読み込む（バリデーションなし）
pub fn parse_str(json: &str) -> Result<Config, SimError> {
    serde_json::from_str(json).map_err(|e| SimError::ConfigError(format!("JSON parse error: {}", e)))
}

/// JSONファイルから設定を読み込む（バリデーションなし）
pub fn read_file(path: &Path) -> Result<Config, SimError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        SimError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_str(&content)
}

/// JSON文字列から設定を読み込み、バリデーションを実行する
pub fn load_from_str(json: &str) -> Result<Config, SimError> {
    let config = parse_str(json)?;
    config.ensure_valid()?;
    Ok(config)
}

/// JSONファイルから設定を読み込み、バリデーションを実行する
pub fn load_from_file(path: &Path) -> Result<Config, SimError> {
    let config = read_file(path)?;
    config.ensure_valid()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_behavior() {
        let cfg = Config::default();
        assert_eq!(cfg.server_addr().unwrap(), "127.0.0.1:5060".parse().unwrap());
        assert_eq!(cfg.clients, 5);
        assert_eq!(cfg.register_interval_min_ms, 5_000);
        assert_eq!(cfg.register_interval_max_ms, 15_000);
        assert!((cfg.call_probability - 0.3).abs() < f64::EPSILON);
        assert_eq!(cfg.call_duration_min_ms, 10_000);
        assert_eq!(cfg.call_duration_max_ms, 30_000);
        assert_eq!(cfg.start_stagger(), Duration::from_secs(1));
        assert_eq!(cfg.error_backoff(), Duration::from_secs(5));
        assert_eq!(cfg.rtp_interval(), Duration::from_millis(20));
        assert_eq!(cfg.rtp_packet_size, 160);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_profile_default_domains() {
        let mut cfg = Config::default();
        assert_eq!(cfg.domain(), DEFAULT_IMS_DOMAIN);
        cfg.profile = Profile::Basic;
        assert_eq!(cfg.domain(), DEFAULT_SIP_DOMAIN);
        cfg.domain = Some("example.org".to_string());
        assert_eq!(cfg.domain(), "example.org");
    }

    #[test]
    fn test_user_agent_override() {
        let mut cfg = Config::default();
        assert!(cfg.user_agent().starts_with("sip-traffic-sim/"));
        cfg.user_agent = Some("tester/1.0".to_string());
        assert_eq!(cfg.user_agent(), "tester/1.0");
    }

    #[test]
    fn test_client_ids_follow_prefix_and_start() {
        let cfg = Config {
            clients: 3,
            client_prefix: "ue".to_string(),
            client_start: 10,
            ..Default::default()
        };
        assert_eq!(cfg.client_ids(), vec!["ue10", "ue11", "ue12"]);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let cfg = Config {
            clients: 0,
            server_port: 0,
            call_probability: 1.5,
            register_interval_min_ms: 20,
            register_interval_max_ms: 10,
            ..Default::default()
        };
        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_validate_rejects_empty_domain() {
        let cfg = Config {
            domain: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_identity_that_breaks_uris() {
        for bad in ["ue 1", "ue\t1", "a@b", "<ue>", "ue;x", "ue\r\n"] {
            let cfg = Config {
                client_prefix: bad.to_string(),
                ..Default::default()
            };
            assert!(cfg.validate().is_err(), "client_prefix {:?} accepted", bad);

            let cfg = Config {
                domain: Some(bad.to_string()),
                ..Default::default()
            };
            assert!(cfg.validate().is_err(), "domain {:?} accepted", bad);
        }
    }

    #[test]
    fn test_validate_rejects_header_injection_in_user_agent() {
        let cfg = Config {
            user_agent: Some("ua/1.0\r\nX-Injected: yes".to_string()),
            ..Default::default()
        };
        let errors = cfg.validate().unwrap_err();
        assert!(errors[0].contains("user_agent"));
        assert!(matches!(cfg.ensure_valid(), Err(SimError::ConfigError(_))));
    }

    #[test]
    fn test_validate_accepts_spaces_in_user_agent() {
        let cfg = Config {
            user_agent: Some("Acme Phone/2.1 (lab)".to_string()),
            domain: Some("ims.example.org".to_string()),
            client_prefix: "ue-".to_string(),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_identity_violation() {
        assert_eq!(identity_violation("client"), None);
        assert!(identity_violation("").is_some());
        assert!(identity_violation("example .org").is_some());
        assert!(identity_violation("user@host").is_some());
    }

    #[test]
    fn test_validate_rejects_bad_addresses() {
        let cfg = Config {
            server_host: "not-an-ip".to_string(),
            local_ip: "nope".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.validate().unwrap_err().len(), 2);
        assert!(matches!(cfg.server_addr(), Err(SimError::ConfigError(_))));
    }

    #[test]
    fn test_load_from_str_partial_uses_defaults() {
        let cfg = load_from_str(r#"{"clients": 2, "profile": "basic"}"#).unwrap();
        assert_eq!(cfg.clients, 2);
        assert_eq!(cfg.profile, Profile::Basic);
        assert_eq!(cfg.server_port, 5060);
    }

    #[test]
    fn test_load_from_str_rejects_invalid() {
        let err = load_from_str(r#"{"clients": 0}"#).unwrap_err();
        assert!(err.to_string().contains("clients must be greater than 0"));
    }

    #[test]
    fn test_load_from_str_rejects_bad_json() {
        let err = load_from_str("{not json").unwrap_err();
        assert!(err.to_string().contains("JSON parse error"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server_port": 5070, "call_probability": 0.5}}"#).unwrap();
        let cfg = load_from_file(file.path()).unwrap();
        assert_eq!(cfg.server_port, 5070);
        assert!((cfg.call_probability - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_read_file_skips_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"clients": 0}}"#).unwrap();
        assert_eq!(read_file(file.path()).unwrap().clients, 0);
        assert!(load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = load_from_file(Path::new("/nonexistent/sim.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_config_json_roundtrip() {
        let cfg = Config {
            domain: Some("example.net".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(load_from_str(&json).unwrap(), cfg);
    }
}
