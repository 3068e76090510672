// Per-session settings derived from the top-level configuration

use std::net::SocketAddr;

use crate::config::{Config, Profile};
use crate::error::SimError;

/// Settings shared by every client session of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub server_addr: SocketAddr,
    pub domain: String,
    pub profile: Profile,
    pub user_agent: String,
    pub rtp_port_offset: u16,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Result<Self, SimError> {
        Ok(Self {
            server_addr: config.server_addr()?,
            domain: config.domain().to_string(),
            profile: config.profile,
            user_agent: config.user_agent(),
            rtp_port_offset: config.rtp_port_offset,
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let config = Config::default();
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], config.server_port)),
            domain: config.domain().to_string(),
            profile: config.profile,
            user_agent: config.user_agent(),
            rtp_port_offset: config.rtp_port_offset,
        }
    }
}
