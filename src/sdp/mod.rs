// SDP offer rendering for a single audio stream

use std::fmt::Write;
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Dynamic payload type for AMR-WB.
pub const PT_AMR_WB: u8 = 96;
/// Dynamic payload type for AMR narrowband.
pub const PT_AMR: u8 = 97;
/// Audio frame length advertised in `a=ptime`.
pub const PTIME_MS: u32 = 20;
/// Largest packetization advertised in `a=maxptime`.
pub const MAX_PTIME_MS: u32 = 240;

/// Inputs for one audio offer.
#[derive(Debug, Clone, PartialEq)]
pub struct SdpOffer {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub session_name: String,
    pub address: IpAddr,
    pub rtp_port: u16,
}

impl SdpOffer {
    /// Offer whose session id and version are the current Unix time in seconds.
    pub fn now(username: &str, session_name: &str, address: IpAddr, rtp_port: u16) -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            username: username.to_string(),
            session_id: secs,
            session_version: secs,
            session_name: session_name.to_string(),
            address,
            rtp_port,
        }
    }

    fn addr_type(&self) -> &'static str {
        match self.address {
            IpAddr::V4(_) => "IP4",
            IpAddr::V6(_) => "IP6",
        }
    }

    /// Render the offer. Every line is CRLF terminated.
    pub fn render(&self) -> String {
        let at = self.addr_type();
        let mut sdp = String::with_capacity(320);
        write!(
            sdp,
            "v=0\r\n\
             o={} {} {} IN {} {}\r\n\
             s={}\r\n\
             c=IN {} {}\r\n\
             t=0 0\r\n\
             m=audio {} RTP/AVP {} {}\r\n\
             a=rtpmap:{} AMR-WB/16000\r\n\
             a=rtpmap:{} AMR/8000\r\n\
             a=fmtp:{} mode-change-capability=2\r\n\
             a=fmtp:{} mode-change-capability=2\r\n\
             a=ptime:{}\r\n\
             a=maxptime:{}\r\n\
             a=sendrecv\r\n",
            self.username,
            self.session_id,
            self.session_version,
            at,
            self.address,
            self.session_name,
            at,
            self.address,
            self.rtp_port,
            PT_AMR_WB,
            PT_AMR,
            PT_AMR_WB,
            PT_AMR,
            PT_AMR_WB,
            PT_AMR,
            PTIME_MS,
            MAX_PTIME_MS,
        )
        .unwrap();
        sdp
    }
}
