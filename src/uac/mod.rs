// UAC (User Agent Client) module
//
// One ClientSession per simulated subscriber. The session owns its
// signaling and media endpoints and the CSeq counter; requests are sent
// fire-and-forget and no responses are read.

mod builders;
mod config;

pub use builders::{build_invite_request, build_register_request, Originator, Transaction};
pub use config::SessionConfig;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing::debug;

use crate::config::identity_violation;
use crate::error::SimError;
use crate::ident::TokenSource;
use crate::sdp::SdpOffer;
use crate::sip::formatter::format_request;
use crate::sip::message::SipRequest;
use crate::transport::{Transport, UdpTransport};

/// Largest CSeq number RFC 3261 allows (2^31 - 1).
pub const MAX_CSEQ: u32 = (1 << 31) - 1;

/// One INVITE transaction. Dropped once the request is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct CallAttempt {
    pub call_id: String,
    pub branch: String,
    pub from_tag: String,
    pub callee: String,
    pub cseq: u32,
    pub sdp_offer: String,
}

/// A simulated client with a stable identity and its own endpoints.
pub struct ClientSession {
    client_id: String,
    settings: SessionConfig,
    local_addr: SocketAddr,
    rtp_port: u16,
    cseq: u32,
    signaling: Arc<dyn Transport>,
    media: Arc<dyn Transport>,
    tokens: Arc<dyn TokenSource>,
}

impl ClientSession {
    /// Create a session over existing transports.
    ///
    /// Fails with `ConfigError` when the client id or domain is empty or
    /// contains characters that cannot appear in a SIP URI user part or host.
    pub fn new(
        client_id: impl Into<String>,
        settings: SessionConfig,
        local_addr: SocketAddr,
        rtp_port: u16,
        signaling: Arc<dyn Transport>,
        media: Arc<dyn Transport>,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, SimError> {
        let client_id = client_id.into();
        if let Some(reason) = identity_violation(&client_id) {
            return Err(SimError::ConfigError(format!(
                "client id '{}' {}",
                client_id.escape_debug(),
                reason
            )));
        }
        if let Some(reason) = identity_violation(&settings.domain) {
            return Err(SimError::ConfigError(format!(
                "domain for client {} {}",
                client_id, reason
            )));
        }
        Ok(Self {
            client_id,
            settings,
            local_addr,
            rtp_port,
            cseq: 1,
            signaling,
            media,
            tokens,
        })
    }

    /// Bind an ephemeral signaling socket and an ephemeral media socket on `local_ip`.
    pub async fn bind(
        client_id: impl Into<String>,
        settings: SessionConfig,
        local_ip: IpAddr,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, SimError> {
        let signaling = UdpTransport::bind(local_ip, 0).await?;
        let media = UdpTransport::bind(local_ip, 0).await?;
        let local_addr = signaling.local_addr()?;
        let rtp_port = media.local_addr()?.port();
        Self::new(
            client_id,
            settings,
            local_addr,
            rtp_port,
            Arc::new(signaling),
            Arc::new(media),
            tokens,
        )
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn domain(&self) -> &str {
        &self.settings.domain
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn rtp_port(&self) -> u16 {
        self.rtp_port
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.settings.server_addr
    }

    /// CSeq number the next request will carry.
    pub fn next_cseq(&self) -> u32 {
        self.cseq
    }

    /// Media transport, shared with the RTP stream of an active call.
    pub fn media_transport(&self) -> Arc<dyn Transport> {
        self.media.clone()
    }

    /// Media destination: server IP at `rtp_port + rtp_port_offset`.
    ///
    /// No SDP answer is read, so this port is never validated against the peer.
    pub fn rtp_destination(&self) -> Result<SocketAddr, SimError> {
        let port = self
            .rtp_port
            .checked_add(self.settings.rtp_port_offset)
            .ok_or_else(|| {
                SimError::ConfigError(format!(
                    "RTP port {} + offset {} overflows",
                    self.rtp_port, self.settings.rtp_port_offset
                ))
            })?;
        Ok(SocketAddr::new(self.settings.server_addr.ip(), port))
    }

    fn originator(&self) -> Originator<'_> {
        Originator {
            profile: self.settings.profile,
            user: &self.client_id,
            domain: &self.settings.domain,
            local_addr: self.local_addr,
            user_agent: &self.settings.user_agent,
        }
    }

    /// CSeq for the request being built. Never wraps: once the RFC 3261
    /// range is used up every build fails.
    fn current_cseq(&self) -> Result<u32, SimError> {
        if self.cseq > MAX_CSEQ {
            return Err(SimError::InvalidMessage(format!(
                "CSeq space exhausted for client {}",
                self.client_id
            )));
        }
        Ok(self.cseq)
    }

    fn advance_cseq(&mut self) {
        self.cseq += 1;
    }

    /// Build the next REGISTER. The counter advances only when the build succeeds.
    pub fn build_register(&mut self) -> Result<SipRequest, SimError> {
        let cseq = self.current_cseq()?;
        let call_id = self.tokens.call_id();
        let branch = self.tokens.branch();
        let from_tag = self.tokens.tag();
        let tx = Transaction {
            call_id: &call_id,
            branch: &branch,
            from_tag: &from_tag,
            cseq,
        };
        let request = build_register_request(&self.originator(), &tx)?;
        self.advance_cseq();
        Ok(request)
    }

    /// Build the next INVITE to `callee` with a fresh SDP offer.
    pub fn build_invite(&mut self, callee: &str) -> Result<(CallAttempt, SipRequest), SimError> {
        let cseq = self.current_cseq()?;
        let offer = SdpOffer::now(
            &self.client_id,
            self.settings.profile.session_name(),
            self.local_addr.ip(),
            self.rtp_port,
        );
        let attempt = CallAttempt {
            call_id: self.tokens.call_id(),
            branch: self.tokens.branch(),
            from_tag: self.tokens.tag(),
            callee: callee.to_string(),
            cseq,
            sdp_offer: offer.render(),
        };
        let tx = Transaction {
            call_id: &attempt.call_id,
            branch: &attempt.branch,
            from_tag: &attempt.from_tag,
            cseq: attempt.cseq,
        };
        let request = build_invite_request(&self.originator(), &tx, callee, &attempt.sdp_offer)?;
        self.advance_cseq();
        Ok((attempt, request))
    }

    /// Build and send a REGISTER. Returns the CSeq it carried.
    pub async fn register(&mut self) -> Result<u32, SimError> {
        let cseq = self.current_cseq()?;
        let request = self.build_register()?;
        let bytes = format_request(&request);
        self.signaling.send_to(&bytes, self.settings.server_addr).await?;
        debug!(client = %self.client_id, cseq, bytes = bytes.len(), "REGISTER sent");
        Ok(cseq)
    }

    /// Build and send an INVITE to `callee`.
    pub async fn place_call(&mut self, callee: &str) -> Result<CallAttempt, SimError> {
        let (attempt, request) = self.build_invite(callee)?;
        let bytes = format_request(&request);
        self.signaling.send_to(&bytes, self.settings.server_addr).await?;
        debug!(
            client = %self.client_id,
            cseq = attempt.cseq,
            call_id = %attempt.call_id,
            callee,
            "INVITE sent"
        );
        Ok(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::ident::{RandomTokens, SequentialTokens};
    use crate::sip::message::Method;
    use crate::testutil::MockTransport;

    fn settings(profile: Profile) -> SessionConfig {
        SessionConfig {
            server_addr: "10.1.1.1:5060".parse().unwrap(),
            domain: "ims.example.org".to_string(),
            profile,
            user_agent: "sip-traffic-sim/test".to_string(),
            rtp_port_offset: 1,
        }
    }

    fn session_with(
        profile: Profile,
    ) -> (ClientSession, Arc<MockTransport>, Arc<MockTransport>) {
        let signaling = Arc::new(MockTransport::new());
        let media = Arc::new(MockTransport::new());
        let session = ClientSession::new(
            "client1",
            settings(profile),
            "10.0.0.5:40000".parse().unwrap(),
            16000,
            signaling.clone(),
            media.clone(),
            Arc::new(SequentialTokens::new()),
        )
        .unwrap();
        (session, signaling, media)
    }

    #[test]
    fn test_new_rejects_empty_client_id() {
        let result = ClientSession::new(
            "",
            settings(Profile::Volte),
            "10.0.0.5:40000".parse().unwrap(),
            16000,
            Arc::new(MockTransport::new()),
            Arc::new(MockTransport::new()),
            Arc::new(SequentialTokens::new()),
        );
        assert!(matches!(result, Err(SimError::ConfigError(_))));
    }

    #[test]
    fn test_new_rejects_empty_domain() {
        let mut s = settings(Profile::Volte);
        s.domain = String::new();
        let result = ClientSession::new(
            "client1",
            s,
            "10.0.0.5:40000".parse().unwrap(),
            16000,
            Arc::new(MockTransport::new()),
            Arc::new(MockTransport::new()),
            Arc::new(SequentialTokens::new()),
        );
        assert!(matches!(result, Err(SimError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_register_twice_yields_cseq_1_then_2() {
        let (mut session, signaling, _) = session_with(Profile::Volte);
        assert_eq!(session.register().await.unwrap(), 1);
        assert_eq!(session.register().await.unwrap(), 2);
        assert_eq!(session.next_cseq(), 3);

        let sent = signaling.sent_requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0.headers.get("CSeq"), Some("1 REGISTER"));
        assert_eq!(sent[1].0.headers.get("CSeq"), Some("2 REGISTER"));
        assert!(sent.iter().all(|(_, addr)| *addr == "10.1.1.1:5060".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_register_then_invite_share_counter() {
        let (mut session, signaling, _) = session_with(Profile::Basic);
        session.register().await.unwrap();
        let attempt = session.place_call("user1234").await.unwrap();
        assert_eq!(attempt.cseq, 2);

        let sent = signaling.sent_requests();
        assert_eq!(sent[0].0.method, Method::Register);
        assert_eq!(sent[1].0.method, Method::Invite);
        assert_eq!(sent[1].0.headers.get("CSeq"), Some("2 INVITE"));
        assert_eq!(sent[1].0.headers.get("Call-ID"), Some(attempt.call_id.as_str()));
    }

    #[tokio::test]
    async fn test_invite_carries_sdp_for_session_rtp_port() {
        let (mut session, signaling, _) = session_with(Profile::Volte);
        let attempt = session.place_call("user9999").await.unwrap();
        assert!(attempt.sdp_offer.contains("m=audio 16000 RTP/AVP 96 97\r\n"));
        assert!(attempt.sdp_offer.contains("c=IN IP4 10.0.0.5\r\n"));
        assert!(attempt.sdp_offer.contains("s=VoLTE Call\r\n"));

        let (req, _) = &signaling.sent_requests()[0];
        assert_eq!(req.body_bytes(), attempt.sdp_offer.as_bytes());
        assert_eq!(req.content_length(), Some(attempt.sdp_offer.len()));
        assert_eq!(req.request_uri, "sip:user9999@ims.example.org");
    }

    #[tokio::test]
    async fn test_counter_advances_even_when_send_fails() {
        let (mut session, signaling, _) = session_with(Profile::Volte);
        signaling.fail_next(1);
        assert!(session.register().await.is_err());
        assert_eq!(session.register().await.unwrap(), 2);
    }

    #[test]
    fn test_failed_build_does_not_advance_counter() {
        let (mut session, _, _) = session_with(Profile::Volte);
        assert!(session.build_invite("").is_err());
        assert_eq!(session.next_cseq(), 1);
    }

    #[test]
    fn test_new_rejects_identity_that_breaks_uris() {
        let cases = [
            ("client 1", "ims.example.org"),
            ("client1", "ims example.org"),
            ("a@b", "ims.example.org"),
            ("client1", "x\r\nX-Injected: 1"),
        ];
        for (id, domain) in cases {
            let mut s = settings(Profile::Volte);
            s.domain = domain.to_string();
            let result = ClientSession::new(
                id,
                s,
                "10.0.0.5:40000".parse().unwrap(),
                16000,
                Arc::new(MockTransport::new()),
                Arc::new(MockTransport::new()),
                Arc::new(SequentialTokens::new()),
            );
            assert!(
                matches!(result, Err(SimError::ConfigError(_))),
                "{:?} / {:?} accepted",
                id,
                domain
            );
        }
    }

    #[tokio::test]
    async fn test_cseq_stops_at_rfc_maximum_instead_of_wrapping() {
        let (mut session, signaling, _) = session_with(Profile::Volte);
        session.cseq = MAX_CSEQ;
        assert_eq!(session.register().await.unwrap(), MAX_CSEQ);
        assert!(matches!(session.register().await, Err(SimError::InvalidMessage(_))));
        assert!(session.build_invite("user1000").is_err());
        assert_eq!(session.next_cseq(), MAX_CSEQ + 1);
        assert_eq!(signaling.sent_count(), 1);
    }

    #[test]
    fn test_call_attempt_identifiers_are_distinct() {
        let signaling = Arc::new(MockTransport::new());
        let media = Arc::new(MockTransport::new());
        let mut session = ClientSession::new(
            "client1",
            settings(Profile::Volte),
            "10.0.0.5:40000".parse().unwrap(),
            16000,
            signaling,
            media,
            Arc::new(RandomTokens::new().unwrap()),
        )
        .unwrap();
        let (a, _) = session.build_invite("user1000").unwrap();
        let (b, _) = session.build_invite("user1000").unwrap();
        assert_ne!(a.call_id, b.call_id);
        assert_ne!(a.branch, b.branch);
        assert_ne!(a.from_tag, b.from_tag);
    }

    #[test]
    fn test_rtp_destination_uses_offset_from_local_port() {
        let (session, _, _) = session_with(Profile::Volte);
        assert_eq!(session.rtp_destination().unwrap(), "10.1.1.1:16001".parse().unwrap());
    }

    #[test]
    fn test_rtp_destination_overflow_is_error() {
        let mut s = settings(Profile::Volte);
        s.rtp_port_offset = 10;
        let session = ClientSession::new(
            "client1",
            s,
            "10.0.0.5:40000".parse().unwrap(),
            65530,
            Arc::new(MockTransport::new()),
            Arc::new(MockTransport::new()),
            Arc::new(SequentialTokens::new()),
        )
        .unwrap();
        assert!(session.rtp_destination().is_err());
    }

    #[tokio::test]
    async fn test_bind_uses_real_sockets() {
        let session = ClientSession::bind(
            "client1",
            settings(Profile::Basic),
            "127.0.0.1".parse().unwrap(),
            Arc::new(SequentialTokens::new()),
        )
        .await
        .unwrap();
        assert_eq!(session.local_addr().ip(), "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_ne!(session.local_addr().port(), 0);
        assert_ne!(session.rtp_port(), 0);
        assert_ne!(session.rtp_port(), session.local_addr().port());
    }
}
