// UAC builder functions for SIP message construction
//
// Header value builders use String::with_capacity + push_str instead of
// format! to keep allocations to one per value.

use std::fmt::Write;
use std::net::SocketAddr;

use crate::config::Profile;
use crate::error::SimError;
use crate::sip::message::{Method, RequestBuilder, SipRequest};

pub const MAX_FORWARDS: &str = "70";
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

pub const ALLOW_METHODS: &str = "INVITE,ACK,OPTIONS,BYE,CANCEL,UPDATE,INFO,SUBSCRIBE,NOTIFY,REFER,MESSAGE";
pub const REGISTER_SUPPORTED: &str = "path,gruu";
pub const INVITE_SUPPORTED: &str = "100rel,precondition,timer,replaces";
pub const SESSION_EXPIRES: &str = "1800;refresher=uac";
pub const MIN_SE: &str = "90";
pub const MMTEL_SERVICE: &str = "urn:urn-7:3gpp-service.ims.icsi.mmtel";
pub const MMTEL_ACCEPT_CONTACT: &str =
    "*;+g.3gpp.icsi-ref=\"urn%3Aurn-7%3A3gpp-service.ims.icsi.mmtel\"";
pub const EARLY_MEDIA: &str = "supported";

/// Identity shared by every request a session builds.
#[derive(Debug, Clone, Copy)]
pub struct Originator<'a> {
    pub profile: Profile,
    pub user: &'a str,
    pub domain: &'a str,
    pub local_addr: SocketAddr,
    pub user_agent: &'a str,
}

/// Per-transaction identifiers.
#[derive(Debug, Clone, Copy)]
pub struct Transaction<'a> {
    pub call_id: &'a str,
    pub branch: &'a str,
    pub from_tag: &'a str,
    pub cseq: u32,
}

/// Build Via header value: "SIP/2.0/UDP {addr};branch={branch}"
pub(crate) fn build_via_value(addr: SocketAddr, branch: &str) -> String {
    // "SIP/2.0/UDP " (12) + addr (~21) + ";branch=" (8) + branch (23) = 64
    let mut buf = String::with_capacity(64);
    buf.push_str("SIP/2.0/UDP ");
    write!(buf, "{}", addr).unwrap();
    buf.push_str(";branch=");
    buf.push_str(branch);
    buf
}

/// Build From header value: "<sip:{user}@{domain}>;tag={tag}"
pub(crate) fn build_from_value(username: &str, domain: &str, tag: &str) -> String {
    let mut buf = String::with_capacity(5 + username.len() + 1 + domain.len() + 6 + tag.len());
    buf.push_str("<sip:");
    buf.push_str(username);
    buf.push('@');
    buf.push_str(domain);
    buf.push_str(">;tag=");
    buf.push_str(tag);
    buf
}

/// Build To header value: "<sip:{user}@{domain}>"
pub(crate) fn build_to_value(username: &str, domain: &str) -> String {
    let mut buf = String::with_capacity(5 + username.len() + 1 + domain.len() + 1);
    buf.push_str("<sip:");
    buf.push_str(username);
    buf.push('@');
    buf.push_str(domain);
    buf.push('>');
    buf
}

/// Build CSeq header value: "{num} {method}"
pub(crate) fn build_cseq_value(cseq: u32, method: &str) -> String {
    let mut num = itoa::Buffer::new();
    let num = num.format(cseq);
    let mut buf = String::with_capacity(num.len() + 1 + method.len());
    buf.push_str(num);
    buf.push(' ');
    buf.push_str(method);
    buf
}

/// Build SIP URI: "sip:{user}@{domain}"
pub(crate) fn build_sip_uri(username: &str, domain: &str) -> String {
    let mut buf = String::with_capacity(4 + username.len() + 1 + domain.len());
    buf.push_str("sip:");
    buf.push_str(username);
    buf.push('@');
    buf.push_str(domain);
    buf
}

/// Build SIP domain URI: "sip:{domain}"
pub(crate) fn build_sip_domain_uri(domain: &str) -> String {
    let mut buf = String::with_capacity(4 + domain.len());
    buf.push_str("sip:");
    buf.push_str(domain);
    buf
}

/// Build Contact header value: "<sip:{user}@{addr}>"
pub(crate) fn build_contact_value(username: &str, addr: SocketAddr) -> String {
    let mut buf = String::with_capacity(5 + username.len() + 1 + 48 + 1);
    buf.push_str("<sip:");
    buf.push_str(username);
    buf.push('@');
    write!(buf, "{}", addr).unwrap();
    buf.push('>');
    buf
}

/// Digest Authorization with empty nonce/response, as sent before any challenge.
pub(crate) fn build_authorization_placeholder(username: &str, domain: &str) -> String {
    let mut buf = String::with_capacity(64 + username.len() + 2 * domain.len());
    buf.push_str("Digest username=\"");
    buf.push_str(username);
    buf.push_str("\",realm=\"");
    buf.push_str(domain);
    buf.push_str("\",nonce=\"\",uri=\"sip:");
    buf.push_str(domain);
    buf.push_str("\",response=\"\"");
    buf
}

fn transaction_headers(
    method: &str,
    from: &Originator<'_>,
    to_user: &str,
    tx: &Transaction<'_>,
) -> [(&'static str, String); 6] {
    [
        ("Via", build_via_value(from.local_addr, tx.branch)),
        ("From", build_from_value(from.user, from.domain, tx.from_tag)),
        ("To", build_to_value(to_user, from.domain)),
        ("Call-ID", tx.call_id.to_string()),
        ("CSeq", build_cseq_value(tx.cseq, method)),
        ("Contact", build_contact_value(from.user, from.local_addr)),
    ]
}

/// REGISTER for the originator's own address-of-record. No body.
pub fn build_register_request(
    from: &Originator<'_>,
    tx: &Transaction<'_>,
) -> Result<SipRequest, SimError> {
    let mut builder = RequestBuilder::new(Method::Register, build_sip_domain_uri(from.domain))
        .headers(transaction_headers("REGISTER", from, from.user, tx));

    if from.profile == Profile::Volte {
        builder = builder
            .header("Authorization", build_authorization_placeholder(from.user, from.domain))
            .header("Supported", REGISTER_SUPPORTED);
    }

    builder = builder
        .header("Max-Forwards", MAX_FORWARDS)
        .header("User-Agent", from.user_agent);

    if from.profile == Profile::Volte {
        builder = builder.header("Allow", ALLOW_METHODS);
    }

    builder.build()
}

/// INVITE to `callee` carrying `sdp` unmodified as the body.
pub fn build_invite_request(
    from: &Originator<'_>,
    tx: &Transaction<'_>,
    callee: &str,
    sdp: &str,
) -> Result<SipRequest, SimError> {
    if callee.trim().is_empty() {
        return Err(SimError::InvalidMessage("INVITE callee is empty".to_string()));
    }

    let mut builder = RequestBuilder::new(Method::Invite, build_sip_uri(callee, from.domain))
        .headers(transaction_headers("INVITE", from, callee, tx));

    if from.profile == Profile::Volte {
        builder = builder
            .header("Authorization", build_authorization_placeholder(from.user, from.domain))
            .header("Supported", INVITE_SUPPORTED)
            .header("Session-Expires", SESSION_EXPIRES)
            .header("Min-SE", MIN_SE)
            .header("Allow", ALLOW_METHODS);
    }

    builder = builder
        .body(SDP_CONTENT_TYPE, sdp)
        .header("Max-Forwards", MAX_FORWARDS)
        .header("User-Agent", from.user_agent);

    if from.profile == Profile::Volte {
        builder = builder
            .header("P-Preferred-Service", MMTEL_SERVICE)
            .header("Accept-Contact", MMTEL_ACCEPT_CONTACT)
            .header("P-Early-Media", EARLY_MEDIA);
    }

    builder.build()
}
