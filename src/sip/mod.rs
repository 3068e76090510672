pub mod formatter;
pub mod message;
pub mod parser;

/// RFC 3261 magic cookie that prefixes every branch parameter.
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// SIP version token used on request lines and Via headers.
pub const SIP_VERSION: &str = "SIP/2.0";
