// SIP request data model and structured request builder

use std::fmt;

use crate::error::SimError;

/// Headers every generated request must carry with a non-empty value.
pub const REQUIRED_HEADERS: [&str; 5] = ["Via", "From", "To", "Call-ID", "CSeq"];

/// SIP method types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Register,
    Invite,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Register => "REGISTER",
            Method::Invite => "INVITE",
            Method::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "REGISTER" => Method::Register,
            "INVITE" => Method::Invite,
            other => Method::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single SIP header (name-value pair)
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Ordered collection of SIP headers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    /// Create an empty Headers collection
    pub fn new() -> Self {
        Headers {
            entries: Vec::new(),
        }
    }

    /// Get the first header value matching the name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Set a header value, replacing any existing headers with the same name
    pub fn set(&mut self, name: &str, value: String) {
        self.remove(name);
        self.add(name, value);
    }

    /// Add a header value without removing existing headers with the same name
    pub fn add(&mut self, name: &str, value: String) {
        self.entries.push(Header {
            name: name.to_string(),
            value,
        });
    }

    /// Remove all headers matching the name (case-insensitive)
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|h| !h.name.eq_ignore_ascii_case(name));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the underlying entries
    pub fn entries(&self) -> &[Header] {
        &self.entries
    }
}

/// SIP request message
#[derive(Debug, Clone, PartialEq)]
pub struct SipRequest {
    pub method: Method,
    pub request_uri: String,
    pub version: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

impl SipRequest {
    /// Body bytes, empty when the request carries no body.
    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_deref().unwrap_or(&[])
    }

    /// Declared Content-Length, if present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Builds a [`SipRequest`] from an ordered header list and an optional body.
///
/// `build` rejects requests whose transaction headers are missing or empty,
/// header lines that would split on CR or LF, and request URIs with
/// whitespace. It always derives `Content-Length` from the attached body, so the declared
/// length cannot drift from the bytes that follow the header block.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    request_uri: String,
    headers: Headers,
    body: Option<Vec<u8>>,
}

impl RequestBuilder {
    pub fn new(method: Method, request_uri: impl Into<String>) -> Self {
        Self {
            method,
            request_uri: request_uri.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Append a header. Order of calls is preserved on the wire.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.add(name, value.into());
        self
    }

    /// Append several headers in order.
    pub fn headers<'a, I>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        for (name, value) in headers {
            self.headers.add(name, value);
        }
        self
    }

    /// Attach a body together with its Content-Type.
    pub fn body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.headers.set("Content-Type", content_type.to_string());
        self.body = Some(body.into());
        self
    }

    pub fn build(self) -> Result<SipRequest, SimError> {
        if self.request_uri.trim().is_empty() {
            return Err(SimError::InvalidMessage(format!(
                "{} request URI is empty",
                self.method
            )));
        }
        for name in REQUIRED_HEADERS {
            match self.headers.get(name) {
                Some(v) if !v.trim().is_empty() => {}
                Some(_) => {
                    return Err(SimError::InvalidMessage(format!(
                        "{} header {} is empty",
                        self.method, name
                    )))
                }
                None => {
                    return Err(SimError::InvalidMessage(format!(
                        "{} header {} is missing",
                        self.method, name
                    )))
                }
            }
        }

        let line_break = &['\r', '\n'][..];
        if let Some(h) = self.headers.entries().iter().find(|h| {
            h.value.contains(line_break) || h.name.contains(line_break) || h.name.contains(':')
        }) {
            return Err(SimError::InvalidMessage(format!(
                "{} header {} is not a single header line",
                self.method,
                h.name.escape_debug()
            )));
        }
        if self.request_uri.contains(char::is_whitespace) {
            return Err(SimError::InvalidMessage(format!(
                "{} request URI '{}' contains whitespace",
                self.method,
                self.request_uri.escape_debug()
            )));
        }

        let mut headers = self.headers;
        let body_len = self.body.as_ref().map_or(0, Vec::len);
        headers.set("Content-Length", body_len.to_string());

        Ok(SipRequest {
            method: self.method,
            request_uri: self.request_uri,
            version: super::SIP_VERSION.to_string(),
            headers,
            body: self.body.filter(|b| !b.is_empty()),
        })
    }
}
