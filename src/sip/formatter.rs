// SIP message formatter
// Converts SipRequest structs into RFC 3261 compliant byte sequences

use super::message::SipRequest;

/// Estimate the output size of a formatted request to pre-allocate buffer.
/// The estimate is intentionally slightly over to avoid re-allocation.
pub fn estimate_request_size(req: &SipRequest) -> usize {
    // Request line: METHOD SP URI SP VERSION CRLF
    let mut size = req.method.as_str().len() + 1 + req.request_uri.len() + 1 + req.version.len() + 2;
    for h in req.headers.entries() {
        // "Name: Value\r\n"
        size += h.name.len() + 2 + h.value.len() + 2;
    }
    // Possible auto-added Content-Length header
    size += 32;
    // Empty line separator
    size += 2;
    size + req.body_bytes().len()
}

/// Format a request into an existing buffer (for buffer reuse).
/// The buffer is NOT cleared — caller should clear it if reuse is intended.
pub fn format_into(buf: &mut Vec<u8>, req: &SipRequest) {
    buf.extend_from_slice(req.method.as_str().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(req.request_uri.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(req.version.as_bytes());
    buf.extend_from_slice(b"\r\n");

    for header in req.headers.entries() {
        buf.extend_from_slice(header.name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(header.value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    let body = req.body_bytes();
    if req.headers.get("Content-Length").is_none() {
        buf.extend_from_slice(b"Content-Length: ");
        let mut itoa_buf = itoa::Buffer::new();
        buf.extend_from_slice(itoa_buf.format(body.len()).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(body);
}

/// Format a SipRequest into RFC 3261 compliant bytes.
///
/// ```text
///   METHOD Request-URI SIP/2.0\r\n
///   Header-Name: Header-Value\r\n
///   ...\r\n
///   \r\n
///   [body]
/// ```
pub fn format_request(req: &SipRequest) -> Vec<u8> {
    let mut buf = Vec::with_capacity(estimate_request_size(req));
    format_into(&mut buf, req);
    buf
}
