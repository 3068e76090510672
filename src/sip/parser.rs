// SIP request parser using nom combinators

use nom::{
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{space0, space1},
    IResult,
};

use super::message::{Headers, Method, SipRequest};
use crate::error::SimError;

fn parse_error(message: impl Into<String>) -> SimError {
    SimError::ParseError(message.into())
}

/// nom parser: consume a CRLF sequence
fn crlf(input: &[u8]) -> IResult<&[u8], &[u8]> {
    tag(b"\r\n")(input)
}

/// Parse the request line: METHOD SP Request-URI SP SIP-Version CRLF
fn parse_request_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8], &[u8])> {
    let (input, method) = take_while1(|b: u8| b.is_ascii_alphabetic())(input)?;
    let (input, _) = space1(input)?;
    let (input, uri) = take_while1(|b: u8| b != b' ' && b != b'\r' && b != b'\n')(input)?;
    let (input, _) = space1(input)?;
    let (input, version) = take_until("\r\n")(input)?;
    let (input, _) = crlf(input)?;
    Ok((input, (method, uri, version)))
}

/// Parse a single header line: Header-Name: Header-Value CRLF
fn parse_header_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    let (input, name) = take_while1(|b: u8| b != b':' && b != b'\r' && b != b'\n')(input)?;
    let (input, _) = tag(b":")(input)?;
    let (input, _) = space0(input)?;
    let (input, value) = take_until("\r\n")(input)?;
    let (input, _) = crlf(input)?;
    Ok((input, (name, value)))
}

/// Parse all headers up to and including the empty line (CRLF CRLF)
fn parse_headers(mut input: &[u8]) -> IResult<&[u8], Vec<(&[u8], &[u8])>> {
    let mut headers = Vec::new();
    loop {
        if input.starts_with(b"\r\n") {
            let (remaining, _) = crlf(input)?;
            return Ok((remaining, headers));
        }
        let (remaining, header) = parse_header_line(input)?;
        headers.push(header);
        input = remaining;
    }
}

fn utf8<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str, SimError> {
    std::str::from_utf8(bytes).map_err(|_| parse_error(format!("invalid UTF-8 in {}", what)))
}

/// Parse a SIP request from raw bytes.
///
/// The header block must be terminated by an empty line. The body is taken
/// from the declared Content-Length and must match the remaining bytes exactly.
pub fn parse_request(input: &[u8]) -> Result<SipRequest, SimError> {
    if input.is_empty() {
        return Err(parse_error("empty input"));
    }
    if input.starts_with(b"SIP/") {
        return Err(parse_error("responses are not accepted"));
    }

    let (remaining, (method_bytes, uri_bytes, version_bytes)) = parse_request_line(input)
        .map_err(|e| parse_error(format!("invalid request line: {}", e)))?;

    let method = Method::parse(utf8(method_bytes, "method")?);
    let request_uri = utf8(uri_bytes, "request URI")?.to_string();
    let version = utf8(version_bytes, "SIP version")?.to_string();
    if !version.starts_with("SIP/") {
        return Err(parse_error(format!("invalid SIP version: {}", version)));
    }

    let (remaining, raw_headers) =
        parse_headers(remaining).map_err(|e| parse_error(format!("invalid headers: {}", e)))?;

    let mut headers = Headers::new();
    for (name_bytes, value_bytes) in &raw_headers {
        let name = utf8(name_bytes, "header name")?.trim().to_string();
        let value = utf8(value_bytes, "header value")?.trim().to_string();
        headers.add(&name, value);
    }

    let body = parse_body(remaining, &headers)?;

    Ok(SipRequest {
        method,
        request_uri,
        version,
        headers,
        body,
    })
}

fn parse_body(remaining: &[u8], headers: &Headers) -> Result<Option<Vec<u8>>, SimError> {
    let declared = match headers.get("Content-Length") {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map_err(|_| parse_error(format!("invalid Content-Length: {}", v)))?,
        None => remaining.len(),
    };

    if declared != remaining.len() {
        return Err(parse_error(format!(
            "Content-Length mismatch: declared {} bytes, got {}",
            declared,
            remaining.len()
        )));
    }

    Ok(if declared == 0 {
        None
    } else {
        Some(remaining.to_vec())
    })
}
