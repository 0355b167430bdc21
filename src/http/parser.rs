//! Resumable HTTP/1.1 request parser.
//!
//! Every function works on a caller-owned buffer and a cursor into it. A
//! function that cannot finish with the bytes available returns without
//! moving the cursor past anything it has not fully consumed, so the caller
//! can read more from the socket and call again with the same cursor.

use bytes::Bytes;
use url::Url;

use crate::http::request::{Method, Request};
use crate::http::response::StatusCode;

/// Progress through one request. Only ever moves forward until the session
/// resets it for the next request on a keep-alive connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ParseState {
    #[default]
    AwaitingRequestLine,
    AwaitingHeaders,
    AwaitingBody,
    Completed,
}

impl ParseState {
    pub fn reset(&mut self) {
        *self = ParseState::AwaitingRequestLine;
    }
}

/// Terminal parse failures. Running out of bytes is never one of these;
/// that is reported as `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequestLine,
    #[error("unrecognized method `{0}`")]
    InvalidMethod(String),
    #[error("malformed header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,
    #[error("unsupported Transfer-Encoding `{0}`")]
    UnsupportedTransferEncoding(String),
    #[error("request head exceeds {0} bytes")]
    HeadersTooLarge(usize),
    #[error("declared body of {0} bytes exceeds the limit")]
    PayloadTooLarge(usize),
    #[error("connection closed before the request was complete")]
    UnexpectedEof,
}

impl ParseError {
    /// Status written back to the client before the connection is closed.
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::UnsupportedTransferEncoding(_) => StatusCode::NotImplemented,
            ParseError::HeadersTooLarge(_) => StatusCode::RequestHeaderFieldsTooLarge,
            ParseError::PayloadTooLarge(_) => StatusCode::PayloadTooLarge,
            _ => StatusCode::BadRequest,
        }
    }
}

/// The three tokens of a request line, borrowed from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: Method,
    pub path: &'a str,
    /// Starts with `?` when present, otherwise empty
    pub query: &'a str,
    pub version: &'a str,
}

/// Scans `buf[*cursor..]` for the next line terminator.
///
/// On success the cursor moves past the terminator and the line bounds
/// `(start, end)` exclude it. CRLF is expected; a bare LF is accepted. With no
/// terminator available the cursor is left where it was.
pub fn try_read_line(buf: &[u8], cursor: &mut usize) -> Option<(usize, usize)> {
    let start = *cursor;
    if start >= buf.len() {
        return None;
    }

    let lf = start + buf[start..].iter().position(|&b| b == b'\n')?;
    let end = if lf > start && buf[lf - 1] == b'\r' {
        lf - 1
    } else {
        lf
    };

    *cursor = lf + 1;
    Some((start, end))
}

/// Splits `METHOD SP target SP version` on single spaces.
pub fn parse_request_line(line: &str) -> Result<RequestLine<'_>, ParseError> {
    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::InvalidRequestLine);
    };

    let method = Method::from_str(method).ok_or_else(|| ParseError::InvalidMethod(method.to_string()))?;

    if target.is_empty() || !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequestLine);
    }

    let (path, query) = match target.find('?') {
        Some(i) => target.split_at(i),
        None => (target, ""),
    };

    Ok(RequestLine {
        method,
        path,
        query,
        version,
    })
}

/// Splits a header line at the first colon and trims both sides.
pub fn parse_header(line: &str) -> Result<(&str, &str), ParseError> {
    let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
    let name = name.trim();

    if name.is_empty() {
        return Err(ParseError::InvalidHeader);
    }

    Ok((name, value.trim()))
}

/// Reads header lines until the blank line that ends the block.
///
/// `on_header` fires once per complete line as it is consumed, so calling
/// again after more bytes arrive picks up where the previous call stopped.
/// Returns `Ok(false)` while the blank line is still missing.
pub fn try_parse_headers<F>(buf: &[u8], cursor: &mut usize, mut on_header: F) -> Result<bool, ParseError>
where
    F: FnMut(&str, &str),
{
    while let Some((start, end)) = try_read_line(buf, cursor) {
        let line = as_str(&buf[start..end])?;
        if line.is_empty() {
            return Ok(true);
        }

        let (name, value) = parse_header(line)?;
        on_header(name, value);
    }

    Ok(false)
}

/// Drives `state` through request line, headers and body.
///
/// `request` is filled in as each phase completes. Returns `Ok(true)` exactly
/// once, when the body has been read; any earlier call that runs out of bytes
/// returns `Ok(false)` and should be repeated after the next socket read.
pub fn try_parse_http_request(
    buf: &[u8],
    cursor: &mut usize,
    state: &mut ParseState,
    request: &mut Request,
) -> Result<bool, ParseError> {
    if *state == ParseState::AwaitingRequestLine {
        loop {
            let Some((start, end)) = try_read_line(buf, cursor) else {
                return Ok(false);
            };

            // Stray blank lines ahead of a request line are skipped.
            if start == end {
                continue;
            }

            let line = parse_request_line(as_str(&buf[start..end])?)?;
            request.method = line.method;
            request.path = line.path.to_string();
            request.query = line.query.to_string();
            request.version = line.version.to_string();
            break;
        }
        *state = ParseState::AwaitingHeaders;
    }

    if *state == ParseState::AwaitingHeaders {
        let headers = &mut request.headers;
        if !try_parse_headers(buf, cursor, |name, value| headers.insert(name, value))? {
            return Ok(false);
        }

        apply_headers(request)?;
        *state = ParseState::AwaitingBody;
    }

    if *state == ParseState::AwaitingBody {
        let len = request.content_length;
        if buf.len() - *cursor < len {
            return Ok(false);
        }

        request.body = Bytes::copy_from_slice(&buf[*cursor..*cursor + len]);
        *cursor += len;
        *state = ParseState::Completed;
        return Ok(true);
    }

    Ok(false)
}

/// Derives the typed request fields from the finished header map.
fn apply_headers(request: &mut Request) -> Result<(), ParseError> {
    if let Some(encoding) = request.headers.get("transfer-encoding") {
        if !encoding.eq_ignore_ascii_case("identity") {
            return Err(ParseError::UnsupportedTransferEncoding(encoding.to_string()));
        }
    }

    request.content_length = match request.headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidContentLength)?,
        None => 0,
    };

    request.host = request.headers.get("host").map(str::to_string);
    request.content_type = request.headers.get("content-type").map(str::to_string);
    request.keep_alive =
        Request::resolve_keep_alive(&request.version, request.headers.get("connection"));

    let scheme = if request.is_secure { "https" } else { "http" };
    request.url = request.host.as_deref().and_then(|host| {
        Url::parse(&format!("{scheme}://{host}{}{}", request.path, request.query)).ok()
    });

    Ok(())
}

fn as_str(bytes: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidEncoding)
}
