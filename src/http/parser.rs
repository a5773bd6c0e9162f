use crate::http::request::{Method, Request};
use std::collections::HashMap;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    Incomplete,
}

/// Parses one request head (request line and headers) from `buf`.
///
/// Returns the request descriptor and the number of bytes consumed,
/// including the blank line. Bodies are the transport's business and are
/// not read; a body following the head is left in the buffer.
pub fn parse_request_head(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let (headers_end, terminator) = find_headers_end(buf).ok_or(ParseError::Incomplete)?;

    let headers_str =
        std::str::from_utf8(&buf[..headers_end]).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.lines();

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if !version.starts_with("HTTP/") || parts.next().is_some() {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    // Headers
    let mut headers = HashMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;

        headers.insert(key.trim().to_string(), value.trim().to_string());
    }

    let request = Request {
        method,
        path: path.to_string(),
        headers,
    };

    Ok((request, headers_end + terminator))
}

/// Length of the first complete request head in `buf`, blank line
/// included. Lets callers skip a head that failed to parse.
pub fn head_len(buf: &[u8]) -> Option<usize> {
    find_headers_end(buf).map(|(end, terminator)| end + terminator)
}

/// Position of the blank line ending the head, and its length. Bare `\n`
/// line endings are tolerated so heads can be typed by hand.
fn find_headers_end(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n");
    let lf = buf.windows(2).position(|w| w == b"\n\n");

    match (crlf, lf) {
        (Some(c), Some(l)) if l < c => Some((l, 2)),
        (Some(c), _) => Some((c, 4)),
        (None, Some(l)) => Some((l, 2)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_request_head(req).unwrap();

        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.host(), "example.com");
        assert_eq!(consumed, req.len());
    }
}
