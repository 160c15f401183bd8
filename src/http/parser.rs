use crate::http::body::Body;
use crate::http::request::{Method, Request};
use std::collections::HashMap;

/// Upper bound on the size of a request head.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    HeadTooLarge,
    UnsupportedTransferEncoding,
    Incomplete,
}

/// Parses the request line and headers at the start of `buf`.
///
/// Returns the request with an empty body and the number of bytes the head
/// occupied. The body, framed by `Content-Length`, is left in the buffer for
/// the connection to stream to the handler.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    // Look for header/body separator
    let headers_end = match find_headers_end(buf) {
        Some(end) => end,
        None if buf.len() > MAX_HEAD_SIZE => return Err(ParseError::HeadTooLarge),
        None => return Err(ParseError::Incomplete),
    };
    let header_bytes = &buf[..headers_end];

    let headers_str = std::str::from_utf8(header_bytes)
        .map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    // Headers
    let mut headers = HashMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or(ParseError::InvalidHeader)?;

        headers.insert(
           key.trim().to_string(),
           value.trim().to_string(),
        );
    }

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body: Body::Empty,
    };

    // A body in any other coding cannot be framed, and must not read as empty
    if request.header("Transfer-Encoding").is_some() && !request.is_chunked() {
        return Err(ParseError::UnsupportedTransferEncoding);
    }

    // Reject unparseable lengths here rather than letting them read as zero
    if let Some(value) = request.header("Content-Length") {
        value
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidContentLength)?;
    }

    Ok((request, headers_end + 4))
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn body_is_left_in_the_buffer() {
        let req = b"PUT /a.txt HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi";

        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.content_length(), 2);
        assert_eq!(&req[consumed..], b"hi");
    }
}
