//! Minimal HTTP/1.1 framing — strict parser, single-write replies.
//!
//! The parser is deliberately narrow: `\r\n` line endings, exact
//! `Content-Length` header name, no chunked transfer, no pipelining, no
//! percent-decoding.  A parsed [`HttpMessage`] borrows every field from the
//! caller's receive buffer; nothing is copied out of it.
//!
//! Framing rule: a message is [`Parse::Ready`] once the `\r\n\r\n` header
//! terminator has been seen *and* the body holds the declared
//! `Content-Length` bytes (absent header ⇒ 0).

use std::str;

/// Initial receive-buffer size; also the growth margin added on top of a
/// declared `Content-Length`.
pub const MAX_HEADER_SIZE: usize = 2048;

/// Upper bound on header count a request may carry.
pub const MAX_HEADERS: usize = 40;

pub const LINE_DELIM:    &str = "\r\n";
pub const HDR_END_DELIM: &str = "\r\n\r\n";
pub const PROTOCOL:      &str = "HTTP/1.1";

pub const STATUS_OK:        &str = "200 OK";
pub const STATUS_FOUND:     &str = "302 Found";
pub const STATUS_NOT_FOUND: &str = "404 Not Found";
pub const STATUS_ERROR:     &str = "500 Internal Server Error";

/// One parsed request.  All fields borrow from the receive buffer.
#[derive(Debug)]
pub struct HttpMessage<'a> {
    pub method:  &'a str,
    pub uri:     &'a str,
    pub headers: Vec<(&'a str, &'a str)>,
    pub body:    &'a [u8],
}

impl HttpMessage<'_> {
    /// Does the request URI start with `prefix`?
    pub fn match_uri(&self, prefix: &str) -> bool {
        self.uri.starts_with(prefix)
    }

    /// Exact method comparison.
    pub fn match_verb(&self, verb: &str) -> bool {
        self.method == verb
    }
}

/// Outcome of a parse attempt over the bytes accumulated so far.
#[derive(Debug)]
pub enum Parse<'a> {
    /// Not a complete message yet.  `content_len` is reported as soon as
    /// the headers are complete, so the caller can size its buffer.
    NeedMore { content_len: Option<usize> },
    Ready(HttpMessage<'a>),
    Malformed,
}

/// Parse the accumulated bytes of one request.
pub fn parse(buf: &[u8]) -> Parse<'_> {
    let Some(head_len) = find(buf, HDR_END_DELIM.as_bytes()) else {
        return Parse::NeedMore { content_len: None };
    };
    let Ok(head) = str::from_utf8(&buf[..head_len]) else {
        return Parse::Malformed;
    };

    let mut lines = head.split(LINE_DELIM);
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.splitn(3, ' ');
    let (Some(method), Some(uri), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Parse::Malformed;
    };
    if method.is_empty() || uri.is_empty() || version != PROTOCOL {
        return Parse::Malformed;
    }

    let mut headers = Vec::new();
    for line in lines {
        let Some((key, value)) = line.split_once(": ") else {
            return Parse::Malformed;
        };
        if headers.len() == MAX_HEADERS {
            return Parse::Malformed;
        }
        headers.push((key, value));
    }

    let mut content_len = 0usize;
    for &(key, value) in &headers {
        if key == "Content-Length" {
            match value.parse() {
                Ok(n) => content_len = n,
                Err(_) => return Parse::Malformed,
            }
        }
    }

    let body_start = head_len + HDR_END_DELIM.len();
    if buf.len() < body_start + content_len {
        return Parse::NeedMore { content_len: Some(content_len) };
    }

    Parse::Ready(HttpMessage {
        method,
        uri,
        headers,
        body: &buf[body_start..body_start + content_len],
    })
}

/// Value of query variable `name` in `uri`, if present.  The value is the
/// raw slice up to the next `&`; no percent-decoding is performed.
pub fn get_var<'a>(uri: &'a str, name: &str) -> Option<&'a str> {
    let (_, query) = uri.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|&(key, _)| key == name)
        .map(|(_, value)| value)
}

/// Build a complete response, ready to go out in a single write:
/// `"HTTP/1.1 <status>\r\n<extra_headers>Content-Length: <n>\r\n\r\n<body>"`.
/// Each line of `extra_headers` must carry its own trailing `\r\n`.
pub fn build_reply(status: &str, extra_headers: &str, body: &[u8]) -> Vec<u8> {
    let head = format!(
        "{PROTOCOL} {status}{LINE_DELIM}{extra_headers}Content-Length: {}{HDR_END_DELIM}",
        body.len()
    );
    let mut out = Vec::with_capacity(head.len() + body.len());
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(body);
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_headers_need_more() {
        assert!(matches!(
            parse(b"GET /imgfs/list HTTP/1.1\r\nHost: x"),
            Parse::NeedMore { content_len: None }
        ));
    }

    #[test]
    fn get_without_body_is_ready() {
        let buf = b"GET /imgfs/list HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let Parse::Ready(msg) = parse(buf) else { panic!("expected Ready") };
        assert_eq!(msg.method, "GET");
        assert_eq!(msg.uri, "/imgfs/list");
        assert_eq!(msg.headers, vec![("Host", "localhost")]);
        assert!(msg.body.is_empty());
    }

    #[test]
    fn body_accumulates_to_content_length() {
        let buf = b"POST /imgfs/insert?name=x HTTP/1.1\r\nContent-Length: 5\r\n\r\nabc";
        assert!(matches!(parse(buf), Parse::NeedMore { content_len: Some(5) }));

        let buf = b"POST /imgfs/insert?name=x HTTP/1.1\r\nContent-Length: 5\r\n\r\nabcde";
        let Parse::Ready(msg) = parse(buf) else { panic!("expected Ready") };
        assert_eq!(msg.body, b"abcde");
    }

    #[test]
    fn trailing_pipelined_bytes_are_ignored() {
        let buf = b"POST /x HTTP/1.1\r\nContent-Length: 2\r\n\r\nabEXTRA";
        let Parse::Ready(msg) = parse(buf) else { panic!("expected Ready") };
        assert_eq!(msg.body, b"ab");
    }

    #[test]
    fn malformed_requests() {
        assert!(matches!(parse(b"GARBAGE\r\n\r\n"), Parse::Malformed));
        assert!(matches!(parse(b"GET /x HTTP/1.0\r\n\r\n"), Parse::Malformed));
        assert!(matches!(
            parse(b"GET /x HTTP/1.1\r\nContent-Length: ten\r\n\r\n"),
            Parse::Malformed
        ));
        assert!(matches!(
            parse(b"GET /x HTTP/1.1\r\nNoColonHere\r\n\r\n"),
            Parse::Malformed
        ));
    }

    #[test]
    fn query_vars() {
        let uri = "/imgfs/read?res=small&img_id=pic1";
        assert_eq!(get_var(uri, "res"), Some("small"));
        assert_eq!(get_var(uri, "img_id"), Some("pic1"));
        assert_eq!(get_var(uri, "name"), None);
        assert_eq!(get_var("/imgfs/list", "res"), None);
        // Exact key match only — "res" must not match inside "xres".
        assert_eq!(get_var("/p?xres=1", "res"), None);
        assert_eq!(get_var("/p?res=", "res"), Some(""));
    }

    #[test]
    fn reply_layout() {
        let reply = build_reply(STATUS_OK, "Content-Type: application/json\r\n", b"{}");
        assert_eq!(
            reply,
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n{}"
        );
    }

    #[test]
    fn reply_without_extra_headers() {
        let reply = build_reply(STATUS_ERROR, "", b"Error: ImageNotFound\n");
        let text = String::from_utf8(reply).unwrap();
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\nContent-Length: 21\r\n\r\n"));
    }
}
