use gatekeeper_core::GatewayError;
use monoio::io::AsyncReadRent;
use monoio::net::TcpStream;

/// Largest response head we are willing to buffer before giving up.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Parsed head of a backend response. `head_len` is the offset where the
/// body starts in the buffer the head was parsed from.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub head_len: usize,
    pub content_length: Option<usize>,
    pub keep_alive: bool,
}

impl ResponseHead {
    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Serialize an upstream request head into `buf`. The connection is
/// always requested keep-alive; `content_length`, when given, overrides
/// whatever the header list carries.
pub fn encode_request_head(
    buf: &mut Vec<u8>,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    content_length: Option<usize>,
) {
    buf.clear();
    buf.extend_from_slice(method.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(path.as_bytes());
    buf.extend_from_slice(b" HTTP/1.1\r\n");
    for (name, value) in headers {
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"connection: keep-alive\r\n");
    if let Some(len) = content_length {
        buf.extend_from_slice(b"content-length: ");
        let mut itoa_buf = itoa::Buffer::new();
        buf.extend_from_slice(itoa_buf.format(len).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");
}

/// Try to parse a response head from `data`. `Ok(None)` means more bytes
/// are needed.
pub fn parse_response_head(data: &[u8]) -> Result<Option<ResponseHead>, GatewayError> {
    let mut raw_headers = [httparse::EMPTY_HEADER; 64];
    let mut resp = httparse::Response::new(&mut raw_headers);

    let head_len = match resp.parse(data) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => {
            return Err(GatewayError::BackendTransport(format!(
                "bad response head: {e}"
            )));
        }
    };

    let status = resp
        .code
        .ok_or_else(|| GatewayError::BackendTransport("response without status".into()))?;

    let mut headers = Vec::with_capacity(resp.headers.len());
    let mut content_length = None;
    let mut keep_alive = true;
    for h in resp.headers.iter() {
        if h.name.is_empty() {
            break;
        }
        let value = std::str::from_utf8(h.value).unwrap_or("").to_string();
        if h.name.eq_ignore_ascii_case("content-length") {
            content_length = value.trim().parse().ok();
        } else if h.name.eq_ignore_ascii_case("connection") {
            keep_alive = !value.eq_ignore_ascii_case("close");
        }
        headers.push((h.name.to_string(), value));
    }

    Ok(Some(ResponseHead {
        status,
        headers,
        head_len,
        content_length,
        keep_alive,
    }))
}

/// Read from `stream` until a complete response head is buffered.
///
/// Returns the head plus the accumulated bytes; anything past
/// `head.head_len` is the beginning of the body.
pub async fn read_response_head(
    stream: &mut TcpStream,
) -> Result<(ResponseHead, Vec<u8>), GatewayError> {
    let mut acc: Vec<u8> = Vec::with_capacity(8 * 1024);
    let mut chunk = vec![0u8; 16 * 1024];

    loop {
        let (res, returned) = stream.read(chunk).await;
        chunk = returned;
        let n = match res {
            Ok(0) => {
                return Err(GatewayError::BackendTransport(
                    "upstream closed connection before response head".into(),
                ));
            }
            Ok(n) => n,
            Err(e) => return Err(GatewayError::BackendTransport(e.to_string())),
        };
        acc.extend_from_slice(&chunk[..n]);

        if let Some(head) = parse_response_head(&acc)? {
            return Ok((head, acc));
        }
        if acc.len() > MAX_HEAD_BYTES {
            return Err(GatewayError::BackendTransport(
                "response head exceeds limit".into(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_minimal_get() {
        let mut buf = Vec::new();
        encode_request_head(&mut buf, "GET", "/api", &[], None);
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("GET /api HTTP/1.1\r\n"));
        assert!(text.contains("connection: keep-alive\r\n"));
        assert!(!text.contains("content-length"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn encode_with_headers_and_length() {
        let mut buf = Vec::new();
        encode_request_head(
            &mut buf,
            "POST",
            "/remote/path/resource/access-test",
            &[("content-type", "application/json"), ("x-b3-traceid", "abc")],
            Some(17),
        );
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("content-type: application/json\r\n"));
        assert!(text.contains("x-b3-traceid: abc\r\n"));
        assert!(text.contains("content-length: 17\r\n"));
    }

    #[test]
    fn parse_complete_head() {
        let raw = b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 5\r\n\r\nhello";
        let head = parse_response_head(raw).unwrap().expect("complete head");
        assert_eq!(head.status, 200);
        assert_eq!(head.content_length, Some(5));
        assert!(head.keep_alive);
        assert_eq!(head.header("Content-Type"), Some("text/plain"));
        assert_eq!(&raw[head.head_len..], b"hello");
    }

    #[test]
    fn parse_partial_head_needs_more() {
        let raw = b"HTTP/1.1 200 OK\r\ncontent-le";
        assert!(parse_response_head(raw).unwrap().is_none());
    }

    #[test]
    fn parse_connection_close() {
        let raw = b"HTTP/1.1 502 Bad Gateway\r\nconnection: close\r\n\r\n";
        let head = parse_response_head(raw).unwrap().unwrap();
        assert_eq!(head.status, 502);
        assert!(!head.keep_alive);
        assert_eq!(head.content_length, None);
    }

    #[test]
    fn parse_garbage_is_an_error() {
        let raw = b"\x00\x01\x02 nope\r\n\r\n";
        assert!(parse_response_head(raw).is_err());
    }

    #[test]
    fn duplicate_headers_are_all_kept() {
        let raw = b"HTTP/1.1 200 OK\r\nset-cookie: a=1\r\nset-cookie: b=2\r\n\r\n";
        let head = parse_response_head(raw).unwrap().unwrap();
        let cookies: Vec<&str> = head
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("set-cookie"))
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        // first-value accessor sees the first occurrence
        assert_eq!(head.header("set-cookie"), Some("a=1"));
    }
}
