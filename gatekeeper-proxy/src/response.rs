use gatekeeper_core::GatewayError;

/// Pre-built response for requests we could not even parse.
pub const RESP_400: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// Serialize a complete response with body: the framing headers come
/// first, then the caller's headers.
pub fn encode_response(buf: &mut Vec<u8>, status: u16, headers: &[(String, String)], body: &[u8]) {
    encode_stream_head_inner(buf, status, headers, Some(body.len()), false);
    buf.extend_from_slice(body);
}

/// Serialize a response head for a streamed body. An unknown length
/// switches the connection to close-delimited framing.
pub fn encode_stream_head(
    buf: &mut Vec<u8>,
    status: u16,
    headers: &[(String, String)],
    content_length: Option<usize>,
) {
    let close = content_length.is_none();
    encode_stream_head_inner(buf, status, headers, content_length, close);
}

/// Head for responses that carry no body by definition (204, 304, HEAD
/// without a length): no content-length, connection stays keep-alive.
pub fn encode_head_no_body(buf: &mut Vec<u8>, status: u16, headers: &[(String, String)]) {
    encode_stream_head_inner(buf, status, headers, None, false);
}

fn encode_stream_head_inner(
    buf: &mut Vec<u8>,
    status: u16,
    headers: &[(String, String)],
    content_length: Option<usize>,
    close: bool,
) {
    buf.clear();
    let mut itoa_buf = itoa::Buffer::new();
    buf.extend_from_slice(b"HTTP/1.1 ");
    buf.extend_from_slice(itoa_buf.format(status).as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(status_text(status).as_bytes());
    buf.extend_from_slice(b"\r\n");
    if let Some(len) = content_length {
        buf.extend_from_slice(b"content-length: ");
        buf.extend_from_slice(itoa_buf.format(len).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if close {
        buf.extend_from_slice(b"connection: close\r\n");
    } else {
        buf.extend_from_slice(b"connection: keep-alive\r\n");
    }
    for (k, v) in headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");
}

/// Standardized JSON error response: the error's status, its message,
/// and the request's trace id.
pub fn encode_error_response(buf: &mut Vec<u8>, err: &GatewayError, trace_id: &str) {
    let headers = vec![("content-type".to_string(), "application/json".to_string())];
    encode_response(buf, err.status_code(), &headers, &err.to_json_body(trace_id));
}
