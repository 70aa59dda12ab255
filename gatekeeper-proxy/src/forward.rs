use crate::response::{encode_head_no_body, encode_stream_head};
use gatekeeper_client::ServiceClient;
use gatekeeper_client::http::{encode_request_head, read_response_head};
use gatekeeper_core::GatewayError;
use gatekeeper_filter::ProxyContext;
use monoio::io::{AsyncReadRent, AsyncWriteRentExt};
use monoio::net::TcpStream;
use tracing::debug;

/// How the forwarder left the inbound connection.
#[derive(Debug)]
pub struct ForwardOutcome {
    pub status: u16,
    /// Close the inbound connection: either the response was
    /// close-delimited or the caller went away mid-stream.
    pub close_client: bool,
}

const HOP_BY_HOP: [&str; 4] = ["connection", "keep-alive", "transfer-encoding", "upgrade"];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

pub fn method_supported(method: &str) -> bool {
    matches!(method, "GET" | "PUT" | "POST" | "DELETE" | "HEAD" | "OPTIONS")
}

fn has_request_body(method: &str) -> bool {
    matches!(method, "PUT" | "POST")
}

/// Assemble the outbound request head: every inbound header with every
/// value in order, minus hop-by-hop headers (this gateway manages its own
/// connections) and minus inbound trace headers, which are rewritten:
/// exactly one gateway-originated set is injected.
pub fn build_forward_head(buf: &mut Vec<u8>, ctx: &ProxyContext, url: &str) {
    let propagation = ctx.trace.propagation_headers();
    let mut headers: Vec<(&str, &str)> =
        Vec::with_capacity(ctx.request.headers.len() + propagation.len());

    for (name, value) in &ctx.request.headers {
        if is_hop_by_hop(name) || ctx.trace.is_propagation_header(name) {
            continue;
        }
        headers.push((name.as_str(), value.as_str()));
    }
    for (name, value) in &propagation {
        headers.push((name.as_str(), value.as_str()));
    }

    encode_request_head(buf, &ctx.request.method, url, &headers, None);
}

/// Flatten backend response headers to the first value of each name,
/// dropping hop-by-hop headers and content-length (the gateway frames
/// the response itself). When the backend names no content type, the
/// inbound request's `Content-Type` is the default.
pub fn flatten_response_headers(
    backend_headers: &[(String, String)],
    inbound_content_type: Option<&str>,
) -> Vec<(String, String)> {
    let mut flattened: Vec<(String, String)> = Vec::with_capacity(backend_headers.len());
    for (name, value) in backend_headers {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        if flattened.iter().any(|(k, _)| k.eq_ignore_ascii_case(name)) {
            continue; // deliberate flattening: first value wins
        }
        flattened.push((name.clone(), value.clone()));
    }

    let has_content_type = flattened
        .iter()
        .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));
    if !has_content_type
        && let Some(ct) = inbound_content_type
        && !ct.is_empty()
    {
        flattened.push(("content-type".to_string(), ct.to_string()));
    }

    flattened
}

async fn write_client(conn: &mut TcpStream, data: Vec<u8>) -> bool {
    let (res, _) = conn.write_all(data).await;
    res.is_ok()
}

/// Forward the request to a discovered instance of the target service
/// and stream the backend's response back to the caller.
///
/// Errors are only returned before the first byte reaches the caller;
/// once the response head is out, every failure path ends with
/// `close_client` instead, so the response is never written twice. The
/// backend connection is released to the pool on reusable exits and
/// dropped (closing the socket) on all others.
pub async fn forward(
    client_conn: &mut TcpStream,
    ctx: &ProxyContext,
    service_client: &ServiceClient,
    initial_body: &[u8],
    content_length: usize,
) -> Result<ForwardOutcome, GatewayError> {
    let sp = ctx
        .service_path()
        .ok_or_else(|| GatewayError::Internal("service path not set".into()))?;
    let method = ctx.request.method.clone();

    if !method_supported(&method) {
        return Err(GatewayError::UnsupportedMethod(method));
    }

    let url = sp.relative_url(&ctx.request.raw_query);
    let mut backend = service_client.acquire(&sp.service_name).await?;
    debug!(service = %sp.service_name, addr = %backend.addr, url = %url, "Forwarding");

    // ── Request head + whatever body arrived with it ──
    let mut out = Vec::with_capacity(2048 + initial_body.len());
    build_forward_head(&mut out, ctx, &url);
    let streams_body = has_request_body(&method);
    if streams_body {
        out.extend_from_slice(initial_body);
    }
    service_client.send(&mut backend, out).await?;

    // ── Relay the rest of the inbound body without buffering ──
    if streams_body {
        let mut remaining = content_length.saturating_sub(initial_body.len());
        while remaining > 0 {
            let chunk = vec![0u8; remaining.min(64 * 1024)];
            let (res, chunk) = client_conn.read(chunk).await;
            let n = match res {
                Ok(0) => {
                    return Err(GatewayError::BackendTransport(
                        "caller closed mid request body".into(),
                    ));
                }
                Ok(n) => n,
                Err(e) => return Err(GatewayError::BackendTransport(e.to_string())),
            };
            remaining -= n;
            let (res, _) = backend.stream.write_all(chunk[..n].to_vec()).await;
            if let Err(e) = res {
                return Err(GatewayError::BackendTransport(e.to_string()));
            }
        }
    }

    // ── Backend response ──
    let (head, acc) = read_response_head(&mut backend.stream).await?;
    let status = head.status;
    let resp_headers =
        flatten_response_headers(&head.headers, ctx.request.header("content-type"));

    let no_body = method == "HEAD" || status == 204 || status == 304;

    let mut head_buf = Vec::with_capacity(1024);
    if no_body {
        // status and headers only; a HEAD response keeps the backend's
        // content-length without a body following it
        encode_stream_head_passthrough(&mut head_buf, status, &resp_headers, head.content_length);
        if !write_client(client_conn, head_buf).await {
            return Ok(ForwardOutcome { status, close_client: true });
        }
        // reusable only if the backend really sent nothing past the head
        if head.keep_alive && acc.len() == head.head_len {
            service_client.release(backend);
        }
        return Ok(ForwardOutcome { status, close_client: false });
    }

    match head.content_length {
        Some(total) => {
            encode_stream_head(&mut head_buf, status, &resp_headers, Some(total));
            if !write_client(client_conn, head_buf).await {
                return Ok(ForwardOutcome { status, close_client: true });
            }

            let first = &acc[head.head_len..];
            let first = &first[..first.len().min(total)];
            let mut sent = first.len();
            if !first.is_empty() && !write_client(client_conn, first.to_vec()).await {
                return Ok(ForwardOutcome { status, close_client: true });
            }

            while sent < total {
                let chunk = vec![0u8; (total - sent).min(64 * 1024)];
                let (res, chunk) = backend.stream.read(chunk).await;
                let n = match res {
                    Ok(0) | Err(_) => {
                        // truncated upstream body: the caller cannot be
                        // given a well-framed tail, drop both sides
                        return Ok(ForwardOutcome { status, close_client: true });
                    }
                    Ok(n) => n,
                };
                sent += n;
                if !write_client(client_conn, chunk[..n].to_vec()).await {
                    return Ok(ForwardOutcome { status, close_client: true });
                }
            }

            if head.keep_alive {
                service_client.release(backend);
            }
            Ok(ForwardOutcome { status, close_client: false })
        }
        None => {
            // unknown length: stream until the backend closes, then
            // close-delimit the inbound side too
            encode_stream_head(&mut head_buf, status, &resp_headers, None);
            if !write_client(client_conn, head_buf).await {
                return Ok(ForwardOutcome { status, close_client: true });
            }
            let first = acc[head.head_len..].to_vec();
            if !first.is_empty() && !write_client(client_conn, first).await {
                return Ok(ForwardOutcome { status, close_client: true });
            }

            let mut chunk = vec![0u8; 64 * 1024];
            loop {
                let (res, returned) = backend.stream.read(chunk).await;
                chunk = returned;
                match res {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if !write_client(client_conn, chunk[..n].to_vec()).await {
                            break;
                        }
                    }
                }
            }
            Ok(ForwardOutcome { status, close_client: true })
        }
    }
}

/// Head encoding for body-less responses: the backend's content-length
/// is passed through verbatim (a HEAD answer advertises the length of
/// the body it is not sending) and the connection stays keep-alive.
fn encode_stream_head_passthrough(
    buf: &mut Vec<u8>,
    status: u16,
    headers: &[(String, String)],
    content_length: Option<usize>,
) {
    match content_length {
        Some(len) => encode_stream_head(buf, status, headers, Some(len)),
        None => encode_head_no_body(buf, status, headers),
    }
}
