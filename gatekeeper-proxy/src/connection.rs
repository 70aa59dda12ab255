use crate::forward::forward;
use crate::response::{RESP_400, encode_error_response, encode_response};
use crate::worker::WorkerContext;
use gatekeeper_core::{GatewayError, ServicePath, TraceContext};
use gatekeeper_filter::{InboundRequest, PipelineOutcome, ProxyContext, run_filters};
use gatekeeper_observability::metrics::EXPOSITION_CONTENT_TYPE;
use gatekeeper_observability::request_log;
use monoio::io::{AsyncReadRent, AsyncWriteRentExt};
use monoio::net::TcpStream;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Instant;

/// Largest request head we accept before answering 400.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Parsed inbound request head. `head_len` is the offset where the body
/// starts in the accumulated buffer.
#[derive(Debug)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub raw_query: String,
    pub headers: Vec<(String, String)>,
    pub head_len: usize,
    pub keep_alive: bool,
    pub content_length: usize,
}

/// Try to parse a request head from `data`. `Ok(None)` means more bytes
/// are needed.
pub fn parse_request_head(data: &[u8]) -> Result<Option<RequestHead>, GatewayError> {
    let mut raw_headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut raw_headers);

    let head_len = match req.parse(data) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(GatewayError::Internal(format!("bad request head: {e}"))),
    };

    let method = req.method.unwrap_or("GET").to_string();
    let target = req.path.unwrap_or("/");
    let (path, raw_query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (target.to_string(), String::new()),
    };

    let mut headers = Vec::with_capacity(req.headers.len());
    let mut keep_alive = true;
    let mut content_length = 0usize;
    for h in req.headers.iter() {
        if h.name.is_empty() {
            break;
        }
        let value = std::str::from_utf8(h.value).unwrap_or("").to_string();
        if h.name.eq_ignore_ascii_case("connection") {
            keep_alive = !value.eq_ignore_ascii_case("close");
        } else if h.name.eq_ignore_ascii_case("content-length") {
            content_length = value.trim().parse().unwrap_or(0);
        }
        headers.push((h.name.to_string(), value));
    }

    Ok(Some(RequestHead {
        method,
        path,
        raw_query,
        headers,
        head_len,
        keep_alive,
        content_length,
    }))
}

async fn write_client(conn: &mut TcpStream, data: Vec<u8>) -> bool {
    let (res, _) = conn.write_all(data).await;
    res.is_ok()
}

/// Handle a single inbound connection (HTTP/1.1 with keepalive).
///
/// Wrapper order per request, outermost first: health short-circuit,
/// metrics endpoint, then the timed pipeline (route → filters →
/// forward). Terminal states are mutually exclusive; every branch writes
/// the response exactly once.
pub async fn handle_connection(
    mut client: TcpStream,
    peer_addr: SocketAddr,
    worker: Rc<WorkerContext>,
) -> anyhow::Result<()> {
    let client_ip = peer_addr.ip().to_string();
    let config = &worker.shared.config;
    let metrics = &worker.shared.metrics;

    let mut acc: Vec<u8> = Vec::with_capacity(8 * 1024);
    let mut chunk = vec![0u8; 16 * 1024];
    let mut resp_buf = Vec::with_capacity(4 * 1024);

    loop {
        // ── Accumulate one request head ──
        acc.clear();
        let head = loop {
            let (res, returned) = client.read(chunk).await;
            chunk = returned;
            let n = match res {
                Ok(0) => return Ok(()), // caller went away
                Ok(n) => n,
                Err(e) => return Err(e.into()),
            };
            acc.extend_from_slice(&chunk[..n]);

            match parse_request_head(&acc) {
                Ok(Some(head)) => break head,
                Ok(None) if acc.len() <= MAX_HEAD_BYTES => continue,
                Ok(None) | Err(_) => {
                    let _ = write_client(&mut client, RESP_400.to_vec()).await;
                    return Ok(());
                }
            }
        };

        // ── Health short-circuit: no filters, no metrics, no log ──
        if let Some(health) = config.health.check_url.as_deref()
            && !health.is_empty()
            && head.path == health
        {
            encode_response(&mut resp_buf, 200, &[], b"");
            if !write_client(&mut client, resp_buf.clone()).await || !head.keep_alive {
                return Ok(());
            }
            continue;
        }

        // ── Metrics endpoint ──
        if let Some(route) = config.metrics.route.as_deref()
            && !route.is_empty()
            && head.path == route
        {
            if config.metrics.enabled {
                let body = metrics.gather_text();
                let headers = vec![(
                    "content-type".to_string(),
                    EXPOSITION_CONTENT_TYPE.to_string(),
                )];
                encode_response(&mut resp_buf, 200, &headers, body.as_bytes());
            } else {
                encode_error_response(&mut resp_buf, &GatewayError::PathNotFound, "");
            }
            if !write_client(&mut client, resp_buf.clone()).await || !head.keep_alive {
                return Ok(());
            }
            continue;
        }

        // ── Timed pipeline ──
        let start = Instant::now();
        let trace = TraceContext::root();
        let keep_alive = head.keep_alive;
        // body bytes still sitting in the socket poison the next
        // keep-alive request unless the forwarder drains them
        let leftover_body =
            head.content_length > acc.len().saturating_sub(head.head_len);

        let (status, close, final_trace) = match ServicePath::parse(&head.path) {
            Err(e) => {
                // bad path: the pipeline never runs
                encode_error_response(&mut resp_buf, &e, trace.trace_id());
                if !write_client(&mut client, resp_buf.clone()).await {
                    return Ok(());
                }
                (e.status_code(), leftover_body, trace)
            }
            Ok(sp) => {
                let request = InboundRequest {
                    method: head.method.clone(),
                    path: head.path.clone(),
                    raw_query: head.raw_query.clone(),
                    headers: head.headers,
                };
                let mut ctx = ProxyContext::new(trace, request, Rc::clone(&worker.access));
                ctx.set_service_path(sp);

                let filters = worker.shared.filters.snapshot();
                match run_filters(&filters, &mut ctx).await {
                    PipelineOutcome::Respond(resp) => {
                        encode_response(&mut resp_buf, resp.status, &resp.headers, &resp.body);
                        if !write_client(&mut client, resp_buf.clone()).await {
                            return Ok(());
                        }
                        (resp.status, leftover_body, ctx.trace)
                    }
                    PipelineOutcome::Fail(e) => {
                        encode_error_response(&mut resp_buf, &e, ctx.trace.trace_id());
                        if !write_client(&mut client, resp_buf.clone()).await {
                            return Ok(());
                        }
                        (e.status_code(), leftover_body, ctx.trace)
                    }
                    PipelineOutcome::Forward => {
                        let body_end = acc
                            .len()
                            .min(head.head_len + head.content_length);
                        let initial_body = &acc[head.head_len..body_end];

                        match forward(
                            &mut client,
                            &ctx,
                            &worker.client,
                            initial_body,
                            head.content_length,
                        )
                        .await
                        {
                            // a declared body on a body-less method is
                            // never drained, so leftover bytes force a
                            // close here too
                            Ok(out) => (out.status, out.close_client || leftover_body, ctx.trace),
                            Err(e) => {
                                encode_error_response(&mut resp_buf, &e, ctx.trace.trace_id());
                                if !write_client(&mut client, resp_buf.clone()).await {
                                    return Ok(());
                                }
                                (e.status_code(), leftover_body, ctx.trace)
                            }
                        }
                    }
                }
            }
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        if config.metrics.enabled {
            metrics.record_request(&head.path, &head.method, status, elapsed_ms);
        }
        request_log::log_request(
            &final_trace,
            &head.method,
            &head.path,
            status,
            elapsed_ms,
            &client_ip,
        );

        if close || !keep_alive {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let raw = b"GET /user-svc/api/profile?debug=1 HTTP/1.1\r\nHost: gw\r\nAccept: */*\r\n\r\n";
        let head = parse_request_head(raw).unwrap().expect("complete");
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/user-svc/api/profile");
        assert_eq!(head.raw_query, "debug=1");
        assert_eq!(head.content_length, 0);
        assert!(head.keep_alive);
        assert_eq!(head.head_len, raw.len());
    }

    #[test]
    fn parses_post_with_body_prefix() {
        let raw = b"POST /orders/create HTTP/1.1\r\nContent-Length: 11\r\n\r\n{\"a\":1}";
        let head = parse_request_head(raw).unwrap().unwrap();
        assert_eq!(head.method, "POST");
        assert_eq!(head.content_length, 11);
        assert_eq!(&raw[head.head_len..], b"{\"a\":1}");
    }

    #[test]
    fn header_case_and_order_are_preserved() {
        let raw = b"GET /s/a HTTP/1.1\r\nX-Tag: one\r\nx-tag: two\r\nAuthorization: Bearer t\r\n\r\n";
        let head = parse_request_head(raw).unwrap().unwrap();
        assert_eq!(
            head.headers,
            vec![
                ("X-Tag".to_string(), "one".to_string()),
                ("x-tag".to_string(), "two".to_string()),
                ("Authorization".to_string(), "Bearer t".to_string()),
            ]
        );
    }

    #[test]
    fn connection_close_is_detected() {
        let raw = b"GET /s/a HTTP/1.1\r\nConnection: close\r\n\r\n";
        let head = parse_request_head(raw).unwrap().unwrap();
        assert!(!head.keep_alive);
    }

    #[test]
    fn partial_head_needs_more_bytes() {
        let raw = b"GET /s/a HTTP/1.1\r\nHos";
        assert!(parse_request_head(raw).unwrap().is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_request_head(b"\x01\x02\x03\r\n\r\n").is_err());
    }

    #[test]
    fn path_without_query_has_empty_raw_query() {
        let raw = b"DELETE /svc/x HTTP/1.1\r\n\r\n";
        let head = parse_request_head(raw).unwrap().unwrap();
        assert_eq!(head.path, "/svc/x");
        assert_eq!(head.raw_query, "");
    }
}
