use monoio::net::TcpStream;
use std::net::SocketAddr;

/// Resolve an `addr` string (e.g. `"orders.internal:3001"`) to a list of
/// `SocketAddr`s.
///
/// Resolution goes through std's blocking `ToSocketAddrs`; it only runs
/// when the connection pool has nothing for the address (startup, first
/// request, or after an upstream failure), never on the steady-state hot
/// path. Candidates are sorted IPv4-first: most upstream servers listen
/// on IPv4 only, and trying `::1` first yields spurious connection
/// refusals for `localhost`.
pub fn resolve_addrs(addr: &str) -> Vec<SocketAddr> {
    // Fast path: already an IP:port literal
    if let Ok(sa) = addr.parse::<SocketAddr>() {
        return vec![sa];
    }
    use std::net::ToSocketAddrs;
    let all: Vec<SocketAddr> = match addr.to_socket_addrs() {
        Ok(iter) => iter.collect(),
        Err(_) => return vec![],
    };
    let mut v4: Vec<SocketAddr> = all.iter().copied().filter(|a| a.is_ipv4()).collect();
    let v6: Vec<SocketAddr> = all.iter().copied().filter(|a| a.is_ipv6()).collect();
    v4.extend(v6);
    v4
}

/// Open a new TCP connection to `addr`, trying all resolved addresses
/// (IPv4-first) and returning the first that succeeds.
pub async fn dial(addr: &str) -> Option<TcpStream> {
    let candidates = resolve_addrs(addr);
    if candidates.is_empty() {
        tracing::warn!(addr = %addr, "Upstream address resolve failed");
        return None;
    }
    for sa in &candidates {
        match TcpStream::connect(*sa).await {
            Ok(s) => {
                let _ = s.set_nodelay(true);
                tracing::debug!(addr = %addr, resolved = %sa, "Upstream connected");
                return Some(s);
            }
            Err(e) => {
                tracing::debug!(addr = %addr, resolved = %sa, error = %e, "Upstream candidate failed, trying next");
            }
        }
    }
    tracing::warn!(addr = %addr, tried = candidates.len(), "Upstream connect failed on all candidates");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_literal_resolves_without_lookup() {
        let addrs = resolve_addrs("127.0.0.1:8080");
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].port(), 8080);
        assert!(addrs[0].is_ipv4());
    }

    #[test]
    fn ipv6_literal_resolves() {
        let addrs = resolve_addrs("[::1]:9090");
        assert_eq!(addrs.len(), 1);
        assert!(addrs[0].is_ipv6());
    }

    #[test]
    fn garbage_address_resolves_to_nothing() {
        assert!(resolve_addrs("not an address").is_empty());
    }

    #[test]
    fn hostname_candidates_are_ipv4_first() {
        let addrs = resolve_addrs("localhost:1234");
        // localhost may resolve to ::1 and 127.0.0.1 depending on the
        // host; whatever came back, IPv4 entries must lead.
        let first_v6 = addrs.iter().position(|a| a.is_ipv6());
        let last_v4 = addrs.iter().rposition(|a| a.is_ipv4());
        if let (Some(v6), Some(v4)) = (first_v6, last_v4) {
            assert!(v4 < v6, "IPv4 candidates must sort before IPv6");
        }
    }
}
