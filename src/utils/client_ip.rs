// Client identity for rate limiting
// Proxied deployments present the caller in X-Forwarded-For

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Resolve the client identity: first hop of X-Forwarded-For when present,
/// otherwise the peer address
pub fn client_ip(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_peer_address_without_forwarding() {
        let headers = HeaderMap::new();
        let addr: SocketAddr = "192.168.1.100:4321".parse().unwrap();
        assert_eq!(client_ip(&headers, &addr), "192.168.1.100");
    }

    #[test]
    fn test_forwarded_for_first_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let addr: SocketAddr = "10.0.0.2:4321".parse().unwrap();
        assert_eq!(client_ip(&headers, &addr), "203.0.113.7");
    }
}
