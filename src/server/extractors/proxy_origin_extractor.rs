use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header::HOST, request::Parts};
use tracing::debug;

use crate::server::services::AppServices;
use crate::server::utils::manifest_rewriter::ProxyOrigin;

/// works out how the player reached us so rewritten manifests point back at the same place.
///
/// host is X-Forwarded-Host, then Host, then localhost on the configured port. loopback hosts are
/// always plain http, anything else uses X-Forwarded-Proto and https when that's missing since
/// public deployments sit behind a tls terminating proxy
impl<S> FromRequestParts<S> for ProxyOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let fallback_host = match parts.extensions.get::<AppServices>() {
            Some(services) => format!("localhost:{}", services.config.port),
            None => "localhost".to_string(),
        };

        let origin = origin_from_headers(&parts.headers, &fallback_host);
        debug!("proxy origin {}://{}", origin.scheme, origin.host);

        Ok(origin)
    }
}

fn first_header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

pub fn origin_from_headers(headers: &HeaderMap, fallback_host: &str) -> ProxyOrigin {
    let host = first_header_value(headers, "x-forwarded-host")
        .or_else(|| first_header_value(headers, HOST.as_str()))
        .unwrap_or(fallback_host);

    let scheme = if is_loopback(host) {
        "http"
    } else {
        first_header_value(headers, "x-forwarded-proto").unwrap_or("https")
    };

    ProxyOrigin::new(scheme, host)
}

fn is_loopback(host: &str) -> bool {
    // drop the port, keeping ipv6 brackets intact
    let hostname = if host.starts_with('[') {
        host.split_once(']').map_or(host, |(address, _)| address)
    } else {
        host.split(':').next().unwrap_or(host)
    };
    let hostname = hostname.trim_start_matches('[').to_ascii_lowercase();

    hostname == "localhost"
        || hostname.ends_with(".localhost")
        || hostname.starts_with("127.")
        || hostname == "0.0.0.0"
        || hostname == "::1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn loopback_hosts_are_http_even_when_forwarded_proto_says_otherwise() {
        let origin = origin_from_headers(
            &headers(&[("host", "localhost:3000"), ("x-forwarded-proto", "https")]),
            "unused",
        );
        assert_eq!(origin, ProxyOrigin::new("http", "localhost:3000"));

        assert!(is_loopback("127.0.0.1:8080"));
        assert!(is_loopback("[::1]:3000"));
        assert!(is_loopback("0.0.0.0"));
        assert!(!is_loopback("relay.example.com"));
        assert!(!is_loopback("localhost.evil.com"));
    }

    #[test]
    fn public_hosts_use_forwarded_proto_or_default_to_https() {
        let forwarded = origin_from_headers(
            &headers(&[("host", "relay.example.com"), ("x-forwarded-proto", "http, https")]),
            "unused",
        );
        assert_eq!(forwarded, ProxyOrigin::new("http", "relay.example.com"));

        let bare = origin_from_headers(&headers(&[("host", "relay.example.com")]), "unused");
        assert_eq!(bare, ProxyOrigin::new("https", "relay.example.com"));
    }

    #[test]
    fn forwarded_host_wins_and_fallback_is_used_without_any_host() {
        let origin = origin_from_headers(
            &headers(&[("host", "10.0.0.5:3000"), ("x-forwarded-host", "tv.example.org")]),
            "unused",
        );
        assert_eq!(origin, ProxyOrigin::new("https", "tv.example.org"));

        let fallback = origin_from_headers(&HeaderMap::new(), "localhost:3000");
        assert_eq!(fallback, ProxyOrigin::new("http", "localhost:3000"));
    }
}
