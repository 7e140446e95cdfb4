//! Loopback-only access for the `/api` routes.
//!
//! The API holds the gateway credential and forwards calls with the operator's
//! scopes, so it only answers requests addressed to a loopback host, and only
//! browsers on a loopback origin may call it cross-origin.

use std::net::IpAddr;

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use tower_http::cors::{AllowOrigin, CorsLayer};
use url::{Host, Url};

use crate::error::{ApiError, Result};

/// Reject requests whose `Host` or `Origin` is not a loopback address.
pub async fn require_local(request: Request, next: Next) -> Result<Response> {
    check_local(request.headers())?;
    Ok(next.run(request).await)
}

fn check_local(headers: &HeaderMap) -> Result<()> {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    if !is_loopback_host(host) {
        tracing::warn!("Rejected API request for host '{}'", host);
        return Err(ApiError::Forbidden);
    }

    // Browsers send Origin on cross-site writes even when no preflight happens.
    if let Some(origin) = headers.get(header::ORIGIN) {
        if !is_loopback_origin(origin) {
            tracing::warn!("Rejected API request from origin {:?}", origin);
            return Err(ApiError::Forbidden);
        }
    }
    Ok(())
}

/// CORS policy admitting loopback origins only.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _| is_loopback_origin(origin)))
        .allow_methods([Method::GET, Method::PUT, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}

/// Whether a `Host` header value (with optional port) names this machine.
pub fn is_loopback_host(host: &str) -> bool {
    // Bare IPv6 without brackets or port
    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback();
    }
    match Url::parse(&format!("http://{}", host)) {
        Ok(url) => {
            url.path() == "/"
                && url.query().is_none()
                && url.fragment().is_none()
                && is_loopback_url(&url)
        }
        Err(_) => false,
    }
}

fn is_loopback_origin(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    match Url::parse(origin) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && is_loopback_url(&url),
        Err(_) => false,
    }
}

fn is_loopback_url(url: &Url) -> bool {
    if !url.username().is_empty() || url.password().is_some() {
        return false;
    }
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(host: &str, origin: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_str(host).unwrap());
        if let Some(origin) = origin {
            headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        }
        headers
    }

    #[test]
    fn test_local_hosts_allowed() {
        for host in [
            "localhost",
            "localhost:3000",
            "LOCALHOST:3000",
            "127.0.0.1",
            "127.0.0.1:3000",
            "::1",
            "[::1]",
            "[::1]:3000",
        ] {
            assert!(is_loopback_host(host), "{}", host);
        }
    }

    #[test]
    fn test_remote_hosts_forbidden() {
        for host in [
            "",
            "example.com",
            "10.0.0.5:3000",
            "localhost.attacker.example",
            "localhost.attacker.example:3000",
            "127.0.0.1.nip.io",
            "evil.localhost.example",
            "attacker@localhost",
            "localhost/evil",
            "localhost#evil",
            "localhost?evil",
        ] {
            assert!(!is_loopback_host(host), "{}", host);
        }
        assert!(matches!(
            check_local(&HeaderMap::new()),
            Err(ApiError::Forbidden)
        ));
    }

    #[test]
    fn test_origin_must_be_loopback() {
        assert!(check_local(&headers("localhost:3000", None)).is_ok());
        assert!(check_local(&headers("localhost:3000", Some("http://localhost:3000"))).is_ok());
        assert!(check_local(&headers("127.0.0.1:3000", Some("http://[::1]:5173"))).is_ok());

        for origin in [
            "https://evil.example",
            "http://localhost.attacker.example",
            "null",
            "file:///tmp/page.html",
        ] {
            assert!(
                check_local(&headers("localhost:3000", Some(origin))).is_err(),
                "{}",
                origin
            );
        }
    }
}
