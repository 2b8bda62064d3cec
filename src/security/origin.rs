//! Origin and Host validation (DNS-rebinding defense).
//!
//! # Rules
//! - Empty allow-list rejects everything
//! - A present `Origin` must appear verbatim in the allow-list
//! - A missing `Host` is always rejected
//! - `Host` must match the expected host; loopback names match each other
//!   ignoring port
//!
//! # Design Decisions
//! - Host comparison is ASCII case-insensitive
//! - Origin comparison is exact; no normalization, no wildcards

use axum::http::{header, HeaderMap, HeaderName};
use thiserror::Error;

use crate::config::OriginConfig;

const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// Why a request was rejected. Logged, never returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginRejection {
    #[error("no origins configured")]
    NoAllowedOrigins,
    #[error("origin '{0}' not allowed")]
    OriginNotAllowed(String),
    #[error("missing host header")]
    MissingHost,
    #[error("{0} header is not valid UTF-8")]
    UndecodableHeader(&'static str),
    #[error("host '{received}' does not match '{expected}'")]
    HostMismatch { expected: String, received: String },
}

/// Accept/reject policy built from [`OriginConfig`].
#[derive(Debug, Clone, Default)]
pub struct OriginGuard {
    allowed_origins: Vec<String>,
    expected_host: Option<String>,
}

impl OriginGuard {
    pub fn new(allowed_origins: Vec<String>, expected_host: Option<String>) -> Self {
        Self {
            allowed_origins,
            expected_host,
        }
    }

    pub fn from_config(config: &OriginConfig) -> Self {
        Self::new(config.allowed_origins.clone(), config.expected_host.clone())
    }

    /// Check a request's headers.
    ///
    /// `authority` is the request's own URI authority, used as the expected
    /// host when none is configured.
    pub fn check(
        &self,
        origin: Option<&str>,
        host: Option<&str>,
        authority: Option<&str>,
    ) -> Result<(), OriginRejection> {
        if self.allowed_origins.is_empty() {
            return Err(OriginRejection::NoAllowedOrigins);
        }

        if let Some(origin) = origin {
            if !self.is_allowed_origin(origin) {
                return Err(OriginRejection::OriginNotAllowed(origin.to_string()));
            }
        }

        let host = match host {
            Some(h) if !h.trim().is_empty() => h.trim(),
            _ => return Err(OriginRejection::MissingHost),
        };

        let expected = self.expected_host.as_deref().or(authority).unwrap_or(host);
        if hosts_match(expected, host) {
            Ok(())
        } else {
            Err(OriginRejection::HostMismatch {
                expected: expected.to_string(),
                received: host.to_string(),
            })
        }
    }

    /// Check `Origin` and `Host` straight from the request headers and return
    /// the origin to reflect. A header that is present but not UTF-8 is
    /// rejected rather than treated as absent.
    pub fn check_headers<'h>(
        &self,
        headers: &'h HeaderMap,
        authority: Option<&str>,
    ) -> Result<Option<&'h str>, OriginRejection> {
        let origin = decode(headers, header::ORIGIN, "origin")?;
        let host = decode(headers, header::HOST, "host")?;
        self.check(origin, host, authority)?;
        Ok(origin)
    }

    /// Whether `origin` is allowed verbatim. Used for CORS reflection.
    pub fn is_allowed_origin(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }
}

fn hosts_match(expected: &str, received: &str) -> bool {
    if expected.eq_ignore_ascii_case(received) {
        return true;
    }
    let expected_name = host_name(expected);
    let received_name = host_name(received);
    is_loopback(&expected_name) && is_loopback(&received_name)
}

fn decode<'h>(
    headers: &'h HeaderMap,
    name: HeaderName,
    label: &'static str,
) -> Result<Option<&'h str>, OriginRejection> {
    headers
        .get(name)
        .map(|v| v.to_str().map_err(|_| OriginRejection::UndecodableHeader(label)))
        .transpose()
}

/// Strip an optional port, keeping IPv6 literals intact.
fn host_name(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or_default().to_string();
    }
    match host.rsplit_once(':') {
        // a bare IPv6 literal has more than one colon
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name.to_string()
        }
        _ => host.clone(),
    }
}

fn is_loopback(name: &str) -> bool {
    LOOPBACK_HOSTS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(expected_host: Option<&str>) -> OriginGuard {
        OriginGuard::new(
            vec!["https://app.example.com".into(), "http://localhost:3000".into()],
            expected_host.map(str::to_string),
        )
    }

    #[test]
    fn test_empty_allow_list_rejects_everything() {
        let guard = OriginGuard::new(vec![], Some("api.example.com".into()));
        assert_eq!(
            guard.check(Some("https://app.example.com"), Some("api.example.com"), None),
            Err(OriginRejection::NoAllowedOrigins)
        );
        assert_eq!(
            guard.check(None, Some("api.example.com"), None),
            Err(OriginRejection::NoAllowedOrigins)
        );
    }

    #[test]
    fn test_origin_must_match_verbatim() {
        let g = guard(Some("api.example.com"));
        assert!(g.check(Some("https://app.example.com"), Some("api.example.com"), None).is_ok());
        assert!(matches!(
            g.check(Some("https://app.example.com/"), Some("api.example.com"), None),
            Err(OriginRejection::OriginNotAllowed(_))
        ));
        assert!(matches!(
            g.check(Some("https://evil.example"), Some("api.example.com"), None),
            Err(OriginRejection::OriginNotAllowed(_))
        ));
        // non-browser clients send no origin
        assert!(g.check(None, Some("api.example.com"), None).is_ok());
    }

    #[test]
    fn test_missing_host_is_rejected() {
        let g = guard(None);
        assert_eq!(
            g.check(Some("https://app.example.com"), None, None),
            Err(OriginRejection::MissingHost)
        );
    }

    #[test]
    fn test_matching_origin_with_foreign_host_is_rejected() {
        let g = guard(Some("api.example.com"));
        assert!(matches!(
            g.check(Some("https://app.example.com"), Some("attacker.example"), None),
            Err(OriginRejection::HostMismatch { .. })
        ));
    }

    #[test]
    fn test_loopback_hosts_ignore_port() {
        let g = guard(Some("localhost:8080"));
        assert!(g.check(None, Some("127.0.0.1:9999"), None).is_ok());
        assert!(g.check(None, Some("[::1]:8080"), None).is_ok());
        assert!(g.check(None, Some("LOCALHOST"), None).is_ok());
        assert!(g.check(None, Some("localhost.evil.com"), None).is_err());
    }

    #[test]
    fn test_unset_expected_host_uses_authority_or_self() {
        let g = guard(None);
        assert!(g.check(None, Some("api.example.com"), Some("api.example.com")).is_ok());
        assert!(g.check(None, Some("rebound.example"), Some("api.example.com")).is_err());
        assert!(g.check(None, Some("api.example.com"), None).is_ok());
    }

    #[test]
    fn test_host_name_parsing() {
        assert_eq!(host_name("Example.com:443"), "example.com");
        assert_eq!(host_name("[::1]:80"), "::1");
        assert_eq!(host_name("::1"), "::1");
        assert_eq!(host_name("localhost"), "localhost");
    }

    #[test]
    fn test_undecodable_headers_fail_closed() {
        let g = guard(Some("api.example.com"));
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "api.example.com".parse().unwrap());
        assert_eq!(g.check_headers(&headers, None), Ok(None));

        headers.insert(
            header::ORIGIN,
            axum::http::HeaderValue::from_bytes(b"https://\xffevil").unwrap(),
        );
        assert_eq!(
            g.check_headers(&headers, None),
            Err(OriginRejection::UndecodableHeader("origin"))
        );

        headers.insert(header::ORIGIN, "https://app.example.com".parse().unwrap());
        assert_eq!(g.check_headers(&headers, None), Ok(Some("https://app.example.com")));

        headers.insert(
            header::HOST,
            axum::http::HeaderValue::from_bytes(b"api\xfe.example.com").unwrap(),
        );
        assert_eq!(
            g.check_headers(&headers, None),
            Err(OriginRejection::UndecodableHeader("host"))
        );
    }
}
