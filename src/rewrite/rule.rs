//! The `Rule` abstraction and the view of a request rules match against.

use axum::{
    http::{
        header::{self, HeaderName, HeaderValue},
        HeaderMap, Uri,
    },
    response::Response,
};

/// What a matching rule does to the exchange.
pub enum RuleAction {
    /// Answer immediately; the request never reaches the router.
    Respond(Response),
    /// Replace the request URI before routing.
    RewriteUri(Uri),
    /// Add a header to whatever response is eventually produced.
    AddResponseHeader(HeaderName, HeaderValue),
}

impl std::fmt::Debug for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::Respond(response) => f
                .debug_tuple("Respond")
                .field(&response.status())
                .finish(),
            RuleAction::RewriteUri(uri) => f.debug_tuple("RewriteUri").field(uri).finish(),
            RuleAction::AddResponseHeader(name, value) => f
                .debug_tuple("AddResponseHeader")
                .field(name)
                .field(value)
                .finish(),
        }
    }
}

/// A rewrite rule: a predicate plus the action taken when it holds.
pub trait Rule: Send + Sync + std::fmt::Debug {
    /// Identifier used in logs and metrics.
    fn name(&self) -> &str;

    /// Whether a match stops evaluation of the remaining rules.
    fn is_terminating(&self) -> bool;

    /// Returns the action to take, or `None` if the rule does not match.
    fn match_and_apply(&self, ctx: &RuleContext<'_>) -> Option<RuleAction>;
}

/// Read-only view of the request as seen by rules.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    uri: &'a Uri,
    headers: &'a HeaderMap,
}

impl<'a> RuleContext<'a> {
    pub fn new(uri: &'a Uri, headers: &'a HeaderMap) -> Self {
        Self { uri, headers }
    }

    pub fn uri(&self) -> &'a Uri {
        self.uri
    }

    pub fn path(&self) -> &'a str {
        self.uri.path()
    }

    pub fn header(&self, name: HeaderName) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Host and optional port, from the `Host` header or the URI authority
    /// (HTTP/2 requests carry it in `:authority`).
    pub fn host(&self) -> Option<&'a str> {
        self.header(header::HOST)
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    /// Host without the port.
    pub fn host_name(&self) -> Option<&'a str> {
        let host = self.host()?;
        if host.starts_with('[') {
            // IPv6 literal: keep the brackets, drop any trailing port.
            return host.find(']').map(|end| &host[..=end]);
        }
        Some(host.split(':').next().unwrap_or(host))
    }

    /// Whether the client reached us over TLS, directly or through a
    /// terminating proxy.
    pub fn is_secure(&self) -> bool {
        self.uri.scheme_str() == Some("https")
            || self
                .header(HeaderName::from_static("x-forwarded-proto"))
                .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_secure() {
            "https"
        } else {
            "http"
        }
    }

    /// The request URL without the query string, e.g. `http://www.example.org/dump/`.
    pub fn request_url(&self) -> Option<String> {
        let host = self.host()?;
        Some(format!("{}://{}{}", self.scheme(), host, self.path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_static(*name),
                HeaderValue::from_static(*value),
            );
        }
        map
    }

    #[test]
    fn request_url_from_host_header() {
        let uri: Uri = "/dump/info?x=1".parse().unwrap();
        let map = headers(&[("host", "www.example.org")]);
        let ctx = RuleContext::new(&uri, &map);
        assert_eq!(
            ctx.request_url().as_deref(),
            Some("http://www.example.org/dump/info")
        );
    }

    #[test]
    fn forwarded_proto_marks_secure() {
        let uri: Uri = "/".parse().unwrap();
        let map = headers(&[("host", "a.test:8080"), ("x-forwarded-proto", "HTTPS")]);
        let ctx = RuleContext::new(&uri, &map);
        assert!(ctx.is_secure());
        assert_eq!(ctx.request_url().as_deref(), Some("https://a.test:8080/"));
    }

    #[test]
    fn host_name_strips_port() {
        let uri: Uri = "/".parse().unwrap();
        let map = headers(&[("host", "localhost:8080")]);
        assert_eq!(RuleContext::new(&uri, &map).host_name(), Some("localhost"));

        let map = headers(&[("host", "[::1]:8080")]);
        assert_eq!(RuleContext::new(&uri, &map).host_name(), Some("[::1]"));
    }

    #[test]
    fn authority_used_without_host_header() {
        let uri: Uri = "http://h2.example.org/x".parse().unwrap();
        let map = HeaderMap::new();
        assert_eq!(RuleContext::new(&uri, &map).host(), Some("h2.example.org"));
    }
}
