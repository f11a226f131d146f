//! Built-in rewrite rules.

use axum::{
    http::{
        header::{self, HeaderName, HeaderValue},
        uri::PathAndQuery,
        StatusCode, Uri,
    },
    response::IntoResponse,
};
use regex::Regex;
use url::Url;

use crate::rewrite::rule::{Rule, RuleAction, RuleContext};

/// Compile `pattern` so it must match the whole input.
pub fn full_match(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// Expand `$1`/`${name}` references in `replacement` against a full match of `input`.
fn expand(regex: &Regex, input: &str, replacement: &str) -> Option<String> {
    let captures = regex.captures(input)?;
    let mut out = String::new();
    captures.expand(replacement, &mut out);
    Some(out)
}

/// Redirects requests whose URL matches a pattern.
#[derive(Debug)]
pub struct RedirectRegexRule {
    pub(crate) name: String,
    pub(crate) regex: Regex,
    pub(crate) replacement: String,
    pub(crate) status: StatusCode,
    pub(crate) terminating: bool,
}

impl RedirectRegexRule {
    pub fn new(regex: Regex, replacement: impl Into<String>, status: StatusCode) -> Self {
        Self {
            name: "redirect".to_string(),
            regex,
            replacement: replacement.into(),
            status,
            terminating: true,
        }
    }
}

impl Rule for RedirectRegexRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_terminating(&self) -> bool {
        self.terminating
    }

    fn match_and_apply(&self, ctx: &RuleContext<'_>) -> Option<RuleAction> {
        let url = ctx.request_url()?;
        let target = expand(&self.regex, &url, &self.replacement)?;

        // Relative replacements resolve against the request URL.
        let location = match Url::parse(&target) {
            Ok(absolute) => absolute.to_string(),
            Err(_) => Url::parse(&url).ok()?.join(&target).ok()?.to_string(),
        };

        let location = match HeaderValue::try_from(location) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(rule = %self.name, error = %e, "Redirect location is not a valid header");
                return None;
            }
        };
        Some(RuleAction::Respond(
            (self.status, [(header::LOCATION, location)]).into_response(),
        ))
    }
}

/// Rejects requests whose `User-Agent` matches a pattern.
#[derive(Debug)]
pub struct RejectUserAgentRule {
    pub(crate) name: String,
    pub(crate) regex: Regex,
    pub(crate) status: StatusCode,
    pub(crate) terminating: bool,
}

impl RejectUserAgentRule {
    pub fn new(regex: Regex, status: StatusCode) -> Self {
        Self {
            name: "reject_user_agent".to_string(),
            regex,
            status,
            terminating: true,
        }
    }
}

impl Rule for RejectUserAgentRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_terminating(&self) -> bool {
        self.terminating
    }

    fn match_and_apply(&self, ctx: &RuleContext<'_>) -> Option<RuleAction> {
        let agent = ctx.header(header::USER_AGENT)?;
        self.regex
            .is_match(agent)
            .then(|| RuleAction::Respond(self.status.into_response()))
    }
}

/// Sends plain-text requests to the HTTPS port.
#[derive(Debug)]
pub struct SecuredRedirectRule {
    pub(crate) name: String,
    pub(crate) secure_port: Option<u16>,
    pub(crate) terminating: bool,
}

impl SecuredRedirectRule {
    pub fn new(secure_port: Option<u16>) -> Self {
        Self {
            name: "secure_redirect".to_string(),
            secure_port,
            terminating: true,
        }
    }
}

impl Rule for SecuredRedirectRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_terminating(&self) -> bool {
        self.terminating
    }

    fn match_and_apply(&self, ctx: &RuleContext<'_>) -> Option<RuleAction> {
        if ctx.is_secure() {
            return None;
        }

        let Some(port) = self.secure_port else {
            return Some(RuleAction::Respond(
                (StatusCode::FORBIDDEN, "!Secure").into_response(),
            ));
        };

        let host = ctx.host_name().unwrap_or("localhost");
        let target = ctx
            .uri()
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or("/");
        let location = if port == 443 {
            format!("https://{host}{target}")
        } else {
            format!("https://{host}:{port}{target}")
        };

        let location = HeaderValue::try_from(location).ok()?;
        Some(RuleAction::Respond(
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        ))
    }
}

/// Rewrites the request path before routing. The query string is kept
/// unless the replacement supplies its own.
#[derive(Debug)]
pub struct RewritePathRule {
    pub(crate) name: String,
    pub(crate) regex: Regex,
    pub(crate) replacement: String,
    pub(crate) terminating: bool,
}

impl RewritePathRule {
    pub fn new(regex: Regex, replacement: impl Into<String>) -> Self {
        Self {
            name: "rewrite_path".to_string(),
            regex,
            replacement: replacement.into(),
            terminating: false,
        }
    }
}

impl Rule for RewritePathRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_terminating(&self) -> bool {
        self.terminating
    }

    fn match_and_apply(&self, ctx: &RuleContext<'_>) -> Option<RuleAction> {
        let uri = ctx.uri();
        let mut target = expand(&self.regex, uri.path(), &self.replacement)?;
        if !target.contains('?') {
            if let Some(query) = uri.query() {
                target.push('?');
                target.push_str(query);
            }
        }

        let mut parts = uri.clone().into_parts();
        parts.path_and_query = Some(PathAndQuery::try_from(target).ok()?);
        Uri::from_parts(parts).ok().map(RuleAction::RewriteUri)
    }
}

/// Adds a response header for requests under a path prefix.
#[derive(Debug)]
pub struct ResponseHeaderRule {
    pub(crate) name: String,
    pub(crate) path_prefix: String,
    pub(crate) header: HeaderName,
    pub(crate) value: HeaderValue,
    pub(crate) terminating: bool,
}

impl ResponseHeaderRule {
    pub fn new(path_prefix: impl Into<String>, header: HeaderName, value: HeaderValue) -> Self {
        Self {
            name: "response_header".to_string(),
            path_prefix: path_prefix.into(),
            header,
            value,
            terminating: false,
        }
    }
}

impl Rule for ResponseHeaderRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_terminating(&self) -> bool {
        self.terminating
    }

    fn match_and_apply(&self, ctx: &RuleContext<'_>) -> Option<RuleAction> {
        ctx.path().starts_with(&self.path_prefix).then(|| {
            RuleAction::AddResponseHeader(self.header.clone(), self.value.clone())
        })
    }
}
