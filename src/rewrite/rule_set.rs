//! Ordered rule evaluation and compilation from configuration.

use axum::{
    body::Body,
    http::{
        header::{HeaderName, HeaderValue},
        Request, StatusCode,
    },
    response::Response,
};
use thiserror::Error;

use crate::config::schema::RuleConfig;
use crate::observability::metrics;
use crate::rewrite::rule::{Rule, RuleAction, RuleContext};
use crate::rewrite::rules::{
    full_match, RedirectRegexRule, RejectUserAgentRule, ResponseHeaderRule, RewritePathRule,
    SecuredRedirectRule,
};

/// Error compiling a rule from configuration.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {rule}: invalid regex: {source}")]
    Regex {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule {rule}: invalid status code {status}")]
    Status { rule: String, status: u16 },

    #[error("rule {rule}: invalid header name {name:?}")]
    HeaderName { rule: String, name: String },

    #[error("rule {rule}: invalid header value {value:?}")]
    HeaderValue { rule: String, value: String },
}

/// Result of running the rule set over one request.
#[derive(Debug, Default)]
pub struct RewriteOutcome {
    /// Set when a rule answered the request itself.
    pub response: Option<Response>,
    /// Headers to add to the final response.
    pub response_headers: Vec<(HeaderName, HeaderValue)>,
}

impl RewriteOutcome {
    /// Add the collected headers to `response`.
    pub fn decorate(headers: Vec<(HeaderName, HeaderValue)>, mut response: Response) -> Response {
        for (name, value) in headers {
            response.headers_mut().append(name, value);
        }
        response
    }
}

/// Rules in evaluation order. Immutable once built.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// Compile configured rules; `secure_port` feeds `secure_redirect` rules.
    pub fn from_config(configs: &[RuleConfig], secure_port: Option<u16>) -> Result<Self, RuleError> {
        let rules = configs
            .iter()
            .enumerate()
            .map(|(index, config)| compile(index, config, secure_port))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(rules = rules.len(), "Rewrite rules compiled");
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run the rules against `request`, rewriting its URI in place.
    ///
    /// Evaluation stops at the first matching terminating rule, or at the
    /// first rule that answers the request.
    pub fn apply(&self, request: &mut Request<Body>) -> RewriteOutcome {
        let mut outcome = RewriteOutcome::default();

        for rule in &self.rules {
            let ctx = RuleContext::new(request.uri(), request.headers());
            let Some(action) = rule.match_and_apply(&ctx) else {
                continue;
            };

            tracing::debug!(rule = rule.name(), action = ?action, "Rewrite rule matched");
            metrics::record_rewrite_match(rule.name());

            match action {
                RuleAction::Respond(response) => {
                    outcome.response = Some(response);
                    break;
                }
                RuleAction::RewriteUri(uri) => *request.uri_mut() = uri,
                RuleAction::AddResponseHeader(name, value) => {
                    outcome.response_headers.push((name, value))
                }
            }

            if rule.is_terminating() {
                break;
            }
        }

        outcome
    }
}

fn compile(
    index: usize,
    config: &RuleConfig,
    secure_port: Option<u16>,
) -> Result<Box<dyn Rule>, RuleError> {
    let regex = |kind: &str, pattern: &str| {
        full_match(pattern).map_err(|source| RuleError::Regex {
            rule: format!("{kind}#{index}"),
            source,
        })
    };
    let status = |kind: &str, code: u16| {
        StatusCode::from_u16(code).map_err(|_| RuleError::Status {
            rule: format!("{kind}#{index}"),
            status: code,
        })
    };

    let rule: Box<dyn Rule> = match config {
        RuleConfig::Redirect {
            regex: pattern,
            replacement,
            status: code,
            terminating,
        } => {
            let mut rule = RedirectRegexRule::new(
                regex("redirect", pattern)?,
                replacement.clone(),
                status("redirect", *code)?,
            );
            rule.name = format!("redirect#{index}");
            rule.terminating = terminating.unwrap_or(rule.terminating);
            Box::new(rule)
        }
        RuleConfig::RejectUserAgent {
            regex: pattern,
            status: code,
            terminating,
        } => {
            let mut rule = RejectUserAgentRule::new(
                regex("reject_user_agent", pattern)?,
                status("reject_user_agent", *code)?,
            );
            rule.name = format!("reject_user_agent#{index}");
            rule.terminating = terminating.unwrap_or(rule.terminating);
            Box::new(rule)
        }
        RuleConfig::SecureRedirect { terminating } => {
            let mut rule = SecuredRedirectRule::new(secure_port);
            rule.name = format!("secure_redirect#{index}");
            rule.terminating = terminating.unwrap_or(rule.terminating);
            Box::new(rule)
        }
        RuleConfig::RewritePath {
            regex: pattern,
            replacement,
            terminating,
        } => {
            let mut rule = RewritePathRule::new(regex("rewrite_path", pattern)?, replacement.clone());
            rule.name = format!("rewrite_path#{index}");
            rule.terminating = terminating.unwrap_or(rule.terminating);
            Box::new(rule)
        }
        RuleConfig::ResponseHeader {
            path_prefix,
            name,
            value,
            terminating,
        } => {
            let rule_name = format!("response_header#{index}");
            let header = HeaderName::try_from(name.as_str()).map_err(|_| RuleError::HeaderName {
                rule: rule_name.clone(),
                name: name.clone(),
            })?;
            let header_value =
                HeaderValue::try_from(value.as_str()).map_err(|_| RuleError::HeaderValue {
                    rule: rule_name.clone(),
                    value: value.clone(),
                })?;
            let mut rule = ResponseHeaderRule::new(path_prefix.clone(), header, header_value);
            rule.name = rule_name;
            rule.terminating = terminating.unwrap_or(rule.terminating);
            Box::new(rule)
        }
    };

    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn request(uri: &str, agent: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::HOST, "www.example.org")
            .header(header::USER_AGENT, agent)
            .body(Body::empty())
            .unwrap()
    }

    fn config(toml_rules: &str) -> Vec<RuleConfig> {
        let config: crate::config::ServerConfig = toml::from_str(toml_rules).unwrap();
        config.rewrite.rules
    }

    #[test]
    fn terminating_match_stops_evaluation() {
        let rules = RuleSet::from_config(
            &config(
                r#"
                [[rewrite.rules]]
                kind = "reject_user_agent"
                regex = ".*Robot.*"
                status = 401

                [[rewrite.rules]]
                kind = "response_header"
                path_prefix = "/"
                name = "x-seen"
                value = "1"
                "#,
            ),
            None,
        )
        .unwrap();

        let outcome = rules.apply(&mut request("/dump/", "AI-Robot"));
        assert_eq!(outcome.response.unwrap().status(), StatusCode::UNAUTHORIZED);
        assert!(outcome.response_headers.is_empty());

        let outcome = rules.apply(&mut request("/dump/", "Fancy-Browser"));
        assert!(outcome.response.is_none());
        assert_eq!(outcome.response_headers.len(), 1);
    }

    #[test]
    fn non_terminating_rules_chain() {
        let rules = RuleSet::from_config(
            &config(
                r#"
                [[rewrite.rules]]
                kind = "response_header"
                path_prefix = "/old"
                name = "x-rewritten"
                value = "yes"

                [[rewrite.rules]]
                kind = "rewrite_path"
                regex = "/old/(.*)"
                replacement = "/dump/$1"

                [[rewrite.rules]]
                kind = "redirect"
                regex = "http://www.example.org/dump/secret"
                replacement = "/denied"
                status = 302
                "#,
            ),
            None,
        )
        .unwrap();

        let mut req = request("/old/page?q=1", "Browser");
        let outcome = rules.apply(&mut req);
        assert!(outcome.response.is_none());
        assert_eq!(req.uri(), "/dump/page?q=1");
        assert_eq!(outcome.response_headers[0].0, "x-rewritten");

        // Later rules see the rewritten URI.
        let mut req = request("/old/secret", "Browser");
        let outcome = rules.apply(&mut req);
        let response = outcome.response.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "http://www.example.org/denied"
        );
    }

    #[test]
    fn terminating_flag_overridable() {
        let rules = RuleSet::from_config(
            &config(
                r#"
                [[rewrite.rules]]
                kind = "rewrite_path"
                regex = "/a"
                replacement = "/b"
                terminating = true

                [[rewrite.rules]]
                kind = "rewrite_path"
                regex = "/b"
                replacement = "/c"
                "#,
            ),
            None,
        )
        .unwrap();

        let mut req = request("/a", "Browser");
        rules.apply(&mut req);
        assert_eq!(req.uri(), "/b");
    }

    #[test]
    fn invalid_rules_rejected() {
        let err = RuleSet::from_config(
            &config(
                r#"
                [[rewrite.rules]]
                kind = "reject_user_agent"
                regex = "(unclosed"
                "#,
            ),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::Regex { ref rule, .. } if rule == "reject_user_agent#0"));

        let err = RuleSet::from_config(
            &config(
                r#"
                [[rewrite.rules]]
                kind = "redirect"
                regex = ".*"
                replacement = "/"
                status = 1000
                "#,
            ),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::Status { status: 1000, .. }));

        let err = RuleSet::from_config(
            &config(
                r#"
                [[rewrite.rules]]
                kind = "response_header"
                path_prefix = "/"
                name = "bad header"
                value = "x"
                "#,
            ),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::HeaderName { .. }));
    }
}
