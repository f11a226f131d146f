//! Request rewrite rules.
//!
//! A [`RuleSet`] is an ordered list of [`Rule`]s evaluated against every
//! request before routing. A matching rule may answer the request itself
//! (redirects, user-agent rejection), rewrite the URI the router sees, or add
//! a header to the eventual response. Evaluation stops at the first matching
//! rule marked terminating.
//!
//! The active set sits behind an [`ArcSwap`](arc_swap::ArcSwap) so a config
//! reload replaces it without interrupting in-flight requests.

pub mod layer;
pub mod rule;
pub mod rule_set;
pub mod rules;

pub use layer::{RewriteLayer, RewriteService, RuleSetHandle};
pub use rule::{Rule, RuleAction, RuleContext};
pub use rule_set::{RewriteOutcome, RuleError, RuleSet};
pub use rules::{
    RedirectRegexRule, RejectUserAgentRule, ResponseHeaderRule, RewritePathRule,
    SecuredRedirectRule,
};
