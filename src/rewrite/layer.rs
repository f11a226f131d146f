//! Tower middleware running the active [`RuleSet`] ahead of routing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use axum::{body::Body, http::Request, response::Response};
use tower::{Layer, Service};

use crate::rewrite::rule_set::{RewriteOutcome, RuleSet};

/// Shared, hot-swappable handle to the active rules.
pub type RuleSetHandle = Arc<ArcSwap<RuleSet>>;

/// Layer installing [`RewriteService`].
///
/// Must wrap the router from the outside: URI changes made by rules have to
/// happen before route selection.
#[derive(Debug, Clone)]
pub struct RewriteLayer {
    rules: RuleSetHandle,
}

impl RewriteLayer {
    pub fn new(rules: RuleSetHandle) -> Self {
        Self { rules }
    }
}

impl<S> Layer<S> for RewriteLayer {
    type Service = RewriteService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RewriteService {
            inner,
            rules: Arc::clone(&self.rules),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RewriteService<S> {
    inner: S,
    rules: RuleSetHandle,
}

impl<S> Service<Request<Body>> for RewriteService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        // One snapshot per request; a reload mid-request does not mix rule sets.
        let rules = self.rules.load();
        let RewriteOutcome {
            response,
            response_headers,
        } = rules.apply(&mut request);

        if let Some(response) = response {
            return Box::pin(async move { Ok(RewriteOutcome::decorate(response_headers, response)) });
        }

        let future = self.inner.call(request);
        Box::pin(async move {
            let response = future.await?;
            Ok(RewriteOutcome::decorate(response_headers, response))
        })
    }
}
