//! Per-request dispatch decisions.
//!
//! # Data Flow
//! ```text
//! Request (raw target, Host header)
//!     → filter.rs  (gate: proxy at all?)
//!     → router.rs  (target override, reads the original target)
//!     → rewrite.rs (upstream path, reads the original target)
//!     → DispatchDecision → Transport
//! ```
//!
//! # Design Decisions
//! - Filter, router and rewrite rules are compiled once, when the
//!   `Dispatcher` is built, and shared read-only afterwards
//! - Routing fully resolves before rewriting starts; both see the
//!   unrewritten target
//! - A router override applies to one decision only, never to the
//!   dispatcher's static target
//! - Errors from user functions are returned, not retried or masked

pub mod filter;
pub mod path;
pub mod rewrite;
pub mod router;

use crate::error::{DispatchError, Result};
use crate::http::request::Request;
use filter::{FilterSpec, PathFilter};
use rewrite::{PathRewriter, RewriteSpec};
use router::{RouteResolver, RouteSpec};
use serde::Serialize;
use std::future::Future;
use tracing::{debug, info};

/// Outcome of dispatching one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchDecision {
    /// Whether the request should be proxied at all.
    pub proxy: bool,
    /// Upstream target; the router's override or the static target.
    pub target: Option<String>,
    /// Upstream path; the original target when not proxied or not rewritten.
    pub path: String,
}

impl DispatchDecision {
    fn pass_through(path: &str) -> Self {
        Self {
            proxy: false,
            target: None,
            path: path.to_string(),
        }
    }
}

/// Performs the network I/O for a decision.
pub trait Transport {
    fn forward(
        &self,
        request: &Request,
        decision: &DispatchDecision,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Immutable dispatch pipeline.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    target: Option<String>,
    filter: PathFilter,
    router: Option<RouteResolver>,
    rewriter: Option<PathRewriter>,
}

/// Builder for constructing a Dispatcher.
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    target: Option<String>,
    filter: FilterSpec,
    rewrite: Option<RewriteSpec>,
    router: Option<RouteSpec>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }

    pub fn rewrite(mut self, rewrite: RewriteSpec) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    pub fn router(mut self, router: RouteSpec) -> Self {
        self.router = Some(router);
        self
    }

    /// Validates and compiles every spec.
    ///
    /// Fails with `MissingTarget` when there is neither a static target nor
    /// a router, and with the filter or rewrite error when a spec is
    /// malformed.
    pub fn build(self) -> Result<Dispatcher> {
        if self.target.is_none() && self.router.is_none() {
            return Err(DispatchError::MissingTarget);
        }

        let filter = PathFilter::new(self.filter)?;
        let rewriter = PathRewriter::build(self.rewrite)?;
        let router = self.router.map(RouteResolver::new);

        let routes = match &router {
            Some(RouteResolver::Table(table)) => table.len(),
            _ => 0,
        };
        info!(
            static_target = self.target.as_deref().unwrap_or("-"),
            rewrite_rules = rewriter.as_ref().map_or(0, PathRewriter::rule_count),
            routes,
            "Dispatcher configured"
        );

        Ok(Dispatcher {
            target: self.target,
            filter,
            router,
            rewriter,
        })
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// The statically configured target.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Decides what to do with `request`.
    ///
    /// Runs filter, router and rewriter strictly in that order, each
    /// against the original request target. Errors from a custom filter
    /// predicate, router or rewrite function are returned unchanged.
    pub async fn dispatch(&self, request: &Request) -> Result<DispatchDecision> {
        let original = request.path.as_str();

        if !self.filter.matches(original, request)? {
            debug!(path = %original, "request not matched by filter, skipping proxy");
            return Ok(DispatchDecision::pass_through(original));
        }

        let mut target = self.target.clone();
        if let Some(router) = &self.router {
            if let Some(new_target) = router.resolve(request).await? {
                debug!(
                    from = target.as_deref().unwrap_or("-"),
                    to = %new_target,
                    "router new target"
                );
                target = Some(new_target);
            }
        }

        let path = match &self.rewriter {
            Some(rewriter) => rewriter.rewrite(original, request).await?,
            None => original.to_string(),
        };

        Ok(DispatchDecision {
            proxy: true,
            target,
            path,
        })
    }

    /// Dispatches `request` and hands a proxied decision to `transport`.
    ///
    /// Requests the filter rejects never reach the transport.
    pub async fn forward<T: Transport>(
        &self,
        transport: &T,
        request: &Request,
    ) -> anyhow::Result<DispatchDecision> {
        let decision = self.dispatch(request).await?;
        if decision.proxy {
            transport.forward(request, &decision).await?;
        }
        Ok(decision)
    }
}
