//! Upstream path rewriting.
//!
//! A rule table is compiled once into an ordered list of regular
//! expressions. At request time the first rule whose pattern matches wins:
//! its first match is substituted and no later rule is consulted. A custom
//! function replaces the table entirely.
//!
//! Replacement strings use `regex` expansion syntax (`$1`, `${name}`).

use crate::error::{DispatchError, Result};
use crate::http::request::Request;
use futures_util::future::{self, BoxFuture};
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Custom rewrite function, normalized to always return a future.
pub type RewriteFn =
    Arc<dyn Fn(&str, &Request) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// Rewrite configuration.
#[derive(Clone)]
pub enum RewriteSpec {
    /// `(pattern, replacement)` pairs in precedence order.
    Rules(Vec<(String, String)>),
    Function(RewriteFn),
}

impl RewriteSpec {
    pub fn rules<I, K, V>(rules: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        RewriteSpec::Rules(
            rules
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Wraps an asynchronous rewrite function.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(&str, &Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        RewriteSpec::Function(Arc::new(
            move |path: &str, request: &Request| -> BoxFuture<'static, anyhow::Result<String>> {
                Box::pin(f(path, request))
            },
        ))
    }

    /// Wraps a synchronous rewrite function.
    pub fn from_sync_fn<F>(f: F) -> Self
    where
        F: Fn(&str, &Request) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        RewriteSpec::Function(Arc::new(
            move |path: &str, request: &Request| -> BoxFuture<'static, anyhow::Result<String>> {
                Box::pin(future::ready(f(path, request)))
            },
        ))
    }
}

impl fmt::Debug for RewriteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewriteSpec::Rules(rules) => f.debug_tuple("Rules").field(rules).finish(),
            RewriteSpec::Function(_) => f.write_str("Function(<fn>)"),
        }
    }
}

/// A compiled rewrite rule.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pub pattern: Regex,
    pub replacement: String,
}

/// Built rewrite function. Rule tables are shared read-only.
#[derive(Clone)]
pub enum PathRewriter {
    Rules(Arc<[RewriteRule]>),
    Function(RewriteFn),
}

impl fmt::Debug for PathRewriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathRewriter::Rules(rules) => f.debug_tuple("Rules").field(rules).finish(),
            PathRewriter::Function(_) => f.write_str("Function(<fn>)"),
        }
    }
}

impl PathRewriter {
    /// Builds the rewriter.
    ///
    /// `None` means no rewriting and yields `Ok(None)`. An explicitly empty
    /// rule table, or a pattern that is not a valid regex, fails with
    /// `InvalidRewriteConfig`.
    pub fn build(spec: Option<RewriteSpec>) -> Result<Option<Self>> {
        let rules = match spec {
            None => return Ok(None),
            Some(RewriteSpec::Function(f)) => return Ok(Some(PathRewriter::Function(f))),
            Some(RewriteSpec::Rules(rules)) => rules,
        };

        if rules.is_empty() {
            return Err(DispatchError::InvalidRewriteConfig(
                "rewrite table is empty".to_string(),
            ));
        }

        let compiled = rules
            .into_iter()
            .map(|(pattern, replacement)| {
                let regex = Regex::new(&pattern).map_err(|e| {
                    DispatchError::InvalidRewriteConfig(format!("bad pattern {pattern:?}: {e}"))
                })?;
                debug!(pattern = %pattern, replacement = %replacement, "rewrite rule compiled");
                Ok(RewriteRule {
                    pattern: regex,
                    replacement,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(PathRewriter::Rules(compiled.into())))
    }

    /// Number of compiled rules; zero for a custom function.
    pub fn rule_count(&self) -> usize {
        match self {
            PathRewriter::Rules(rules) => rules.len(),
            PathRewriter::Function(_) => 0,
        }
    }

    /// Computes the upstream path for `path`.
    ///
    /// Errors from a custom function are returned as
    /// `DispatchError::Rewrite`.
    pub async fn rewrite(&self, path: &str, request: &Request) -> Result<String> {
        match self {
            PathRewriter::Rules(rules) => Ok(match apply_rules(rules, path) {
                Some(rewritten) => rewritten,
                None => {
                    debug!(path = %path, "no rewritten path found");
                    path.to_string()
                }
            }),
            PathRewriter::Function(f) => f(path, request).await.map_err(DispatchError::Rewrite),
        }
    }
}

/// Applies the first matching rule, or returns `None` when no rule matches.
pub fn apply_rules(rules: &[RewriteRule], path: &str) -> Option<String> {
    let rule = rules.iter().find(|r| r.pattern.is_match(path))?;
    let rewritten = rule
        .pattern
        .replace(path, rule.replacement.as_str())
        .into_owned();

    debug!(from = %path, to = %rewritten, "rewriting path");
    Some(rewritten)
}
