//! Dynamic target resolution.
//!
//! # Route table
//! Keys are evaluated longest first (by percent-decoded length); keys of
//! equal length keep their declared order. The first key that matches
//! decides the result, even when its target is null: a null target means
//! "keep the static target" and does not fall through to shorter keys.
//!
//! Three key shapes are supported and never conflated:
//! - `/path` keys are segment-aware prefixes of the decoded pathname, so
//!   `/api` matches `/api` and `/api/x` but not `/api-v2`.
//! - `host/path` keys match when the literal `host + request target`
//!   string contains them.
//! - bare `host` keys match the `Host` header exactly.
//!
//! # Resolver function
//! Called with the request; its error is propagated as
//! `DispatchError::RouterResolution` and never replaced by the static
//! target.

use crate::dispatch::path::pathname;
use crate::error::{DispatchError, Result};
use crate::http::request::Request;
use futures_util::future::{self, BoxFuture};
use percent_encoding::percent_decode_str;
use std::cmp::Reverse;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::trace;

/// Custom router function, normalized to always return a future.
pub type RouterFn =
    Arc<dyn Fn(&Request) -> BoxFuture<'static, anyhow::Result<Option<String>>> + Send + Sync>;

/// One declared route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// `host`, `host/path` or `/path`.
    pub key: String,
    pub target: Option<String>,
}

impl RouteEntry {
    pub fn new(key: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            target: Some(target.into()),
        }
    }

    /// An entry whose match resolves to "no override".
    pub fn without_target(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            target: None,
        }
    }
}

/// Router configuration.
#[derive(Clone)]
pub enum RouteSpec {
    /// Entries in declared order.
    Table(Vec<RouteEntry>),
    Resolver(RouterFn),
}

impl RouteSpec {
    pub fn table<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        RouteSpec::Table(
            entries
                .into_iter()
                .map(|(k, v)| RouteEntry::new(k, v))
                .collect(),
        )
    }

    /// Wraps an asynchronous router function.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(&Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
    {
        RouteSpec::Resolver(Arc::new(
            move |request: &Request| -> BoxFuture<'static, anyhow::Result<Option<String>>> {
                Box::pin(f(request))
            },
        ))
    }

    /// Wraps a synchronous router function.
    pub fn from_sync_fn<F>(f: F) -> Self
    where
        F: Fn(&Request) -> anyhow::Result<Option<String>> + Send + Sync + 'static,
    {
        RouteSpec::Resolver(Arc::new(
            move |request: &Request| -> BoxFuture<'static, anyhow::Result<Option<String>>> {
                Box::pin(future::ready(f(request)))
            },
        ))
    }
}

impl fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteSpec::Table(entries) => f.debug_tuple("Table").field(entries).finish(),
            RouteSpec::Resolver(_) => f.write_str("Resolver(<fn>)"),
        }
    }
}

#[derive(Debug, Clone)]
enum KeyKind {
    /// Decoded key and its non-empty segments.
    Path { decoded: String, segments: Vec<String> },
    HostPath,
    Host,
}

#[derive(Debug, Clone)]
struct Route {
    key: String,
    kind: KeyKind,
    target: Option<String>,
}

impl Route {
    fn matches(&self, path: &str, path_segments: &[&str], host: &str, host_and_path: &str) -> bool {
        match &self.kind {
            KeyKind::Path { decoded, segments } => {
                let prefix = segments.len() <= path_segments.len()
                    && segments.iter().zip(path_segments).all(|(k, p)| k == p);

                prefix
                    && (decoded == "/"
                        || path == decoded
                        || path
                            .strip_prefix(decoded.as_str())
                            .is_some_and(|rest| rest.starts_with('/')))
            }
            KeyKind::HostPath => host_and_path.contains(self.key.as_str()),
            KeyKind::Host => self.key == host,
        }
    }
}

/// Route table sorted into match priority order. Immutable once built.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(entries: Vec<RouteEntry>) -> Self {
        let mut routes: Vec<(usize, Route)> = entries
            .into_iter()
            .map(|entry| {
                let decoded = decode(&entry.key);
                let len = decoded.chars().count();
                let kind = if decoded.starts_with('/') {
                    KeyKind::Path {
                        segments: segments(&decoded).map(str::to_string).collect(),
                        decoded,
                    }
                } else if entry.key.contains('/') {
                    KeyKind::HostPath
                } else {
                    KeyKind::Host
                };

                (
                    len,
                    Route {
                        key: entry.key,
                        kind,
                        target: entry.target,
                    },
                )
            })
            .collect();

        // Stable: equal lengths keep declared order.
        routes.sort_by_key(|(len, _)| Reverse(*len));

        Self {
            routes: routes.into_iter().map(|(_, route)| route).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Keys in match priority order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.key.as_str())
    }

    /// Target of the first matching key, or `None` when nothing matches or
    /// the matching key has no target.
    pub fn lookup(&self, request: &Request) -> Option<String> {
        let path = decode(&pathname(&request.path));
        let path_segments: Vec<&str> = segments(&path).collect();
        let host = request.host();
        let host_and_path = format!("{host}{}", request.path);

        let route = self
            .routes
            .iter()
            .find(|r| r.matches(&path, &path_segments, host, &host_and_path))?;

        trace!(key = %route.key, upstream = ?route.target, "route table hit");
        route.target.clone()
    }
}

/// Built router.
#[derive(Clone)]
pub enum RouteResolver {
    Table(Arc<RouteTable>),
    Resolver(RouterFn),
}

impl fmt::Debug for RouteResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteResolver::Table(table) => f.debug_tuple("Table").field(table).finish(),
            RouteResolver::Resolver(_) => f.write_str("Resolver(<fn>)"),
        }
    }
}

impl RouteResolver {
    pub fn new(spec: RouteSpec) -> Self {
        match spec {
            RouteSpec::Table(entries) => RouteResolver::Table(Arc::new(RouteTable::new(entries))),
            RouteSpec::Resolver(f) => RouteResolver::Resolver(f),
        }
    }

    /// Resolves the target override for `request`.
    ///
    /// `Ok(None)` means "keep the configured static target".
    pub async fn resolve(&self, request: &Request) -> Result<Option<String>> {
        match self {
            RouteResolver::Table(table) => Ok(table.lookup(request)),
            RouteResolver::Resolver(f) => f(request).await.map_err(DispatchError::RouterResolution),
        }
    }
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
