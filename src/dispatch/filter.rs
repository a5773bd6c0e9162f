//! Path filtering.
//!
//! Decides whether a request takes part in proxying at all.
//!
//! # Matching modes
//! - Plain path: literal character prefix of the pathname. `/foo` matches
//!   `/foobar`; this is not segment-aware, unlike route table keys.
//! - Glob: `*` stays inside one segment, `**` crosses any depth, a leading
//!   `!` negates. A list of globs is evaluated as one combined match, so a
//!   negated entry suppresses matches from every positive entry.
//! - Predicate: user code called with `(pathname, request)`. Its error is
//!   returned as `DispatchError::FilterPredicate`.
//!
//! Lists must be homogeneous. A list mixing plain paths and globs is a
//! configuration error rather than a partial match.

use crate::dispatch::path::{is_glob, pathname};
use crate::error::{DispatchError, Result};
use crate::http::request::Request;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use std::fmt;
use std::sync::Arc;

/// Custom filter predicate.
pub type Predicate = Arc<dyn Fn(&str, &Request) -> anyhow::Result<bool> + Send + Sync>;

/// Filter configuration.
#[derive(Clone, Default)]
pub enum FilterSpec {
    /// Matches every request.
    #[default]
    Empty,
    PlainPath(String),
    GlobPattern(String),
    ListOfPlain(Vec<String>),
    ListOfGlob(Vec<String>),
    Predicate(Predicate),
}

impl FilterSpec {
    /// Wraps a fallible predicate.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str, &Request) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        FilterSpec::Predicate(Arc::new(f))
    }

    /// Wraps a predicate that cannot fail.
    pub fn from_bool<F>(f: F) -> Self
    where
        F: Fn(&str, &Request) -> bool + Send + Sync + 'static,
    {
        FilterSpec::Predicate(Arc::new(move |path: &str, request: &Request| Ok(f(path, request))))
    }

    /// Classifies a single filter string as a plain path or a glob.
    pub fn from_pattern(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if is_glob(&pattern) {
            FilterSpec::GlobPattern(pattern)
        } else {
            FilterSpec::PlainPath(pattern)
        }
    }

    /// Classifies a list of filter strings.
    ///
    /// Fails with `InvalidFilterSpec` when the list mixes plain paths and
    /// globs. An empty list is a list of plain paths and matches nothing.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();

        if patterns.iter().all(|p| !is_glob(p)) {
            Ok(FilterSpec::ListOfPlain(patterns))
        } else if patterns.iter().all(|p| is_glob(p)) {
            Ok(FilterSpec::ListOfGlob(patterns))
        } else {
            Err(mixed_list(&patterns))
        }
    }
}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterSpec::Empty => f.write_str("Empty"),
            FilterSpec::PlainPath(p) => f.debug_tuple("PlainPath").field(p).finish(),
            FilterSpec::GlobPattern(p) => f.debug_tuple("GlobPattern").field(p).finish(),
            FilterSpec::ListOfPlain(l) => f.debug_tuple("ListOfPlain").field(l).finish(),
            FilterSpec::ListOfGlob(l) => f.debug_tuple("ListOfGlob").field(l).finish(),
            FilterSpec::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

/// A validated, compiled filter. Immutable once built.
#[derive(Clone, Debug)]
pub struct PathFilter {
    matcher: Compiled,
}

#[derive(Clone)]
enum Compiled {
    Any,
    Prefixes(Vec<String>),
    Glob(Arc<GlobMatcher>),
    Predicate(Predicate),
}

impl fmt::Debug for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compiled::Any => f.write_str("Any"),
            Compiled::Prefixes(p) => f.debug_tuple("Prefixes").field(p).finish(),
            Compiled::Glob(g) => f.debug_tuple("Glob").field(&g.patterns).finish(),
            Compiled::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

/// Positive and negated globs evaluated together.
struct GlobMatcher {
    patterns: Vec<String>,
    include: GlobSet,
    exclude: GlobSet,
}

impl GlobMatcher {
    fn new(patterns: &[String]) -> Result<Self> {
        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();

        for pattern in patterns {
            let (negated, body) = match pattern.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, pattern.as_str()),
            };

            let set = if negated { &mut exclude } else { &mut include };
            set.add(compile_glob(body, pattern)?);

            // A trailing "/**" also covers the directory itself.
            if let Some(parent) = body.strip_suffix("/**").filter(|p| !p.is_empty()) {
                set.add(compile_glob(parent, pattern)?);
            }
        }

        let build = |set: GlobSetBuilder| {
            set.build()
                .map_err(|e| DispatchError::InvalidFilterSpec(e.to_string()))
        };

        Ok(Self {
            patterns: patterns.to_vec(),
            include: build(include)?,
            exclude: build(exclude)?,
        })
    }

    fn is_match(&self, path: &str) -> bool {
        if self.exclude.is_match(path) {
            return false;
        }
        // A list made only of negations keeps everything it does not exclude.
        self.include.is_empty() || self.include.is_match(path)
    }
}

impl PathFilter {
    /// Validates and compiles a filter spec.
    pub fn new(spec: FilterSpec) -> Result<Self> {
        let matcher = match spec {
            FilterSpec::Empty => Compiled::Any,
            FilterSpec::PlainPath(p) if p == "/" => Compiled::Any,
            FilterSpec::PlainPath(p) => {
                if is_glob(&p) {
                    return Err(DispatchError::InvalidFilterSpec(format!(
                        "{p:?} is a glob pattern, not a plain path"
                    )));
                }
                Compiled::Prefixes(vec![p])
            }
            FilterSpec::GlobPattern(p) => {
                if !is_glob(&p) {
                    return Err(DispatchError::InvalidFilterSpec(format!(
                        "{p:?} is a plain path, not a glob pattern"
                    )));
                }
                Compiled::Glob(Arc::new(GlobMatcher::new(&[p])?))
            }
            FilterSpec::ListOfPlain(list) => {
                if list.iter().any(|p| is_glob(p)) {
                    return Err(mixed_list(&list));
                }
                Compiled::Prefixes(list)
            }
            FilterSpec::ListOfGlob(list) => {
                if list.iter().any(|p| !is_glob(p)) {
                    return Err(mixed_list(&list));
                }
                Compiled::Glob(Arc::new(GlobMatcher::new(&list)?))
            }
            FilterSpec::Predicate(f) => Compiled::Predicate(f),
        };

        Ok(Self { matcher })
    }

    /// Whether the request target participates in proxying.
    ///
    /// Only a custom predicate can fail; its error is returned as
    /// `DispatchError::FilterPredicate`.
    pub fn matches(&self, uri: &str, request: &Request) -> Result<bool> {
        Ok(match &self.matcher {
            Compiled::Any => true,
            Compiled::Prefixes(prefixes) => {
                let path = pathname(uri);
                prefixes.iter().any(|p| path.starts_with(p.as_str()))
            }
            Compiled::Glob(glob) => glob.is_match(&pathname(uri)),
            Compiled::Predicate(f) => {
                f(&pathname(uri), request).map_err(DispatchError::FilterPredicate)?
            }
        })
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self {
            matcher: Compiled::Any,
        }
    }
}

/// One-shot match: validates `spec` on every call.
///
/// Long-lived callers should build a [`PathFilter`] once instead, which
/// turns a malformed spec into a construction-time failure.
pub fn match_path(spec: &FilterSpec, uri: &str, request: &Request) -> Result<bool> {
    PathFilter::new(spec.clone())?.matches(uri, request)
}

fn compile_glob(glob: &str, pattern: &str) -> Result<Glob> {
    GlobBuilder::new(glob)
        .literal_separator(true)
        .build()
        .map_err(|e| DispatchError::InvalidFilterSpec(format!("bad glob {pattern:?}: {e}")))
}

fn mixed_list(patterns: &[String]) -> DispatchError {
    DispatchError::InvalidFilterSpec(format!(
        "list mixes plain paths and glob patterns: {patterns:?}"
    ))
}
