//! Dispatch configuration.
//!
//! ```yaml
//! target: http://localhost:3000
//! filter: /api
//! rewrite:
//!   "^/api/old": /api/new
//! router:
//!   /api/users: http://users:3000
//!   dev.localhost: http://dev:3000
//! ```
//!
//! Mapping order is significant: it is rewrite precedence and the router's
//! tie-break order, so both mappings keep the order of the document.

use crate::dispatch::filter::FilterSpec;
use crate::dispatch::rewrite::RewriteSpec;
use crate::dispatch::router::{RouteEntry, RouteSpec};
use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, Result};
use anyhow::Context;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Process-level settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the YAML dispatch configuration.
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let config_path = std::env::var("DISPATCH_CONFIG")
            .unwrap_or_else(|_| "dispatch.yaml".to_string())
            .into();
        Self { config_path }
    }

    /// Reads and parses the dispatch configuration file.
    pub fn dispatch_config(&self) -> anyhow::Result<DispatchConfig> {
        DispatchConfig::from_file(&self.config_path)
    }
}

/// Filter as written in YAML: a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FilterConfig {
    Single(String),
    List(Vec<String>),
}

/// A string-keyed mapping that keeps document order. Values may be null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedMap(pub Vec<(String, Option<String>)>);

impl<'de> Deserialize<'de> for OrderedMap {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedMapVisitor;

        impl<'de> Visitor<'de> for OrderedMapVisitor {
            type Value = OrderedMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of strings to strings or null")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<OrderedMap, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, Option<String>>()? {
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor)
    }
}

/// Declarative dispatch configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub filter: Option<FilterConfig>,
    #[serde(default)]
    pub rewrite: Option<OrderedMap>,
    #[serde(default)]
    pub router: Option<OrderedMap>,
}

impl DispatchConfig {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid dispatch configuration")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    pub fn filter_spec(&self) -> Result<FilterSpec> {
        match &self.filter {
            None => Ok(FilterSpec::Empty),
            Some(FilterConfig::Single(pattern)) => Ok(FilterSpec::from_pattern(pattern.as_str())),
            Some(FilterConfig::List(patterns)) => FilterSpec::from_patterns(patterns.iter().cloned()),
        }
    }

    pub fn rewrite_spec(&self) -> Result<Option<RewriteSpec>> {
        let Some(OrderedMap(rules)) = &self.rewrite else {
            return Ok(None);
        };

        let rules = rules
            .iter()
            .map(|(pattern, replacement)| match replacement {
                Some(replacement) => Ok((pattern.clone(), replacement.clone())),
                None => Err(DispatchError::InvalidRewriteConfig(format!(
                    "missing replacement for {pattern:?}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(RewriteSpec::Rules(rules)))
    }

    pub fn route_spec(&self) -> Option<RouteSpec> {
        self.router.as_ref().map(|OrderedMap(entries)| {
            RouteSpec::Table(
                entries
                    .iter()
                    .map(|(key, target)| RouteEntry {
                        key: key.clone(),
                        target: target.clone(),
                    })
                    .collect(),
            )
        })
    }

    /// Compiles the configuration into a dispatcher.
    pub fn into_dispatcher(self) -> Result<Dispatcher> {
        let mut builder = Dispatcher::builder().filter(self.filter_spec()?);

        if let Some(rewrite) = self.rewrite_spec()? {
            builder = builder.rewrite(rewrite);
        }
        if let Some(router) = self.route_spec() {
            builder = builder.router(router);
        }
        if let Some(target) = self.target {
            builder = builder.target(target);
        }

        builder.build()
    }
}
