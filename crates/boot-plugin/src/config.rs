//! # Configuration Sources
//!
//! Plugins read their settings through the [`ConfigSource`] trait using
//! dotted keys such as `boot.redis.poolSize`. The host decides where values
//! come from:
//!
//! - [`MapSource`] - in-memory values, optionally flattened from a YAML document
//! - [`EnvSource`] - environment variables (`boot.redis.poolSize` -> `BOOT_REDIS_POOLSIZE`)
//! - [`Layered`] - several sources, first source holding a key wins
//!
//! Typed lookups come from [`ConfigSourceExt`], which every source gets for
//! free. A missing key is `Ok(None)`; a present but malformed value is a
//! [`ConfigError`].

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use serde_yaml::Value as YamlValue;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration document: {0}")]
    Document(String),
}

/// A read-only view over string-keyed configuration values.
pub trait ConfigSource: Send + Sync {
    /// Raw scalar value for `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// List value for `key`.
    ///
    /// Sources without native lists split the scalar on commas and whitespace.
    fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|raw| split_list(&raw))
    }
}

impl<T: ConfigSource + ?Sized> ConfigSource for Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn get_list(&self, key: &str) -> Option<Vec<String>> {
        (**self).get_list(key)
    }
}

impl<T: ConfigSource + ?Sized> ConfigSource for Box<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn get_list(&self, key: &str) -> Option<Vec<String>> {
        (**self).get_list(key)
    }
}

/// Typed lookups over any [`ConfigSource`].
pub trait ConfigSourceExt: ConfigSource {
    fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.get(key) {
            Some(val) => match val.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" => Ok(Some(false)),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!(
                        "invalid boolean value '{val}', expected true/false/1/0/yes/no/on/off"
                    ),
                }),
            },
            None => Ok(None),
        }
    }

    fn get_i64(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        match self.get(key) {
            Some(val) => val
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("invalid integer value '{val}': {e}"),
                }),
            None => Ok(None),
        }
    }

    fn get_usize(&self, key: &str) -> Result<Option<usize>, ConfigError> {
        match self.get(key) {
            Some(val) => val
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("invalid usize value '{val}': {e}"),
                }),
            None => Ok(None),
        }
    }

    fn get_string_list(&self, key: &str) -> Vec<String> {
        self.get_list(key).unwrap_or_default()
    }
}

impl<T: ConfigSource + ?Sized> ConfigSourceExt for T {}

/// Split a scalar list on commas and whitespace, dropping empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Scalar(String),
    List(Vec<String>),
}

/// In-memory configuration, the usual choice for tests and embedded hosts.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    entries: HashMap<String, Entry>,
}

impl MapSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style scalar insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder-style list insert
    #[must_use]
    pub fn with_list<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_list(key, values);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), Entry::Scalar(value.into()));
    }

    pub fn set_list<I, S>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.insert(
            key.into(),
            Entry::List(values.into_iter().map(Into::into).collect()),
        );
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten a YAML document into dotted keys.
    ///
    /// Nested mappings become `parent.child`, sequences of scalars are kept as
    /// lists, and `null` values are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Document` if the text is not valid YAML or the
    /// document root is not a mapping.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let root: YamlValue =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Document(e.to_string()))?;

        let mut source = Self::new();
        match root {
            YamlValue::Mapping(_) => flatten_yaml(&mut source, "", &root)?,
            YamlValue::Null => {}
            _ => {
                return Err(ConfigError::Document(
                    "document root must be a mapping".to_string(),
                ));
            }
        }
        Ok(source)
    }
}

fn yaml_scalar(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Tagged(tagged) => yaml_scalar(&tagged.value),
        _ => None,
    }
}

fn flatten_yaml(
    source: &mut MapSource,
    prefix: &str,
    value: &YamlValue,
) -> Result<(), ConfigError> {
    match value {
        YamlValue::Mapping(map) => {
            for (k, v) in map {
                let segment = yaml_scalar(k).ok_or_else(|| {
                    ConfigError::Document(format!("non-scalar mapping key under '{prefix}'"))
                })?;
                let key = if prefix.is_empty() {
                    segment
                } else {
                    format!("{prefix}.{segment}")
                };
                flatten_yaml(source, &key, v)?;
            }
        }
        YamlValue::Sequence(items) => {
            let list = items
                .iter()
                .map(|item| {
                    yaml_scalar(item).ok_or_else(|| ConfigError::InvalidValue {
                        key: prefix.to_string(),
                        message: "lists may only contain scalar values".to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            source.set_list(prefix, list);
        }
        YamlValue::Null => {}
        scalar => {
            if let Some(s) = yaml_scalar(scalar) {
                source.set(prefix, s);
            }
        }
    }
    Ok(())
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        match self.entries.get(key)? {
            Entry::Scalar(s) => Some(s.clone()),
            Entry::List(items) => Some(items.join(",")),
        }
    }

    fn get_list(&self, key: &str) -> Option<Vec<String>> {
        match self.entries.get(key)? {
            Entry::Scalar(s) => Some(split_list(s)),
            Entry::List(items) => Some(items.clone()),
        }
    }
}

/// Environment-variable configuration.
///
/// `boot.redis.poolSize` is looked up as `BOOT_REDIS_POOLSIZE`, or
/// `<PREFIX>_BOOT_REDIS_POOLSIZE` when a prefix is set.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    prefix: Option<String>,
}

impl EnvSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// Environment variable name for a dotted key
    pub fn env_key(&self, key: &str) -> String {
        let name = key.replace(['.', '-'], "_").to_uppercase();
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_uppercase(), name),
            None => name,
        }
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(self.env_key(key)).ok()
    }
}

/// Ordered stack of sources; the first one that knows a key answers.
#[derive(Default)]
pub struct Layered {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl Layered {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a lower-priority layer
    #[must_use]
    pub fn layer(mut self, source: impl ConfigSource + 'static) -> Self {
        self.layers.push(Box::new(source));
        self
    }
}

impl ConfigSource for Layered {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }

    fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.layers.iter().find_map(|layer| layer.get_list(key))
    }
}
