use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Process-wide string-keyed settings, mirroring FAODEL's configuration
/// object: every value is a string; a key suffixed `[]` holds a pipe-joined
/// list.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    entries: HashMap<String, String>,
}

impl Configuration {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Configuration {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load from an optional base file plus the file named by `FAODEL_CONFIG`
    /// (if set), with environment variables prefixed `KELPIE_` applied last.
    pub fn load(base_file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = base_file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        if let Ok(overlay) = std::env::var("FAODEL_CONFIG") {
            builder = builder.add_source(config::File::with_name(&overlay).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("KELPIE").separator("_"));
        let raw = builder.build()?;
        let entries = raw.try_deserialize::<HashMap<String, String>>()?;
        Ok(Configuration { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            _ => default,
        }
    }

    /// Read a `key[]` entry as a pipe-joined list.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(&format!("{key}[]"))
            .map(|v| {
                v.split('|')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            Error::invalid_input(format!("missing required configuration key: {key}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_list_splits_on_pipe() {
        let cfg = Configuration::from_pairs([("dirman.resources[]", "dht:/a|dht:/b")]);
        assert_eq!(cfg.get_list("dirman.resources"), vec!["dht:/a", "dht:/b"]);
    }

    #[test]
    fn get_list_missing_key_is_empty() {
        let cfg = Configuration::default();
        assert!(cfg.get_list("dirman.resources").is_empty());
    }

    #[test]
    fn require_surfaces_invalid_input() {
        let cfg = Configuration::default();
        assert!(matches!(cfg.require("dirman.type"), Err(Error::InvalidInput(_))));
    }
}
