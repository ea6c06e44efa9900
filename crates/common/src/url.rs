use std::fmt;

use crate::error::{Error, Result};
use crate::node::{Bucket, NodeId};

/// `<type>:[bucket]<refnode>/path/name&opt=val&...`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceUrl {
    pub resource_type: String,
    pub bucket: Bucket,
    pub reference_node: Option<NodeId>,
    pub path: Vec<String>,
    pub name: String,
    options: Vec<(String, String)>,
}

impl ResourceUrl {
    pub fn new(resource_type: impl Into<String>) -> Self {
        ResourceUrl {
            resource_type: resource_type.into(),
            bucket: Bucket::UNSPECIFIED,
            reference_node: None,
            path: Vec::new(),
            name: String::new(),
            options: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let (resource_type, rest) = raw
            .split_once(':')
            .ok_or_else(|| Error::invalid_input(format!("url missing ':' separator: {raw}")))?;
        if resource_type.is_empty() {
            return Err(Error::invalid_input("url resource_type must not be empty"));
        }

        let (body, query) = match rest.split_once('&') {
            Some((b, q)) => (b, Some(q)),
            None => (rest, None),
        };

        let mut body = body;
        let mut bucket = Bucket::UNSPECIFIED;
        if let Some(stripped) = body.strip_prefix('[') {
            let (tag, after) = stripped
                .split_once(']')
                .ok_or_else(|| Error::invalid_input("unterminated bucket tag in url"))?;
            bucket = Bucket::from_raw(
                u32::from_str_radix(tag.trim_start_matches("0x"), 16)
                    .map_err(|_| Error::invalid_input(format!("bad bucket tag: {tag}")))?,
            );
            body = after;
        }

        let mut reference_node = None;
        if let Some(stripped) = body.strip_prefix('<') {
            let (tag, after) = stripped
                .split_once('>')
                .ok_or_else(|| Error::invalid_input("unterminated node tag in url"))?;
            reference_node = Some(NodeId::from_raw(
                u64::from_str_radix(tag.trim_start_matches("0x"), 16)
                    .map_err(|_| Error::invalid_input(format!("bad node tag: {tag}")))?,
            ));
            body = after;
        }

        let trimmed = body.trim_start_matches('/');
        let mut segments: Vec<String> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').map(|s| s.to_string()).collect()
        };
        let name = segments.pop().unwrap_or_default();

        let mut url = ResourceUrl {
            resource_type: resource_type.to_string(),
            bucket,
            reference_node,
            path: segments,
            name,
            options: Vec::new(),
        };

        if let Some(query) = query {
            for pair in query.split('&').filter(|s| !s.is_empty()) {
                let (k, v) = pair
                    .split_once('=')
                    .ok_or_else(|| Error::invalid_input(format!("bad option '{pair}' in url")))?;
                url.push_option(k, v)?;
            }
        }

        Ok(url)
    }

    pub fn push_option(&mut self, key: &str, value: &str) -> Result<()> {
        if self.options.iter().any(|(k, _)| k == key) {
            return Err(Error::invalid_input(format!("duplicate option key: {key}")));
        }
        self.options.push((key.to_string(), value.to_string()));
        Ok(())
    }

    pub fn set_option(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.options.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.options.push((key.to_string(), value));
        }
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn options(&self) -> &[(String, String)] {
        &self.options
    }

    /// A URL is reference-only when it lacks enough information (a concrete
    /// member list or node) to act without first asking the directory
    /// service. `local`/`lkv` pools are always self-sufficient; everything
    /// else needs a `reference_node` or an explicit `ref:` type.
    pub fn is_reference(&self) -> bool {
        self.resource_type == "ref"
            || (self.resource_type != "local"
                && self.resource_type != "lkv"
                && self.reference_node.is_none())
    }

    /// Path used to key the local/authority directory caches: bucket, type
    /// slot aside, it's the slash-joined path plus name.
    pub fn directory_path(&self) -> String {
        let mut full = self.path.clone();
        if !self.name.is_empty() {
            full.push(self.name.clone());
        }
        format!("/{}", full.join("/"))
    }

    /// Merge another URL's options onto this one, overwriting any key present
    /// in both. Used by `Connect` to apply the caller's original query
    /// options on top of a URL resolved through DirMan.
    pub fn merge_from(&mut self, other: &ResourceUrl) {
        for (k, v) in &other.options {
            self.set_option(k, v.clone());
        }
        if self.bucket.is_unspecified() && !other.bucket.is_unspecified() {
            self.bucket = other.bucket;
        }
    }

    /// Canonical string used as the pool registry's dedup key.
    pub fn pool_tag(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.resource_type)?;
        if !self.bucket.is_unspecified() {
            write!(f, "[{}]", self.bucket)?;
        }
        if let Some(node) = self.reference_node {
            write!(f, "<{}>", node.to_hex())?;
        }
        write!(f, "/{}", self.directory_path().trim_start_matches('/'))?;
        for (k, v) in &self.options {
            write!(f, "&{k}={v}")?;
        }
        Ok(())
    }
}
