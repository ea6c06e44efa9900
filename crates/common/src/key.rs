use std::fmt;

/// A row/column key pair. `k1` ("row") selects a target node under a
/// placement policy; `k2` ("column") distinguishes items within a row.
/// Either half may end in `*` to form a prefix wildcard. `k1` may carry an
/// optional integer tag, written `"name{0xN}"`, consumed by TFT pools.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Key {
    k1: String,
    k2: String,
}

impl Key {
    pub fn new(k1: impl Into<String>, k2: impl Into<String>) -> Self {
        Key {
            k1: k1.into(),
            k2: k2.into(),
        }
    }

    pub fn k1(&self) -> &str {
        match self.k1.rsplit_once('{') {
            Some((name, tag)) if tag.ends_with('}') => name,
            _ => &self.k1,
        }
    }

    pub fn k2(&self) -> &str {
        &self.k2
    }

    /// Extract the integer K1 tag encoded as `name{0xN}`, if present.
    pub fn k1_tag(&self) -> Option<u64> {
        let (_, tag) = self.k1.rsplit_once('{')?;
        let tag = tag.strip_suffix('}')?;
        let digits = tag.trim_start_matches("0x").trim_start_matches("0X");
        u64::from_str_radix(digits, 16).ok()
    }

    pub fn with_k1_tag(k1: impl Into<String>, k2: impl Into<String>, tag: u64) -> Self {
        Key {
            k1: format!("{}{{0x{:x}}}", k1.into(), tag),
            k2: k2.into(),
        }
    }

    pub fn is_k1_wildcard(&self) -> bool {
        self.k1().ends_with('*')
    }

    pub fn is_k2_wildcard(&self) -> bool {
        self.k2 == "*" || self.k2.ends_with('*')
    }

    pub fn is_wildcard(&self) -> bool {
        self.is_k1_wildcard() || self.is_k2_wildcard()
    }

    /// Does `self` (used as a search pattern) match a concrete `other` key?
    pub fn matches(&self, other: &Key) -> bool {
        prefix_match(self.k1(), other.k1()) && prefix_match(&self.k2, &other.k2)
    }
}

fn prefix_match(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => candidate.starts_with(prefix),
        None => pattern == candidate,
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.k1, self.k2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k1_tag_parses_hex() {
        let key = Key::with_k1_tag("myrow", "col", 0x2a);
        assert_eq!(key.k1(), "myrow");
        assert_eq!(key.k1_tag(), Some(0x2a));
    }

    #[test]
    fn untagged_key_has_no_tag() {
        let key = Key::new("myrow", "col");
        assert_eq!(key.k1_tag(), None);
    }

    #[test]
    fn wildcard_matching() {
        let pattern = Key::new("foo*", "*");
        assert!(pattern.matches(&Key::new("foobar", "anything")));
        assert!(!pattern.matches(&Key::new("bar", "anything")));
    }

    #[test]
    fn exact_match_requires_equality() {
        let pattern = Key::new("foo", "bar");
        assert!(pattern.matches(&Key::new("foo", "bar")));
        assert!(!pattern.matches(&Key::new("foo", "baz")));
    }
}
