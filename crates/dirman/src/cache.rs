use std::collections::HashMap;
use std::sync::RwLock;

use kelpie_common::{DirectoryInfo, Error, NodeId, Result, ResourceUrl};

/// The authority's own directories (`dc_mine`) and, symmetrically, the
/// lookup cache every non-authority node keeps of directories it has
/// resolved (`dc_others`). A centralized DirMan only ever populates one of
/// the two in a given process, but both tables live on every node so the
/// same `DirManCore` type works whether or not it happens to be the
/// authority.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    dc_mine: RwLock<HashMap<String, DirectoryInfo>>,
    dc_others: RwLock<HashMap<String, DirectoryInfo>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_mine(&self, path: &str) -> Option<DirectoryInfo> {
        self.dc_mine.read().unwrap().get(path).cloned()
    }

    pub fn get_other(&self, path: &str) -> Option<DirectoryInfo> {
        self.dc_others.read().unwrap().get(path).cloned()
    }

    pub fn insert_other(&self, path: &str, dir: DirectoryInfo) {
        self.dc_others.write().unwrap().insert(path.to_string(), dir);
    }

    /// Link a `GetDirectoryInfo` reply into `dc_others` at `path`, and stub
    /// in every ancestor path too (if not already cached) so a later lookup
    /// of a parent directory can answer "child X exists" from cache alone.
    pub fn insert_other_with_ancestors(&self, path: &str, dir: DirectoryInfo) {
        let mut others = self.dc_others.write().unwrap();
        others.insert(path.to_string(), dir.clone());
        let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        for i in (0..segments.len()).rev() {
            let ancestor_path = format!("/{}", segments[..i].join("/"));
            let child_name = segments[i].to_string();
            let entry = others
                .entry(ancestor_path)
                .or_insert_with(|| DirectoryInfo::new(ResourceUrl::new(dir.url.resource_type.clone())));
            if !entry.contains_name(&child_name) {
                entry.members.push((child_name, NodeId::UNSPECIFIED));
            }
        }
    }

    fn ancestors(path: &str) -> Vec<String> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        let mut out = Vec::new();
        for i in 0..segments.len() {
            out.push(format!("/{}", segments[..i].join("/")));
        }
        out
    }

    /// Authority-side: create a new empty directory at `url`'s path,
    /// creating any missing ancestor directories along the way. Fails if
    /// the exact path already exists.
    pub fn define(&self, url: &ResourceUrl) -> Result<DirectoryInfo> {
        let path = url.directory_path();
        let mut mine = self.dc_mine.write().unwrap();
        if mine.contains_key(&path) {
            return Err(Error::already_exists(format!("directory already exists: {path}")));
        }
        for ancestor in Self::ancestors(&path) {
            mine.entry(ancestor.clone())
                .or_insert_with(|| DirectoryInfo::new(ResourceUrl::new(url.resource_type.clone())));
        }
        let dir = DirectoryInfo::new(url.clone());
        mine.insert(path, dir.clone());
        Ok(dir)
    }

    /// Authority-side: install a fully formed directory (e.g. one shipped
    /// from a `HostNewDir(DirectoryInfo)` call), same existence rule as
    /// `define`.
    pub fn host(&self, dir: DirectoryInfo) -> Result<DirectoryInfo> {
        let path = dir.url.directory_path();
        let mut mine = self.dc_mine.write().unwrap();
        if mine.contains_key(&path) {
            return Err(Error::already_exists(format!("directory already exists: {path}")));
        }
        for ancestor in Self::ancestors(&path) {
            mine.entry(ancestor.clone())
                .or_insert_with(|| DirectoryInfo::new(dir.url.clone()));
        }
        mine.insert(path, dir.clone());
        Ok(dir)
    }

    /// Authority-side join. Auto-vivifies an empty directory if the path
    /// hasn't been explicitly defined yet — matches the centralized source
    /// letting `JoinDirWithoutName` stand alone without a prior `Define`.
    pub fn join(&self, url: &ResourceUrl, name: Option<&str>, node: NodeId) -> Result<DirectoryInfo> {
        let path = url.directory_path();
        let mut mine = self.dc_mine.write().unwrap();
        let dir = mine
            .entry(path)
            .or_insert_with(|| DirectoryInfo::new(url.clone()));
        dir.join(name, node)?;
        Ok(dir.clone())
    }

    pub fn leave(&self, url: &ResourceUrl, node: NodeId) -> Result<DirectoryInfo> {
        let path = url.directory_path();
        let mut mine = self.dc_mine.write().unwrap();
        let dir = mine
            .get_mut(&path)
            .ok_or_else(|| Error::NotFound)?;
        dir.leave(node);
        Ok(dir.clone())
    }

    /// Removing an entry that isn't there is a no-op success.
    pub fn drop_mine(&self, url: &ResourceUrl) {
        self.dc_mine.write().unwrap().remove(&url.directory_path());
    }

    /// Immediate child path segments of `path`, derived from every key
    /// currently in `dc_mine` rather than stored redundantly — so
    /// `GetDirectoryInfo("/a/b")` can report that `"/a/b/c"` exists as a
    /// member named `"c"` without `define`/`host` having to maintain that
    /// relationship by hand.
    pub fn children_of(&self, path: &str) -> Vec<String> {
        let mine = self.dc_mine.read().unwrap();
        let prefix = if path == "/" { String::new() } else { path.to_string() };
        let mut names: Vec<String> = mine
            .keys()
            .filter_map(|k| {
                let rest = k.strip_prefix(&prefix)?.strip_prefix('/')?;
                if rest.is_empty() || rest.contains('/') {
                    None
                } else {
                    Some(rest.to_string())
                }
            })
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> ResourceUrl {
        ResourceUrl::parse(&format!("dht:{path}")).unwrap()
    }

    #[test]
    fn define_creates_parent_dirs() {
        let cache = DirectoryCache::new();
        cache.define(&url("/a/b/c")).unwrap();
        assert!(cache.get_mine("/a").is_some());
        assert!(cache.get_mine("/a/b").is_some());
        assert!(cache.get_mine("/a/b/c").is_some());
    }

    #[test]
    fn define_twice_fails() {
        let cache = DirectoryCache::new();
        cache.define(&url("/a")).unwrap();
        assert!(matches!(cache.define(&url("/a")), Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn join_without_define_auto_vivifies() {
        let cache = DirectoryCache::new();
        let dir = cache.join(&url("/myplace"), None, NodeId::from_raw(1)).unwrap();
        assert_eq!(dir.members.len(), 1);
    }

    #[test]
    fn insert_other_with_ancestors_stubs_in_parent_paths() {
        let cache = DirectoryCache::new();
        cache.insert_other_with_ancestors("/a/b/c", DirectoryInfo::new(url("/a/b/c")));
        assert!(cache.get_other("/a/b/c").is_some());
        assert!(cache.get_other("/a/b").unwrap().contains_name("c"));
        assert!(cache.get_other("/a").unwrap().contains_name("b"));
    }

    #[test]
    fn children_of_reports_immediate_child_names_only() {
        let cache = DirectoryCache::new();
        cache.define(&url("/a/b/c")).unwrap();
        cache.define(&url("/a/b/d/e")).unwrap();
        assert_eq!(cache.children_of("/a/b"), vec!["c".to_string(), "d".to_string()]);
        assert_eq!(cache.children_of("/a"), vec!["b".to_string()]);
        assert!(cache.children_of("/a/b/c").is_empty());
    }
}
