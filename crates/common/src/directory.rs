use crate::error::{Error, Result};
use crate::node::NodeId;
use crate::url::ResourceUrl;

/// A named resource's membership list, as tracked by DirMan.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DirectoryInfo {
    pub url: ResourceUrl,
    pub info_text: String,
    pub min_members: usize,
    pub members: Vec<(String, NodeId)>,
}

impl DirectoryInfo {
    pub fn new(url: ResourceUrl) -> Self {
        DirectoryInfo {
            url,
            info_text: String::new(),
            min_members: 0,
            members: Vec::new(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.members.len() >= self.min_members
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.members.iter().any(|(n, _)| n == name)
    }

    pub fn member_node(&self, name: &str) -> Option<NodeId> {
        self.members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| *node)
    }

    /// Append `{name or generated, node}`. The generated name is deterministic
    /// from the current member count so repeated joins from a deterministic
    /// sequence of callers always produce the same names.
    pub fn join(&mut self, name: Option<&str>, node: NodeId) -> Result<&str> {
        let name = match name {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("rank{}", self.members.len()),
        };
        if self.contains_name(&name) {
            return Err(Error::invalid_input(format!(
                "directory {} already has a member named {name}",
                self.url
            )));
        }
        self.members.push((name, node));
        Ok(self.members.last().unwrap().0.as_str())
    }

    /// Remove every membership entry belonging to `node`. Not being a member
    /// is a no-op success, matching the source's idempotent LeaveDir.
    pub fn leave(&mut self, node: NodeId) {
        self.members.retain(|(_, n)| *n != node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> ResourceUrl {
        ResourceUrl::parse("dht:/myplace").unwrap()
    }

    #[test]
    fn join_generates_deterministic_names() {
        let mut dir = DirectoryInfo::new(url());
        dir.join(None, NodeId::from_raw(1)).unwrap();
        dir.join(None, NodeId::from_raw(2)).unwrap();
        assert_eq!(dir.members[0].0, "rank0");
        assert_eq!(dir.members[1].0, "rank1");
    }

    #[test]
    fn join_rejects_duplicate_names() {
        let mut dir = DirectoryInfo::new(url());
        dir.join(Some("a"), NodeId::from_raw(1)).unwrap();
        let err = dir.join(Some("a"), NodeId::from_raw(2)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn leave_is_noop_for_non_member() {
        let mut dir = DirectoryInfo::new(url());
        dir.join(Some("a"), NodeId::from_raw(1)).unwrap();
        dir.leave(NodeId::from_raw(99));
        assert_eq!(dir.members.len(), 1);
    }
}
