use kelpie_common::{DirectoryInfo, NodeId, ResourceUrl};

/// Body of a DirMan request, serialized with `serde_json` into the op's
/// outgoing [`kelpie_net::Message`]. One variant per centralized-authority
/// operation the spec names. `Join`/`Leave` carry the joining/leaving node
/// explicitly rather than reading it off `url.reference_node`, since that
/// field names the authority, not the caller.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum DirManRequest {
    GetDirectoryInfo { url: ResourceUrl },
    DefineNewDir { url: ResourceUrl },
    HostNewDir { dir: DirectoryInfo },
    JoinDirWithName { url: ResourceUrl, name: Option<String>, node: NodeId },
    LeaveDir { url: ResourceUrl, node: NodeId },
    DropDir { url: ResourceUrl },
}

/// Reply body. `dir` carries the resulting directory on success; `error`
/// carries a human-readable message on failure. Only one is ever populated,
/// but neither is wrapped in a wire-level enum so failures still round-trip
/// through `serde_json` without needing a custom error serializer.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DirManReply {
    pub dir: Option<DirectoryInfo>,
    pub error: Option<String>,
}

impl DirManReply {
    pub fn ok(dir: DirectoryInfo) -> Self {
        DirManReply { dir: Some(dir), error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        DirManReply { dir: None, error: Some(message.into()) }
    }
}
