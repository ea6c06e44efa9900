use std::sync::Arc;

use kelpie_common::{Bucket, Configuration, DirectoryInfo, Error, NodeId, ResourceUrl, Result};
use kelpie_net::Transport;
use kelpie_opbox::OpRuntime;

use crate::cache::DirectoryCache;
use crate::op::{dirman_opcode, DirManOp, DIRMAN_OPCODE_NAME};
use crate::wire::{DirManReply, DirManRequest};

/// Centralized DirMan: one authority node hosts the real `DirectoryCache`;
/// every other node forwards requests to it over a `DirManOp` RPC. Only
/// `dirman.type = centralized` is implemented — `none`/`static` name
/// resolution strategies the source also supports aren't built here.
pub struct DirManCore<T: Transport> {
    my_node: NodeId,
    authority: NodeId,
    am_root: bool,
    default_bucket: Bucket,
    cache: Arc<DirectoryCache>,
    opbox: Arc<OpRuntime<T>>,
}

impl<T: Transport + 'static> DirManCore<T> {
    pub fn new(
        config: &Configuration,
        my_node: NodeId,
        opbox: Arc<OpRuntime<T>>,
    ) -> Result<Arc<Self>> {
        let kind = config.get_or("dirman.type", "centralized");
        if kind != "centralized" {
            return Err(Error::invalid_input(format!(
                "dirman.type={kind} is not implemented; only \"centralized\" is"
            )));
        }
        let authority = match config.get("dirman.root.node") {
            Some(hex) => NodeId::from_raw(
                u64::from_str_radix(hex.trim_start_matches("0x"), 16)
                    .map_err(|_| Error::invalid_input(format!("bad dirman.root.node: {hex}")))?,
            ),
            None => my_node,
        };
        let default_bucket = config
            .get("dirman.bucket")
            .map(Bucket::from)
            .unwrap_or(Bucket::UNSPECIFIED);

        Ok(Arc::new(DirManCore {
            my_node,
            authority,
            am_root: my_node == authority,
            default_bucket,
            cache: Arc::new(DirectoryCache::new()),
            opbox,
        }))
    }

    pub fn my_node(&self) -> NodeId {
        self.my_node
    }

    pub fn authority(&self) -> NodeId {
        self.authority
    }

    pub fn am_root(&self) -> bool {
        self.am_root
    }

    /// Register the `DirManCentralized` op so requests that reach us over
    /// the wire get routed into this cache. Harmless to call on a
    /// non-authority node too — it just never receives any.
    pub async fn install(&self) -> Result<()> {
        let cache = self.cache.clone();
        self.opbox
            .register_op(
                dirman_opcode(),
                DIRMAN_OPCODE_NAME,
                Arc::new(move || {
                    let cache = cache.clone();
                    Box::new(DirManOp::target(Arc::new(move |req| handle(&cache, req))))
                        as Box<dyn kelpie_opbox::Op<T>>
                }),
            )
            .await
    }

    /// Fill in a default bucket and stamp the authority as the URL's
    /// reference node — URLs an authority hands back always point back at
    /// itself for the next lookup.
    pub fn localize(&self, url: &ResourceUrl) -> ResourceUrl {
        let mut url = url.clone();
        url.bucket = url.bucket.or(self.default_bucket);
        url.reference_node = Some(self.authority);
        url
    }

    async fn remote_call(&self, request: DirManRequest) -> Result<DirManReply> {
        if self.am_root {
            return Ok(handle(&self.cache, request));
        }
        let (op, rx) = DirManOp::origin(self.authority, request);
        self.opbox.launch_op(Box::new(op)).await?;
        rx.await
            .map_err(|_| Error::communication("dirman op dropped before replying"))?
    }

    /// Consults `dc_others` first when `check_local`; on a miss, and only
    /// when `check_remote`, asks the authority and links the reply (plus
    /// every ancestor path) back into the cache. The authority itself never
    /// needs `dc_others` — its own `dc_mine` is already the live truth — so
    /// it always answers from `remote_call` directly.
    pub async fn get_directory_info(
        &self,
        url: &ResourceUrl,
        check_local: bool,
        check_remote: bool,
    ) -> Result<Option<DirectoryInfo>> {
        let url = self.localize(url);
        let path = url.directory_path();

        if check_local && !self.am_root {
            if let Some(dir) = self.cache.get_other(&path) {
                return Ok(Some(dir));
            }
        }
        if !check_remote {
            return Ok(None);
        }
        let reply = self
            .remote_call(DirManRequest::GetDirectoryInfo { url })
            .await?;
        if let Some(dir) = &reply.dir {
            if !self.am_root {
                self.cache.insert_other_with_ancestors(&path, dir.clone());
            }
        }
        Ok(reply.dir)
    }

    pub async fn define_new_dir(&self, url: &ResourceUrl) -> Result<DirectoryInfo> {
        let url = self.localize(url);
        let reply = self
            .remote_call(DirManRequest::DefineNewDir { url })
            .await?;
        into_result(reply)
    }

    pub async fn host_new_dir(&self, dir: DirectoryInfo) -> Result<DirectoryInfo> {
        let reply = self
            .remote_call(DirManRequest::HostNewDir { dir })
            .await?;
        into_result(reply)
    }

    pub async fn join_dir_with_name(
        &self,
        url: &ResourceUrl,
        name: Option<&str>,
    ) -> Result<DirectoryInfo> {
        let url = self.localize(url);
        let reply = self
            .remote_call(DirManRequest::JoinDirWithName {
                url,
                name: name.map(str::to_string),
                node: self.my_node,
            })
            .await?;
        into_result(reply)
    }

    pub async fn leave_dir(&self, url: &ResourceUrl) -> Result<DirectoryInfo> {
        let url = self.localize(url);
        let reply = self
            .remote_call(DirManRequest::LeaveDir { url, node: self.my_node })
            .await?;
        into_result(reply)
    }

    pub async fn drop_dir(&self, url: &ResourceUrl) -> Result<()> {
        let url = self.localize(url);
        self.remote_call(DirManRequest::DropDir { url }).await?;
        Ok(())
    }
}

fn into_result(reply: DirManReply) -> Result<DirectoryInfo> {
    match reply.dir {
        Some(dir) => Ok(dir),
        None => Err(Error::invalid_input(reply.error.unwrap_or_default())),
    }
}

/// The authority-side request handler. Run either in-process (root node,
/// `remote_call` short-circuits to this directly) or from `DirManOp::Target`
/// after a request arrives over the wire — one implementation, two callers.
fn handle(cache: &DirectoryCache, request: DirManRequest) -> DirManReply {
    match request {
        DirManRequest::GetDirectoryInfo { url } => {
            let path = url.directory_path();
            match cache.get_mine(&path) {
                Some(mut dir) => {
                    for child in cache.children_of(&path) {
                        if !dir.contains_name(&child) {
                            dir.members.push((child, NodeId::UNSPECIFIED));
                        }
                    }
                    DirManReply::ok(dir)
                }
                None => DirManReply::err(format!("no such directory: {path}")),
            }
        }
        DirManRequest::DefineNewDir { url } => match cache.define(&url) {
            Ok(dir) => DirManReply::ok(dir),
            Err(err) => DirManReply::err(err.to_string()),
        },
        DirManRequest::HostNewDir { dir } => match cache.host(dir) {
            Ok(dir) => DirManReply::ok(dir),
            Err(err) => DirManReply::err(err.to_string()),
        },
        DirManRequest::JoinDirWithName { url, name, node } => {
            match cache.join(&url, name.as_deref(), node) {
                Ok(dir) => DirManReply::ok(dir),
                Err(err) => DirManReply::err(err.to_string()),
            }
        }
        DirManRequest::LeaveDir { url, node } => match cache.leave(&url, node) {
            Ok(dir) => DirManReply::ok(dir),
            Err(err) => DirManReply::err(err.to_string()),
        },
        DirManRequest::DropDir { url } => {
            cache.drop_mine(&url);
            DirManReply::ok(DirectoryInfo::new(url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelpie_net::LoopbackNetwork;

    fn url(path: &str) -> ResourceUrl {
        ResourceUrl::parse(&format!("dht:{path}")).unwrap()
    }

    async fn root_core(node: NodeId) -> Arc<DirManCore<kelpie_net::LoopbackTransport>> {
        let network = LoopbackNetwork::new();
        let (transport, rx) = network.join(node);
        let opbox = OpRuntime::new(Arc::new(transport));
        let cfg = Configuration::from_pairs([("dirman.root.node", node.to_hex())]);
        let core = DirManCore::new(&cfg, node, opbox.clone()).unwrap();
        core.install().await.unwrap();
        opbox.start();
        tokio::spawn(opbox.recv_loop(rx));
        core
    }

    #[tokio::test]
    async fn root_host_new_dir_then_get_directory_info_lists_child() {
        let node = NodeId::from_raw(1);
        let core = root_core(node).await;
        core.host_new_dir(DirectoryInfo::new(url("/a/b/c")))
            .await
            .unwrap();
        let parent = core.get_directory_info(&url("/a/b"), true, true).await.unwrap().unwrap();
        assert!(parent.contains_name("c"));
    }

    #[tokio::test]
    async fn non_authority_caches_reply_and_ancestors_in_dc_others() {
        let authority = NodeId::from_raw(1);
        let other = NodeId::from_raw(2);
        let network = LoopbackNetwork::new();
        let (transport, rx) = network.join(other);
        let opbox = OpRuntime::new(Arc::new(transport));
        let cfg = Configuration::from_pairs([("dirman.root.node", authority.to_hex())]);
        let core = DirManCore::new(&cfg, other, opbox.clone()).unwrap();
        core.install().await.unwrap();
        opbox.start();
        tokio::spawn(opbox.recv_loop(rx));

        let root = root_core(authority).await;
        root.host_new_dir(DirectoryInfo::new(url("/a/b/c"))).await.unwrap();

        assert!(core.cache.get_other("/a/b/c").is_none());
        let dir = core.get_directory_info(&url("/a/b/c"), true, true).await.unwrap().unwrap();
        assert!(dir.url.directory_path() == "/a/b/c");
        assert!(core.cache.get_other("/a/b/c").is_some());
        assert!(core.cache.get_other("/a/b").unwrap().contains_name("c"));

        // check_remote=false now answers from cache alone, no wire call needed.
        let cached = core
            .get_directory_info(&url("/a/b/c"), true, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.url.directory_path(), "/a/b/c");
    }

    #[tokio::test]
    async fn root_join_without_define_auto_vivifies_and_reports_member() {
        let node = NodeId::from_raw(1);
        let core = root_core(node).await;
        let dir = core
            .join_dir_with_name(&url("/myplace"), Some("worker0"))
            .await
            .unwrap();
        assert!(dir.contains_name("worker0"));
    }

    #[tokio::test]
    async fn localize_stamps_authority_as_reference_node() {
        let node = NodeId::from_raw(1);
        let core = root_core(node).await;
        let localized = core.localize(&url("/x"));
        assert_eq!(localized.reference_node, Some(node));
    }
}
