use std::fmt;
use std::net::Ipv4Addr;

/// A 64-bit opaque node identifier, packing an IPv4 address, a port, and a
/// per-process instance tag (used to give multiple synthetic ranks on the
/// same loopback address distinct identities in tests).
///
/// Totally ordered by the wrapped integer; the ordering has no topological
/// meaning, it just makes `NodeId` usable as a `BTreeMap`/`Vec` sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    pub const UNSPECIFIED: NodeId = NodeId(0);
    pub const LOCALHOST: NodeId = NodeId(0x7f00_0001_0000_0000);

    pub const fn from_raw(bits: u64) -> Self {
        NodeId(bits)
    }

    pub fn new(ip: Ipv4Addr, port: u16, instance: u16) -> Self {
        let ip_bits = u32::from(ip) as u64;
        NodeId((ip_bits << 32) | ((port as u64) << 16) | instance as u64)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(((self.0 >> 32) & 0xffff_ffff) as u32)
    }

    pub fn port(&self) -> u16 {
        ((self.0 >> 16) & 0xffff) as u16
    }

    pub fn instance(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    pub fn is_unspecified(&self) -> bool {
        *self == NodeId::UNSPECIFIED
    }

    pub fn to_hex(&self) -> String {
        format!("0x{:016x}", self.0)
    }

    pub fn to_http_url(&self) -> String {
        format!("http://{}:{}/", self.ip(), self.port())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A 32-bit tenant tag scoping a namespace of keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Bucket(u32);

impl Bucket {
    pub const UNSPECIFIED: Bucket = Bucket(0);

    pub const fn from_raw(bits: u32) -> Self {
        Bucket(bits)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn is_unspecified(&self) -> bool {
        *self == Bucket::UNSPECIFIED
    }

    /// Returns `self` unless unspecified, in which case returns `default`.
    pub fn or(self, default: Bucket) -> Bucket {
        if self.is_unspecified() {
            default
        } else {
            self
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl From<u32> for Bucket {
    fn from(value: u32) -> Self {
        Bucket(value)
    }
}

impl From<&str> for Bucket {
    fn from(value: &str) -> Self {
        // Same scheme FAODEL uses for textual bucket names: hash to a u32 tag.
        Bucket(xxhash_rust::xxh3::xxh3_64(value.as_bytes()) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_roundtrips_ip_port() {
        let id = NodeId::new(Ipv4Addr::new(10, 0, 0, 5), 4321, 0);
        assert_eq!(id.ip(), Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(id.port(), 4321);
    }

    #[test]
    fn node_id_instances_differ() {
        let a = NodeId::new(Ipv4Addr::LOCALHOST, 0, 0);
        let b = NodeId::new(Ipv4Addr::LOCALHOST, 0, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn bucket_or_prefers_specified() {
        let specified = Bucket::from_raw(7);
        assert_eq!(Bucket::UNSPECIFIED.or(specified), specified);
        assert_eq!(specified.or(Bucket::from_raw(9)), specified);
    }
}
