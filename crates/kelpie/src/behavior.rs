/// `pool_behavior_t`: a bitset over what a pool does on write and read,
/// stored as a plain `u8` the way [`kelpie_net::HDR_FLAG_STRUCTURED_BODY`]
/// flags a message header — no need for a bitflags dependency at this size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolBehavior(u8);

impl PoolBehavior {
    pub const WRITE_TO_LOCAL: PoolBehavior = PoolBehavior(1 << 0);
    pub const WRITE_TO_REMOTE: PoolBehavior = PoolBehavior(1 << 1);
    pub const WRITE_TO_IOM: PoolBehavior = PoolBehavior(1 << 2);
    pub const READ_TO_LOCAL: PoolBehavior = PoolBehavior(1 << 3);
    pub const READ_TO_REMOTE: PoolBehavior = PoolBehavior(1 << 4);

    pub const WRITE_AROUND: PoolBehavior = PoolBehavior(Self::WRITE_TO_REMOTE.0 | Self::WRITE_TO_IOM.0);
    pub const WRITE_ALL: PoolBehavior =
        PoolBehavior(Self::WRITE_TO_LOCAL.0 | Self::WRITE_TO_REMOTE.0 | Self::WRITE_TO_IOM.0);
    pub const DEFAULT_IOM: PoolBehavior = PoolBehavior(Self::WRITE_TO_IOM.0 | Self::READ_TO_LOCAL.0);
    pub const DEFAULT_LOCAL_IOM: PoolBehavior =
        PoolBehavior(Self::WRITE_TO_LOCAL.0 | Self::WRITE_TO_IOM.0 | Self::READ_TO_LOCAL.0);
    pub const DEFAULT_REMOTE_IOM: PoolBehavior =
        PoolBehavior(Self::WRITE_TO_REMOTE.0 | Self::WRITE_TO_IOM.0 | Self::READ_TO_REMOTE.0);
    pub const DEFAULT_CACHING_IOM: PoolBehavior = PoolBehavior(
        Self::WRITE_TO_LOCAL.0 | Self::WRITE_TO_IOM.0 | Self::READ_TO_LOCAL.0 | Self::READ_TO_REMOTE.0,
    );

    pub fn contains(self, other: PoolBehavior) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: PoolBehavior) -> PoolBehavior {
        PoolBehavior(self.0 | other.0)
    }

    /// Parse one of the named aggregates recognized in a `behavior=` URL
    /// option.
    pub fn parse(name: &str) -> Option<PoolBehavior> {
        match name {
            "WriteAround" => Some(Self::WRITE_AROUND),
            "WriteAll" => Some(Self::WRITE_ALL),
            "DefaultIOM" => Some(Self::DEFAULT_IOM),
            "DefaultLocalIOM" => Some(Self::DEFAULT_LOCAL_IOM),
            "DefaultRemoteIOM" => Some(Self::DEFAULT_REMOTE_IOM),
            "DefaultCachingIOM" => Some(Self::DEFAULT_CACHING_IOM),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_around_skips_local() {
        assert!(!PoolBehavior::WRITE_AROUND.contains(PoolBehavior::WRITE_TO_LOCAL));
        assert!(PoolBehavior::WRITE_AROUND.contains(PoolBehavior::WRITE_TO_REMOTE));
    }

    #[test]
    fn parse_rejects_unknown_name() {
        assert!(PoolBehavior::parse("Bogus").is_none());
    }

    #[test]
    fn union_combines_flags() {
        let combined = PoolBehavior::WRITE_TO_LOCAL.union(PoolBehavior::READ_TO_REMOTE);
        assert!(combined.contains(PoolBehavior::WRITE_TO_LOCAL));
        assert!(combined.contains(PoolBehavior::READ_TO_REMOTE));
        assert!(!combined.contains(PoolBehavior::WRITE_TO_IOM));
    }
}
