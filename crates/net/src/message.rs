use bytes::Bytes;
use kelpie_common::NodeId;

/// The fixed header every inter-node exchange begins with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub src: NodeId,
    pub dst: NodeId,
    pub src_mailbox: u64,
    pub dst_mailbox: u64,
    pub op_id: u32,
    pub body_len: u32,
    pub user_flags: u16,
    pub hdr_flags: u16,
}

/// Bit in `hdr_flags` distinguishing a URL-string body from a serialized
/// structured body (mirrors `msg_dirman.hh`'s discriminator).
pub const HDR_FLAG_STRUCTURED_BODY: u16 = 0x1;

#[derive(Debug, Clone)]
pub struct Message {
    pub header: MessageHeader,
    pub body: Bytes,
}

impl Message {
    pub fn new(header: MessageHeader, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let mut header = header;
        header.body_len = body.len() as u32;
        Message { header, body }
    }

    /// Build a request carrying a UTF-8 string body (e.g. a `ResourceUrl`).
    pub fn allocate_string_request(
        src: NodeId,
        dst: NodeId,
        src_mailbox: u64,
        op_id: u32,
        user_flags: u16,
        body: impl Into<String>,
    ) -> Self {
        Message::new(
            MessageHeader {
                src,
                dst,
                src_mailbox,
                dst_mailbox: 0,
                op_id,
                body_len: 0,
                user_flags,
                hdr_flags: 0,
            },
            body.into().into_bytes(),
        )
    }

    /// Build a reply to `request`: src/dst swap, and the request's
    /// `src_mailbox` becomes the reply's `dst_mailbox` so the origin can
    /// route it back to the waiting op.
    pub fn allocate_reply(request: &Message, user_flags: u16, body: impl Into<Bytes>) -> Self {
        Message::new(
            MessageHeader {
                src: request.header.dst,
                dst: request.header.src,
                src_mailbox: 0,
                dst_mailbox: request.header.src_mailbox,
                op_id: request.header.op_id,
                body_len: 0,
                user_flags,
                hdr_flags: 0,
            },
            body,
        )
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u64) -> NodeId {
        NodeId::from_raw(n)
    }

    #[test]
    fn reply_preserves_src_mailbox_as_dst_mailbox() {
        let request = Message::allocate_string_request(node(1), node(2), 77, 9, 0, "dht:/x");
        let reply = Message::allocate_reply(&request, 0, Bytes::new());
        assert_eq!(reply.header.dst_mailbox, 77);
        assert_eq!(reply.header.src, node(2));
        assert_eq!(reply.header.dst, node(1));
    }

    #[test]
    fn body_len_tracks_body_size() {
        let msg = Message::allocate_string_request(node(1), node(2), 1, 1, 0, "hello");
        assert_eq!(msg.header.body_len, 5);
    }
}
