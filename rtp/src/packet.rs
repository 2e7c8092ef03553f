use bytes::Bytes;

use crate::header::Header;

/// A decoded RTP packet: header fields plus the opaque media payload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
}
