use bytes::{Buf, BufMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

pub const TRANSPORT_CC_EXTENSION_SIZE: usize = 2;

/// The transport-wide sequence number carried in the RTP header extension
/// registered as
/// <http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01>.
///
/// ```text
///  0                   1
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       transport-wide seq      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransportCcExtension {
    pub transport_sequence: u16,
}

impl MarshalSize for TransportCcExtension {
    fn marshal_size(&self) -> usize {
        TRANSPORT_CC_EXTENSION_SIZE
    }
}

impl Marshal for TransportCcExtension {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.len() < TRANSPORT_CC_EXTENSION_SIZE {
            return Err(Error::ErrBufferTooSmall);
        }
        buf.put_u16(self.transport_sequence);
        Ok(TRANSPORT_CC_EXTENSION_SIZE)
    }
}

impl Unmarshal for TransportCcExtension {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        B: Buf,
    {
        if buf.remaining() < TRANSPORT_CC_EXTENSION_SIZE {
            return Err(Error::ErrBufferTooSmall);
        }
        let transport_sequence = buf.get_u16();
        Ok(TransportCcExtension { transport_sequence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_cc_extension_roundtrip() {
        let ext = TransportCcExtension {
            transport_sequence: 0xABCD,
        };
        let raw = ext.marshal().unwrap();
        assert_eq!(&raw[..], &[0xAB, 0xCD]);

        let decoded = TransportCcExtension::unmarshal(&mut raw.freeze()).unwrap();
        assert_eq!(decoded, ext);
    }

    #[test]
    fn test_transport_cc_extension_too_short() {
        let mut raw = &[0xABu8][..];
        assert_eq!(
            TransportCcExtension::unmarshal(&mut raw),
            Err(Error::ErrBufferTooSmall)
        );
    }
}
