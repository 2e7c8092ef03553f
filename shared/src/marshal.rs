use bytes::{Buf, BytesMut};

use crate::error::{Error, Result};

/// Reports how many bytes a value occupies once marshaled.
pub trait MarshalSize {
    fn marshal_size(&self) -> usize;
}

/// Serializes a value into network byte order.
pub trait Marshal: MarshalSize {
    /// Writes the value into `buf`, which must hold at least
    /// [`marshal_size`](MarshalSize::marshal_size) bytes. Returns the number
    /// of bytes written.
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize>;

    fn marshal(&self) -> Result<BytesMut> {
        let l = self.marshal_size();
        let mut buf = BytesMut::with_capacity(l);
        buf.resize(l, 0);
        let n = self.marshal_to(&mut buf)?;
        if n != l {
            return Err(Error::WrongMarshalSize);
        }
        Ok(buf)
    }
}

/// Parses a value out of a byte source, advancing it past the consumed bytes.
pub trait Unmarshal: MarshalSize {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf;
}
