use bytes::Bytes;

/// An RTP header extension element, already lifted out of its RFC 5285
/// container by the upstream parser.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extension {
    pub id: u8,
    pub payload: Bytes,
}

/// A decoded RTP header.
///
/// Wire parsing and serialization happen upstream; this type only carries
/// the fields the receiver core consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extensions: Vec<Extension>,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            version: 2,
            padding: false,
            extension: false,
            marker: false,
            payload_type: 0,
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0,
            csrc: vec![],
            extensions: vec![],
        }
    }
}

impl Header {
    /// Returns the payload of the extension with the given id, if present.
    pub fn get_extension(&self, id: u8) -> Option<Bytes> {
        self.extensions
            .iter()
            .find(|ext| ext.id == id)
            .map(|ext| ext.payload.clone())
    }

    /// Sets the payload of the extension with the given id, replacing any
    /// existing payload under the same id.
    pub fn set_extension(&mut self, id: u8, payload: Bytes) {
        self.extension = true;
        if let Some(ext) = self.extensions.iter_mut().find(|ext| ext.id == id) {
            ext.payload = payload;
        } else {
            self.extensions.push(Extension { id, payload });
        }
    }
}
