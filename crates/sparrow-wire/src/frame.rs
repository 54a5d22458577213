use crate::error::FrameError;

/// `length(4) | protocol_type(1) | protocol_uri(4) | checksum(4) | trace_id(32)`
pub const HEADER_SIZE: usize = 4 + 1 + 4 + 4 + 32;
pub const TRACE_ID_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    /// Schema-described payload, decoded through a registered type.
    Schema = 0,
    /// Reflection-free binary payload, hand-encoded per type.
    Binary = 1,
}

impl ProtocolKind {
    pub const fn from_u8(v: u8) -> Result<Self, FrameError> {
        match v {
            0 => Ok(Self::Schema),
            1 => Ok(Self::Binary),
            other => Err(FrameError::UnknownProtocolType(other)),
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame length, header included.
    pub length: u32,
    pub protocol_type: u8,
    pub protocol_uri: u32,
    /// Reserved. Preserved on the wire, never validated.
    pub checksum: u32,
    pub trace_id: [u8; TRACE_ID_SIZE],
}

impl FrameHeader {
    pub fn new(payload_len: usize, protocol_type: ProtocolKind, protocol_uri: u32) -> Self {
        Self {
            length: (HEADER_SIZE + payload_len) as u32,
            protocol_type: protocol_type.as_u8(),
            protocol_uri,
            checksum: 0,
            trace_id: [0u8; TRACE_ID_SIZE],
        }
    }

    pub fn with_trace_id(mut self, trace_id: [u8; TRACE_ID_SIZE]) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Builds a header from an already-validated raw `protocol_type` byte,
    /// for callers (the server's dispatch path) replying with the same
    /// protocol family a just-decoded header named, without re-checking it.
    pub fn new_raw(payload_len: usize, protocol_type: u8, protocol_uri: u32) -> Self {
        Self {
            length: (HEADER_SIZE + payload_len) as u32,
            protocol_type,
            protocol_uri,
            checksum: 0,
            trace_id: [0u8; TRACE_ID_SIZE],
        }
    }

    pub const fn payload_len(&self) -> usize {
        self.length as usize - HEADER_SIZE
    }

    pub fn encode(&self, out: &mut [u8; HEADER_SIZE]) {
        out[0..4].copy_from_slice(&self.length.to_be_bytes());
        out[4] = self.protocol_type;
        out[5..9].copy_from_slice(&self.protocol_uri.to_be_bytes());
        out[9..13].copy_from_slice(&self.checksum.to_be_bytes());
        out[13..13 + TRACE_ID_SIZE].copy_from_slice(&self.trace_id);
    }

    /// Decodes a header from exactly `HEADER_SIZE` bytes. Does not itself
    /// check `length` against the buffer it came from; callers first peek
    /// the length field via [`peek_frame_length`] and only decode once a
    /// full frame is known to be buffered.
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Result<Self, FrameError> {
        let length = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        if (length as usize) < HEADER_SIZE {
            return Err(FrameError::TooShort);
        }
        let protocol_type = bytes[4];
        ProtocolKind::from_u8(protocol_type)?;
        let protocol_uri = u32::from_be_bytes(bytes[5..9].try_into().unwrap());
        let checksum = u32::from_be_bytes(bytes[9..13].try_into().unwrap());
        let mut trace_id = [0u8; TRACE_ID_SIZE];
        trace_id.copy_from_slice(&bytes[13..13 + TRACE_ID_SIZE]);
        Ok(Self { length, protocol_type, protocol_uri, checksum, trace_id })
    }
}

/// Reads just the `length` field out of a peeked prefix, used by the codec
/// to decide whether a whole frame is buffered yet without committing to a
/// full header decode.
pub fn peek_frame_length(prefix: &[u8]) -> Result<u32, FrameError> {
    if prefix.len() < 4 {
        return Err(FrameError::Incomplete);
    }
    let length = u32::from_be_bytes(prefix[0..4].try_into().unwrap());
    if (length as usize) < HEADER_SIZE {
        return Err(FrameError::TooShort);
    }
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = FrameHeader::new(128, ProtocolKind::Binary, 0xC865).with_trace_id([7u8; 32]);
        let mut wire = [0u8; HEADER_SIZE];
        header.encode(&mut wire);
        let decoded = FrameHeader::decode(&wire).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.payload_len(), 128);
    }

    #[test]
    fn rejects_length_shorter_than_header() {
        let mut wire = [0u8; HEADER_SIZE];
        wire[0..4].copy_from_slice(&10u32.to_be_bytes());
        assert_eq!(FrameHeader::decode(&wire), Err(FrameError::TooShort));
    }

    #[test]
    fn unknown_protocol_type_is_rejected() {
        let mut wire = [0u8; HEADER_SIZE];
        wire[0..4].copy_from_slice(&(HEADER_SIZE as u32).to_be_bytes());
        wire[4] = 9;
        assert_eq!(
            FrameHeader::decode(&wire),
            Err(FrameError::UnknownProtocolType(9))
        );
    }
}
