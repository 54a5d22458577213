use crate::buffer::Buffer;
use crate::error::FrameError;
use crate::frame::{peek_frame_length, FrameHeader, HEADER_SIZE};

/// One deframed wire message: its header and owned payload bytes.
#[derive(Debug)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

/// Attempts to pull exactly one complete frame off the front of `buf`.
///
/// Returns `Ok(None)` when fewer bytes than a full frame are buffered yet
/// (the caller should wait for more data); returns `Err` on a malformed
/// length field, which callers treat as a broken connection.
pub fn try_extract_frame(buf: &mut Buffer) -> Result<Option<Frame>, FrameError> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }
    let prefix = buf.peek(4).expect("checked length above");
    let total_len = peek_frame_length(prefix)? as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(buf.peek(HEADER_SIZE).expect("checked length above"));
    let header = FrameHeader::decode(&header_bytes)?;

    let payload_len = total_len - HEADER_SIZE;
    let mut payload = vec![0u8; payload_len];
    {
        let live = buf.peek(total_len).expect("checked length above");
        payload.copy_from_slice(&live[HEADER_SIZE..total_len]);
    }
    buf.consume(total_len);
    Ok(Some(Frame { header, payload }))
}

/// Serializes `header` and `payload` into `buf`'s send side, ready for the
/// connection's next write attempt.
pub fn write_frame(
    buf: &mut Buffer,
    header: &FrameHeader,
    payload: &[u8],
) -> Result<(), crate::error::BufferError> {
    let mut wire_header = [0u8; HEADER_SIZE];
    header.encode(&mut wire_header);
    buf.write_in(&wire_header)?;
    buf.write_in(payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ProtocolKind;

    #[test]
    fn extracts_frame_written_in_one_go() {
        let mut buf = Buffer::new();
        let header = FrameHeader::new(5, ProtocolKind::Schema, 0x11);
        write_frame(&mut buf, &header, b"hello").unwrap();
        let frame = try_extract_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame.header, header);
        assert_eq!(frame.payload, b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn reports_incomplete_frame() {
        let mut buf = Buffer::new();
        let header = FrameHeader::new(5, ProtocolKind::Schema, 0x11);
        write_frame(&mut buf, &header, b"hello").unwrap();
        // drop the tail end to simulate a partial TCP read
        let total = buf.len();
        let mut partial = Buffer::new();
        let mut front = vec![0u8; total - 2];
        let n = buf.read_out(&mut front);
        assert_eq!(n, total - 2);
        partial.write_in(&front).unwrap();
        assert!(try_extract_frame(&mut partial).unwrap().is_none());
    }

    #[test]
    fn extracts_two_frames_delivered_back_to_back() {
        let mut buf = Buffer::new();
        let h1 = FrameHeader::new(3, ProtocolKind::Binary, 1);
        let h2 = FrameHeader::new(4, ProtocolKind::Binary, 2);
        write_frame(&mut buf, &h1, b"abc").unwrap();
        write_frame(&mut buf, &h2, b"wxyz").unwrap();

        let f1 = try_extract_frame(&mut buf).unwrap().unwrap();
        assert_eq!(f1.payload, b"abc");
        let f2 = try_extract_frame(&mut buf).unwrap().unwrap();
        assert_eq!(f2.payload, b"wxyz");
        assert!(buf.is_empty());
    }
}
