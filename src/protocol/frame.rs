//! Length-prefixed framing.
//!
//! Decoding only looks at the buffer; callers consume `Frame::consumed`
//! bytes themselves once they are done with the payload.

use super::{read_u32, ProtocolError};

/// Size of the length prefix.
pub const HEADER_SIZE: usize = 4;

/// A complete frame borrowed from an input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Payload bytes, without the length prefix.
    pub payload: &'a [u8],
    /// Total bytes the frame occupies in the buffer (header + payload).
    pub consumed: usize,
}

/// Try to decode one frame from the head of `buf`.
///
/// Returns `Ok(None)` until the header and the full payload are available.
/// A declared length above `max_message` is an error regardless of how many
/// bytes have arrived.
pub fn try_decode(buf: &[u8], max_message: usize) -> Result<Option<Frame<'_>>, ProtocolError> {
    let len = match read_u32(buf, 0) {
        Some(len) => len as usize,
        None => return Ok(None),
    };

    if len > max_message {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: max_message,
        });
    }

    let consumed = HEADER_SIZE + len;
    match buf.get(HEADER_SIZE..consumed) {
        Some(payload) => Ok(Some(Frame { payload, consumed })),
        None => Ok(None),
    }
}

/// Length prefix for a payload of `payload_len` bytes.
///
/// Every encoder writes its header through here. Payloads are bounded by
/// the configured message limit, which is validated to fit in a `u32`.
pub fn header(payload_len: usize) -> [u8; HEADER_SIZE] {
    (payload_len as u32).to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_need_header() {
        assert_eq!(try_decode(b"", 4096), Ok(None));
        assert_eq!(try_decode(&[5, 0, 0], 4096), Ok(None));
    }

    #[test]
    fn test_need_payload() {
        let buf = [5, 0, 0, 0, b'h', b'e'];
        assert_eq!(try_decode(&buf, 4096), Ok(None));
    }

    #[test]
    fn test_complete_frame() {
        let buf = [5, 0, 0, 0, b'h', b'e', b'l', b'l', b'o', 9, 9];
        let frame = try_decode(&buf, 4096).unwrap().unwrap();
        assert_eq!(frame.payload, b"hello");
        assert_eq!(frame.consumed, 9);
    }

    #[test]
    fn test_empty_payload() {
        let frame = try_decode(&[0, 0, 0, 0], 4096).unwrap().unwrap();
        assert!(frame.payload.is_empty());
        assert_eq!(frame.consumed, HEADER_SIZE);
    }

    #[test]
    fn test_oversized_rejected_from_header_alone() {
        // Only the header has arrived; the declared length is still rejected.
        let header = (4097u32).to_le_bytes();
        assert_eq!(
            try_decode(&header, 4096),
            Err(ProtocolError::FrameTooLarge {
                len: 4097,
                max: 4096
            })
        );

        let header = u32::MAX.to_le_bytes();
        assert!(try_decode(&header, 4096).is_err());
    }

    #[test]
    fn test_max_size_accepted() {
        let mut buf = header(64).to_vec();
        buf.extend_from_slice(&[7u8; 64]);
        let frame = try_decode(&buf, 64).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 64);
        assert_eq!(frame.consumed, buf.len());
    }

    #[test]
    fn test_header_is_little_endian() {
        assert_eq!(header(3), [3, 0, 0, 0]);
        assert_eq!(header(0), [0, 0, 0, 0]);
        assert_eq!(header(0x0102_0304), [4, 3, 2, 1]);
    }
}
