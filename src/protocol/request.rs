//! Request payload grammar.
//!
//! ```text
//! | argc u32 | len u32 | bytes | len u32 | bytes | ...
//! ```
//!
//! Every length is checked against the remaining payload before it is used,
//! and no bytes may follow the last argument.

use super::{frame, read_u32, ProtocolError, HEADER_SIZE};
use bytes::Bytes;

/// Parse a request payload into its argument list.
pub fn parse(payload: &[u8], max_args: usize) -> Result<Vec<Bytes>, ProtocolError> {
    let argc = read_u32(payload, 0)
        .ok_or(ProtocolError::MalformedRequest("missing argument count"))? as usize;
    if argc > max_args {
        return Err(ProtocolError::TooManyArguments { argc, max: max_args });
    }

    let mut args = Vec::with_capacity(argc);
    let mut pos = 4;
    for _ in 0..argc {
        let len = read_u32(payload, pos)
            .ok_or(ProtocolError::MalformedRequest("truncated argument length"))?
            as usize;
        pos += 4;

        let arg = pos
            .checked_add(len)
            .and_then(|end| payload.get(pos..end))
            .ok_or(ProtocolError::MalformedRequest("argument overruns payload"))?;
        args.push(Bytes::copy_from_slice(arg));
        pos += len;
    }

    if pos != payload.len() {
        return Err(ProtocolError::MalformedRequest("trailing bytes after arguments"));
    }

    Ok(args)
}

/// Encode `args` as a complete request frame, header included.
pub fn encode<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let payload_len = 4 + args.iter().map(|a| 4 + a.as_ref().len()).sum::<usize>();

    let mut out = Vec::with_capacity(HEADER_SIZE + payload_len);
    out.extend_from_slice(&frame::header(payload_len));
    out.extend_from_slice(&(args.len() as u32).to_le_bytes());
    for arg in args {
        let arg = arg.as_ref();
        out.extend_from_slice(&(arg.len() as u32).to_le_bytes());
        out.extend_from_slice(arg);
    }
    out
}
