//! Request dispatch for the event loop.
//!
//! Decodes one request from the head of a connection's input, runs it
//! against the store and appends the encoded response to the output buffer.
//! Works on plain byte slices and buffers so it can be driven by the event
//! loop and by tests alike.

use crate::command;
use crate::protocol::{frame, request, Limits, ProtocolError};
use crate::runtime::ByteBuffer;
use crate::storage::Store;
use tracing::trace;

/// Result of processing the head of an input buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Need more data to complete a frame.
    NeedData,
    /// A request was executed and its response appended to the output.
    /// `consumed` bytes of input belong to that request.
    Response { consumed: usize },
    /// Protocol error, connection should be closed.
    Error(ProtocolError),
}

/// Process at most one request from `input`.
pub fn process_request(
    input: &[u8],
    output: &mut ByteBuffer,
    store: &mut Store,
    limits: &Limits,
) -> ProcessResult {
    let frame = match frame::try_decode(input, limits.max_message) {
        Ok(Some(frame)) => frame,
        Ok(None) => return ProcessResult::NeedData,
        Err(e) => return ProcessResult::Error(e),
    };

    let args = match request::parse(frame.payload, limits.max_args) {
        Ok(args) => args,
        Err(e) => return ProcessResult::Error(e),
    };

    let response = command::execute(&args, store);
    trace!(argc = args.len(), status = ?response.status, "Processed request");
    response.encode_into(output);

    ProcessResult::Response {
        consumed: frame.consumed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Response, Status};

    #[test]
    fn test_need_data() {
        let mut out = ByteBuffer::new();
        let mut store = Store::new();
        let frame = request::encode(&["get", "k"]);

        for end in 0..frame.len() {
            assert_eq!(
                process_request(&frame[..end], &mut out, &mut store, &Limits::default()),
                ProcessResult::NeedData
            );
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_response_appended() {
        let mut out = ByteBuffer::new();
        let mut store = Store::new();
        let mut input = request::encode(&["set", "a", "1"]);
        let first_len = input.len();
        input.extend_from_slice(&request::encode(&["get", "a"]));

        let result = process_request(&input, &mut out, &mut store, &Limits::default());
        assert_eq!(result, ProcessResult::Response { consumed: first_len });

        let (resp, _) = Response::decode(out.as_slice(), 4096).unwrap().unwrap();
        assert_eq!(resp.status, Status::Ok);
        assert_eq!(&resp.data[..], b"1");
    }

    #[test]
    fn test_unknown_command_is_not_fatal() {
        let mut out = ByteBuffer::new();
        let mut store = Store::new();
        let input = request::encode(&["nope"]);

        let result = process_request(&input, &mut out, &mut store, &Limits::default());
        assert_eq!(result, ProcessResult::Response { consumed: input.len() });
        assert_eq!(out.as_slice(), &Response::err().encode()[..]);
    }

    #[test]
    fn test_oversized_frame() {
        let mut out = ByteBuffer::new();
        let mut store = Store::new();
        let limits = Limits {
            max_message: 8,
            max_args: 4,
        };
        let input = request::encode(&["set", "key", "value"]);

        assert!(matches!(
            process_request(&input, &mut out, &mut store, &limits),
            ProcessResult::Error(ProtocolError::FrameTooLarge { max: 8, .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_malformed_payload() {
        let mut out = ByteBuffer::new();
        let mut store = Store::new();
        // Valid envelope, payload declares one argument but carries none.
        let input = [4, 0, 0, 0, 1, 0, 0, 0];

        assert!(matches!(
            process_request(&input, &mut out, &mut store, &Limits::default()),
            ProcessResult::Error(ProtocolError::MalformedRequest(_))
        ));
        assert!(out.is_empty());
    }
}
