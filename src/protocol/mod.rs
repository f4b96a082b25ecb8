//! Wire Protocol
//!
//! Everything between raw socket bytes and typed directory operations.
//!
//! ## Overview
//!
//! Bytes on the wire are self-delimiting frames. The parser turns a byte
//! buffer into a [`Frame`] tree, and the codec maps that tree to a typed
//! [`Message`] (request) or back from a [`Response`].
//!
//! ## Modules
//!
//! - `frame`: The `Frame` enum and its serialization
//! - `parser`: Incremental parser for incoming frames
//! - `message`: Typed requests, responses and result codes
//! - `codec`: Frame <-> message mapping
//!
//! ## Example
//!
//! ```
//! use flashdir::protocol::{decode_request, parse_frame, Request};
//!
//! let data = b"*3\r\n:7\r\n$7\r\nabandon\r\n:5\r\n";
//! let (frame, consumed) = parse_frame(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let message = decode_request(frame).unwrap();
//! assert_eq!(message.id, 7);
//! assert_eq!(message.request, Request::Abandon(5));
//! ```

pub mod codec;
pub mod frame;
pub mod message;
pub mod parser;

// Re-export commonly used types for convenience
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, CodecError, DecodeFailure,
};
pub use frame::Frame;
pub use message::{
    AddRequest, BindRequest, Change, ChangeOperation, CompareRequest, ExtendedRequest, LdapResult,
    Message, MessageId, ModifyRequest, OperationKind, Request, Response, ResultCode,
    SearchRequest, SearchScope, START_TLS_OID, WHO_AM_I_OID,
};
pub use parser::{parse_frame, FrameParser, ParseError, ParseResult};
