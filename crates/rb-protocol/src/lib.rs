//! rb-protocol: Wire protocol for the relaybus message bus
//!
//! This crate defines the binary protocol spoken between client and server
//! endpoints: identifiers, status codes, the event selector encoding, the
//! frame header and the tokio codec that carries messages over a stream.

pub mod codec;
pub mod error;
pub mod frame;
pub mod ids;
pub mod message;
pub mod selector;
pub mod status;

pub use codec::{Frame, FrameCodec};
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use ids::{CallId, SessionId};
pub use message::{EventCode, Message, MessageType, PROTOCOL_VERSION};
pub use selector::{normalize_topic, Selector, SubscribeItem};
pub use status::StatusCode;
