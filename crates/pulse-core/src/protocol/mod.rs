//! Gateway protocol definitions
//!
//! Defines the wire protocol spoken over the gateway connection: op codes,
//! the message frame, handshake payloads, and close codes.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use messages::{GatewayMessage, ProtocolError};
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, IdentifyProperties, ReadyPayload, ResumePayload};
