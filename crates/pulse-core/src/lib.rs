//! # pulse-core
//!
//! Wire protocol definitions shared by the gateway and REST surfaces.

pub mod events;
pub mod protocol;

pub use events::{DispatchEvent, EventType, ANY_EVENT};
pub use protocol::{
    CloseCode, GatewayMessage, HelloPayload, IdentifyPayload, IdentifyProperties, OpCode,
    ProtocolError, ReadyPayload, ResumePayload,
};
