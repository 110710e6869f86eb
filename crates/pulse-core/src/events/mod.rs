//! Dispatch events
//!
//! Event names carried in the `t` field of dispatch frames, and the
//! decoded event handed to listeners.

mod dispatch_event;
mod event_types;

pub use dispatch_event::{DispatchEvent, ANY_EVENT};
pub use event_types::EventType;
