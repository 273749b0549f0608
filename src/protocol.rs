//! The protocol module, containing the in-memory shape of event-stream messages.
//! protocol 模块，包含事件流消息的内存表示。
//!
//! Wire framing is left to the transport; this module only describes what a
//! message carries.

pub mod header;
pub mod message;
pub mod message_type;

pub use header::{Header, HeaderValue};
pub use message::Message;
pub use message_type::{MessageFlags, MessageType};
