pub mod id;
pub mod protocol;

pub use protocol::{ChatMessage, ClientFrame, ServerFrame};
