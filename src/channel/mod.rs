//! Prompt carriers: the page address and inbound host messages.
pub mod message;
pub mod url;
