//! Telegram Bot API transport
//!
//! Long polling, replies, and attachment downloads over plain HTTPS.

mod client;
pub mod types;

pub use client::{ChatTransport, FileSource, TelegramClient};
