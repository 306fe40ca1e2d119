//! Modules layer - Infrastructure components for external integrations
//!
//! Contains clients and adapters for external services: object storage and
//! the Telegram Bot API.

pub mod storage;
pub mod telegram;
