//! Data models for the copilot backend

mod chat;

pub use chat::*;
