//! Core types for the voice gateway
//!
//! This crate provides foundational types used across all other crates:
//! - Caller identity
//! - Chat session and message documents
//! - Transcription and query-resolution results

pub mod chat;
pub mod identity;
pub mod query;
pub mod transcript;

pub use chat::{ChatSession, Message, MessageRole, NewMessage, SourceType};
pub use identity::{Identity, Role};
pub use query::{QueryIntent, QueryMetadata, Resolution};
pub use transcript::Transcript;
