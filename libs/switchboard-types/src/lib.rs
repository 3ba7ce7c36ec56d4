//! OpenAI-compatible wire types shared by the Switchboard gateway.
//!
//! This crate provides:
//! - Chat messages and roles (`ChatMessage`, `Role`)
//! - Completion bodies, streaming chunks and token usage
//! - The fixed error envelope (`ErrorEnvelope`, `ErrorType`)
//! - The model list returned by `GET /v1/models`

mod chat;
mod errors;
mod models;

pub use chat::{
    AssistantMessage, ChatCompletion, ChatCompletionChunk, ChatMessage, Choice, ChunkChoice,
    Delta, Role, Usage,
};
pub use errors::{ErrorBody, ErrorEnvelope, ErrorType};
pub use models::{ModelList, ModelObject};
