//! Wire types for the OpenAI-compatible API, and their conversion to and from the
//! provider-neutral types in `crate::inference::types`.

pub mod chat_completions;
pub mod embeddings;
pub mod messages;
pub mod streaming;
pub mod tool;
pub mod usage;
