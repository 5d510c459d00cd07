//! Language model boundary.
pub mod client;
pub mod prompt;

pub use client::{ChatCompletionsClient, ChatMessage, CompletionRequest, LanguageModel};
