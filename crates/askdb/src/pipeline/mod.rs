//! Question → SQL → result → answer.
pub mod generator;
pub mod narrator;
pub mod orchestrator;
pub mod state;

pub use generator::QueryGenerator;
pub use narrator::ResponseNarrator;
pub use orchestrator::{Assistant, Exchange};
pub use state::ExchangeState;

/// Model call parameters shared by the generator and the narrator.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    /// Narration temperature. SQL generation ignores it and always samples at 0.
    pub temperature: f32,
    pub max_tokens: u32,
    /// Most recent turns threaded into prompts; 0 keeps every turn.
    pub history_window: usize,
    pub result_preview_rows: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            max_tokens: 1000,
            history_window: 20,
            result_preview_rows: 50,
        }
    }
}
