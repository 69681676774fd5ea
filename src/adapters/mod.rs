pub mod llm;
pub mod openai;

pub use llm::{LLMAdapter, LLMRequest, ModelConfig};
pub use openai::OpenAIAdapter;
