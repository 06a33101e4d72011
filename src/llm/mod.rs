// LLM abstraction layer

pub mod openai;
pub mod provider;

pub use openai::OpenAICompatibleAdapter;
pub use provider::{LLMAdapter, LLM};
