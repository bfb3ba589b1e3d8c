// LLM abstraction layer

pub mod provider;
pub mod openai_compat;
pub mod gemini;

pub use provider::*;
