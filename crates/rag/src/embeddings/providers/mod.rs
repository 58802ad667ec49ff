//! Concrete embedding providers.

pub mod hash;
pub mod ollama;
pub mod openai;
