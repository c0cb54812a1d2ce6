pub mod adapter;
pub mod anthropic;
pub mod base;
pub mod codec;
pub mod configs;
pub mod conversation;
pub mod deepseek;
pub mod factory;
pub mod gemini;
pub mod grok;
pub mod huggingface;
pub mod ollama;
pub mod openai;
pub mod retry;
pub mod stream;
pub mod tools;
pub mod transport;
pub mod usage;
pub mod utils;
