//! # Vigil Providers
//!
//! The gating oracle: an OpenAI-compatible chat model that looks at fresh
//! collector data and decides whether to skip, text, or call.

pub mod oracle;

pub use oracle::LlmGatingOracle;
