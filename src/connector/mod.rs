//! # Connector Layer
//!
//! External integrations implementing application interfaces:
//! - Chat completion transport (Azure OpenAI, offline mock)
//! - The LLM-backed chat service and the in-memory message log
//! - Wiring and text rendering for the terminal front-end

pub mod adapter;
pub mod api;

pub use adapter::*;
pub use api::*;
