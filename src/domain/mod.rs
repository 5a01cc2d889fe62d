//! # Domain Layer
//!
//! Conversation models, the user profile and the error taxonomy.
//! This layer is independent of the completion backend and of any front-end.

pub mod error;
pub mod models;

pub use error::*;
pub use models::*;
