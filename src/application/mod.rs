//! # Application Layer
//!
//! The chat session controller, prompt assembly, and the seams they depend on.

pub mod interfaces;
pub mod use_cases;

pub use interfaces::*;
pub use use_cases::*;
