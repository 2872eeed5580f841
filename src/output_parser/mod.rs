//! # Output Parser
//!
//! Pulls a JSON payload out of raw model text. Models wrap JSON in prose or
//! markdown fences often enough that a plain `serde_json::from_str` is not
//! sufficient; [`extract_json`] tries a short list of strategies in order.

pub mod error;
pub mod extract;
pub mod json;

pub use error::ParseError;
pub use json::extract_json;
