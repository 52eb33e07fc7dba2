// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `typedfetch` Core
//!
//! Schema validation types shared across the `typedfetch` crates.
//!
//! This crate defines the contract between a raw decoded response body and
//! the typed value a caller receives:
//!
//! - [`Validatable`] - capability trait for response schema types
//! - [`ValidationError`] / [`FieldIssue`] - structured, field-level
//!   validation failure detail
//!
//! Every type implementing [`serde::Deserialize`] is [`Validatable`] through
//! a blanket implementation, so plain derived structs can be used as
//! response schemas without extra code.

pub mod error;
pub mod validate;

// Re-export error types
pub use error::{FieldIssue, ValidationError};

// Re-export the validation trait
pub use validate::Validatable;
