//! HTTP surface over an [`IdGenerator`](gendora::IdGenerator).
//!
//! ## Structure
//!
//! - [`handler`] - routes and shared state.
//! - [`error`] - mapping of generation failures to HTTP responses.

pub mod error;
pub mod handler;
