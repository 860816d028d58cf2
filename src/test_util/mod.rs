//! Helpers for unit tests: capturing the frames an operation or connection sends, and responders
//!  with canned behavior.

pub mod operation;
pub mod responder;
pub mod transport;
