//! Core request types for callflow.
//!
//! This crate holds the transport-independent pieces of a request:
//!
//! - `headers`: Effective request headers for JSON mode
//! - `body`: Request body values and wire encoding
//! - `media`: Media type detection
//! - `status`: Terminal status tags and error reasons

mod body;
mod headers;
mod media;
mod status;

pub use body::*;
pub use headers::*;
pub use media::*;
pub use status::*;
