//! HTTP client module for Janus

pub mod cancel;
pub mod client;
pub use cancel::CancelToken;
pub use client::{HttpClient, MAX_BODY_BYTES};
