//! VEIL Protocol - Client Library
//!
//! High-level API for VEIL clients (the request path).

#[allow(clippy::module_inception)]
mod client;

pub use client::*;
