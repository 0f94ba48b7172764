//! # Adapters Module
//!
//! Implementations of the outbound ports.
//!
//! ## Modules
//!
//! - `storage`: Structured store, cookie jar, backend probe and selection

pub mod storage;

pub use storage::{probe, select_backend, CookieStore, StructuredStore};
