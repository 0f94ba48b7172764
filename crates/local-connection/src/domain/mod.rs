//! # Domain Layer
//!
//! Pure types of the channel: records on the wire, the codec that moves them
//! in and out of a text blob, configuration and errors.

pub mod codec;
pub mod config;
pub mod errors;
pub mod events;
