//! # Ports
//!
//! Interfaces the channel requires from its host.

pub mod outbound;
