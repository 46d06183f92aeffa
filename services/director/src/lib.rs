//! fleet director library.
//!
//! This crate primarily ships a `director` binary, but we expose the
//! rendering driver and the DNS sync scheduler as a library so deploy
//! orchestration and integration tests can reuse them.

pub mod batch;
pub mod config;
pub mod dns_sync;
pub mod error;
pub mod renderer;
