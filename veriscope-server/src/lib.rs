//! HTTP front door and worker pool for the Veriscope research engine.
//!
//! The binary in `main.rs` wires configuration and capabilities; the
//! router and pool live here so integration tests can drive them
//! directly.

pub mod app;
pub mod worker;
