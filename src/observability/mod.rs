//! Logging setup for the `s3-retain` binary.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the binary (or to the embedding application).

mod tracing_init;

pub use tracing_init::*;
