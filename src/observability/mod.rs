//! Observability module providing structured logging.
//!
//! The gate logs through `tracing` everywhere; the binary installs a
//! `tracing-subscriber` pipeline with a configurable format (pretty,
//! compact, JSON). Library users bring their own subscriber.

#[cfg(feature = "server")]
mod tracing_init;

#[cfg(feature = "server")]
pub use tracing_init::*;
