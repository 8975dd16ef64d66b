#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Pixelbot — a script-driven screen automation engine.
//!
//! A script is an ordered sequence of typed actions (wait, capture, find an
//! image pattern, click, type, branch, ...) executed against the live screen
//! and input devices, with a small mutable variable store and conditional
//! jumps for loop-capable flows. Most implementation details live under the
//! internal modules:
//! - `script`: Action/value data model, script load/save, lint, schema helpers.
//! - `engine`: Runtime state, interpreter loop, expression evaluator, runner.
//! - `providers`: Capability contracts (capture, matching, input) and their
//!   concrete xcap/Enigo-backed implementations.
//!
//! Use `pixelbot::prelude::*` to bring commonly used items into scope quickly.

/// Public module: execution engine (state, interpreter, runner).
pub mod engine;
/// Public module: capability providers (capture, matcher, input).
pub mod providers;
/// Public module: script data model and container I/O.
pub mod script;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Initialize tracing (logging) with a reasonable default.
/// - Honors the `RUST_LOG` environment variable if set.
/// - Falls back to `info` level.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing() {
    use tracing::Level;
    use tracing_subscriber::fmt;

    // Parse RUST_LOG as a simple level (trace|debug|info|warn|error)
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| match s.to_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        })
        .unwrap_or(Level::INFO);

    // Ignore the error if the global subscriber was already set.
    let _ = fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use pixelbot::prelude::*;`
pub mod prelude {
    // Common result/error handling
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};

    // Serialization
    pub use serde::{Deserialize, Serialize};

    // Tracing macros
    pub use tracing::{debug, error, info, instrument, trace, warn};

    // Timing helpers
    pub use std::time::Duration;
    pub use tokio::time::sleep;

    // External crates (namespaced) if callers want direct access
    pub use crate as pixelbot;
    pub use enigo;
    pub use image;
    pub use rand;

    // Frequently used internal modules
    pub use crate::{engine, providers, script};
}
