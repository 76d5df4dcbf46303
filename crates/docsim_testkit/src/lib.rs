//! # docsim Testkit
//!
//! Test utilities for docsim.
//!
//! This crate provides:
//! - A sample app (schema, modules, HTTP routes, a child component)
//! - Property-based test generators using proptest
//! - Integration helpers for walking pages and inspecting scheduled jobs
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docsim_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn sends_a_message() {
//!     let t = app_harness();
//!     t.mutation("messages:send", message("sarah", "hi")).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber writing through the test harness.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Calling this
/// more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
