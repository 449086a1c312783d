//! Block Access List helper macros.
//!
//! Logging goes through [`tracing`], but only when the `dev` feature is enabled
//! (or in tests). Release builds compile every `dev_*!` call away.

#[cfg(feature = "dev")]
#[doc(hidden)]
pub use tracing;

#[macro_use]
mod macros;
