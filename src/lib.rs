//! ydls - download online media and stream it in a requested format
//!
//! This library crate exposes the CLI and HTTP surfaces for integration testing.

pub mod context;
pub mod output;
pub mod server;

pub use context::AppContext;
