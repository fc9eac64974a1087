//! `searchpipe` crate (library surface).
//!
//! The primary entrypoint is the `searchpipe` binary (CLI + MCP stdio). This module lets
//! embedders reach the core types and the local implementations without depending on the
//! internal crate layout.

pub use searchpipe_core as core;
pub use searchpipe_local as local;
