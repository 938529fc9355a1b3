//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting the versioned cache stores.

pub mod status;

pub use status::status_impl;
