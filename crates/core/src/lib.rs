//! Core types and shared functionality for offgrid.
//!
//! This crate provides:
//! - Versioned cache stores with SQLite backend
//! - The version registry naming the current cache generation
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod version;

pub use cache::{CacheDb, GcReport, RequestKey, ResponseSnapshot, VersionedStore};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use version::current_version;
