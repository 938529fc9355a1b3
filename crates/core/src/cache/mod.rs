//! SQLite-backed cache stores, one per cache generation.
//!
//! This module provides persistent, versioned response storage using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Named stores holding request key to response snapshot mappings
//! - Atomic batch writes for shell manifest installation
//! - Garbage collection of stores from superseded generations
//! - Automatic schema migrations and WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod hash;
pub mod manager;
pub mod migrations;
pub mod registration;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{RequestKey, ResponseSnapshot};
pub use manager::{GcReport, VersionedStore};
pub use stores::StoreSummary;
