//! Version registry.
//!
//! Names the cache generation this build serves. Bumping [`CURRENT_VERSION`]
//! is the only way to invalidate previously cached shell resources: the next
//! activation deletes every store with a different name.

/// Identifier of the cache generation shipped with this build.
pub const CURRENT_VERSION: &str = "offgrid-shell-v1";

/// The currently active cache generation.
pub fn current_version() -> &'static str {
    CURRENT_VERSION
}
