//! Versioned cache generations and the lifecycle manager that drives them.
//!
//! This module provides:
//! - A store backend trait with a SQLite implementation, one named generation per cache version
//! - Provisioning of the current generation from the static manifest (install)
//! - Reclamation of every superseded generation (activate)
//! - Cache-first request interception with network fallback, write-back and an offline page

mod layer;
mod storage;
mod traits;

pub use layer::CacheManager;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::LocalClients;

#[cfg(test)]
pub use storage::{CachedKey, CachedResponse};
#[cfg(test)]
pub use traits::CacheSource;
