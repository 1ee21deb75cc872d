//! Core traits and types for the caching system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Result of an intercepted request, including where the response came from.
#[derive(Debug)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Fresh data from the network, possibly being written back.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Data served from the current generation.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Synthesized placeholder for an unreachable network.
  pub fn offline(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: None,
    }
  }

  /// Uncacheable request forwarded to the network untouched.
  pub fn pass_through(data: T) -> Self {
    Self {
      data,
      source: CacheSource::PassThrough,
      cached_at: None,
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Stored response from the current generation
  Cache,
  /// Cache miss resolved by the network
  Network,
  /// Network unavailable, offline placeholder served
  Offline,
  /// Request is not cacheable, network result returned as-is
  PassThrough,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Self::Cache => "cache",
      Self::Network => "network",
      Self::Offline => "offline",
      Self::PassThrough => "pass-through",
    };
    f.write_str(s)
  }
}

/// Control over already-open clients of the host.
#[async_trait]
pub trait ClientControl: Send + Sync {
  /// Make the current generation govern open clients immediately.
  async fn claim(&self) -> Result<()>;
}

/// Client control for hosts without long-lived clients; only counts claims.
#[derive(Debug, Default)]
pub struct LocalClients {
  claims: AtomicUsize,
}

impl LocalClients {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn claims(&self) -> usize {
    self.claims.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ClientControl for LocalClients {
  async fn claim(&self) -> Result<()> {
    self.claims.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}
