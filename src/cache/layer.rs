//! Cache manager that drives generation lifecycle and request interception.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use reqwest::Method;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{CacheConfig, ProvisioningMode};
use crate::net::{Request, RequestKey, Response, Transport};

use super::storage::{CacheStorage, CachedResponse};
use super::traits::{CacheResult, ClientControl};

/// Outcome of reclaiming old generations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActivationReport {
  /// Generations that were deleted
  pub removed: Vec<String>,
  /// Generations whose deletion failed
  pub failed: Vec<String>,
  /// Whether open clients were claimed
  pub claimed: bool,
}

/// Owns the current cache generation and decides, per request, whether to
/// serve it from the store or from the network.
///
/// Host integrations call [`install`](Self::install) and
/// [`activate`](Self::activate) once per lifecycle phase and
/// [`fetch`](Self::fetch) for every outbound request.
pub struct CacheManager<S: CacheStorage, T: Transport> {
  config: Arc<CacheConfig>,
  storage: Arc<S>,
  transport: Arc<T>,
  clients: Arc<dyn ClientControl>,
  /// Detached write-backs, tracked only so they can be awaited on shutdown
  write_backs: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<S, T> CacheManager<S, T>
where
  S: CacheStorage + 'static,
  T: Transport + 'static,
{
  pub fn new(config: CacheConfig, storage: S, transport: T, clients: Arc<dyn ClientControl>) -> Self {
    Self {
      config: Arc::new(config),
      storage: Arc::new(storage),
      transport: Arc::new(transport),
      clients,
      write_backs: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  #[cfg(test)]
  pub fn transport(&self) -> &T {
    &self.transport
  }

  pub fn generation(&self) -> &str {
    &self.config.generation
  }

  /// Build a request for `locator`, resolving relative URLs against the origin.
  pub fn request(&self, method: Method, locator: &str) -> Result<Request> {
    Request::resolve(method, locator, &self.config.origin)
  }

  /// Provision the current generation from the manifest.
  ///
  /// Failures are logged, never returned: a failed provisioning must not
  /// keep the host from finishing its setup.
  pub async fn install(&self) {
    info!(generation = %self.config.generation, "Installing: caching static assets");
    if self.config.manifest.is_empty() {
      warn!("Manifest is empty, nothing to pre-fetch");
    }

    match self.provision().await {
      Ok(count) => info!(
        generation = %self.config.generation,
        "Cached {} of {} manifest entries",
        count,
        self.config.manifest.len()
      ),
      Err(e) => error!(generation = %self.config.generation, "Provisioning failed: {:#}", e),
    }
  }

  /// Fetch every manifest entry and store the results in the current generation.
  ///
  /// In strict mode a single unretrievable entry fails the whole call and
  /// nothing is stored. Returns the number of stored entries.
  pub async fn provision(&self) -> Result<usize> {
    let generation = self.config.generation.clone();
    self
      .with_storage(move |storage| storage.open(&generation))
      .await?;

    let requests = self
      .config
      .manifest
      .entries()
      .iter()
      .map(|entry| self.request(Method::GET, &entry.locator))
      .collect::<Result<Vec<_>>>()?;

    let results = join_all(requests.iter().map(|r| self.transport.fetch(r))).await;

    let mut entries = Vec::with_capacity(requests.len());
    let mut failures = Vec::new();
    for (request, result) in requests.iter().zip(results) {
      match result {
        Ok(response) if response.is_ok() => entries.push((request.key(), response)),
        Ok(response) => failures.push(format!("{} (status {})", request.url, response.status)),
        Err(e) => failures.push(format!("{} ({:#})", request.url, e)),
      }
    }

    if !failures.is_empty() {
      match self.config.provisioning {
        ProvisioningMode::Strict => {
          return Err(eyre!(
            "Failed to add {} of {} manifest entries: {}",
            failures.len(),
            requests.len(),
            failures.join(", ")
          ));
        }
        ProvisioningMode::BestEffort => {
          for failure in &failures {
            warn!("Skipping manifest entry {}", failure);
          }
        }
      }
    }

    let count = entries.len();
    let generation = self.config.generation.clone();
    self
      .with_storage(move |storage| storage.put_all(&generation, &entries))
      .await?;

    Ok(count)
  }

  /// Delete every generation except the current one, then claim open clients.
  ///
  /// Deletions run concurrently. A failed deletion is logged and reported
  /// but never prevents the claim.
  pub async fn activate(&self) -> ActivationReport {
    info!(generation = %self.config.generation, "Activating: cleaning old generations");

    let mut report = ActivationReport::default();
    let current = self.config.generation.clone();

    // Reclamation leaves exactly the current generation, even if install never stored anything
    let generation = current.clone();
    if let Err(e) = self
      .with_storage(move |storage| storage.open(&generation))
      .await
    {
      warn!(generation = %current, "Failed to open current generation: {:#}", e);
    }

    match self.with_storage(|storage| storage.generation_names()).await {
      Ok(names) => {
        let deletions = names
          .into_iter()
          .filter(|name| *name != current)
          .map(|name| async move {
            info!(generation = %name, "Deleting old generation");
            let target = name.clone();
            let result = self
              .with_storage(move |storage| storage.delete_generation(&target))
              .await;
            (name, result)
          });

        for (name, result) in join_all(deletions).await {
          match result {
            Ok(existed) => {
              if !existed {
                debug!(generation = %name, "Generation was already gone");
              }
              report.removed.push(name);
            }
            Err(e) => {
              error!(generation = %name, "Failed to delete old generation: {:#}", e);
              report.failed.push(name);
            }
          }
        }
      }
      Err(e) => error!("Failed to list cache generations: {:#}", e),
    }

    match self.clients.claim().await {
      Ok(()) => report.claimed = true,
      Err(e) => warn!("Failed to claim clients: {:#}", e),
    }

    report
  }

  /// Intercept a request.
  ///
  /// Cacheable requests always produce a response: stored, fresh, or the
  /// offline page. Other requests go straight to the network and only they
  /// can return an error.
  pub async fn fetch(&self, request: &Request) -> Result<CacheResult<Response>> {
    if !self.config.manifest.is_cacheable(request) {
      debug!(method = %request.method, url = %request.url, "Passing through to network");
      let response = self.transport.fetch(request).await?;
      return Ok(CacheResult::pass_through(response));
    }

    Ok(self.fetch_cacheable(request).await)
  }

  async fn fetch_cacheable(&self, request: &Request) -> CacheResult<Response> {
    let key = request.key();

    match self.lookup(&key).await {
      Ok(Some(cached)) => {
        debug!(url = %request.url, "Serving from cache");
        return CacheResult::from_cache(cached.response, cached.cached_at);
      }
      Ok(None) => {}
      Err(e) => warn!(url = %request.url, "Cache lookup failed, treating as miss: {:#}", e),
    }

    debug!(url = %request.url, "Fetching from network");
    match self.transport.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.write_back(key, response.duplicate());
        } else {
          debug!(url = %request.url, status = response.status, "Not caching non-ok response");
        }
        CacheResult::from_network(response)
      }
      Err(e) => {
        error!(url = %request.url, "Fetch failed, serving offline page: {:#}", e);
        CacheResult::offline(Response::offline(&self.config.offline_page))
      }
    }
  }

  async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let generation = self.config.generation.clone();
    let key = key.clone();
    self
      .with_storage(move |storage| storage.match_request(&generation, &key))
      .await
  }

  /// Store a response in the background; the caller never waits for it.
  fn write_back(&self, key: RequestKey, response: Response) {
    let storage = Arc::clone(&self.storage);
    let generation = self.config.generation.clone();

    let handle = tokio::spawn(async move {
      let url = key.url.clone();
      let result =
        tokio::task::spawn_blocking(move || storage.put(&generation, &key, &response)).await;
      match result {
        Ok(Ok(())) => debug!(%url, "Cached network response"),
        Ok(Err(e)) => warn!(%url, "Failed to cache network response: {:#}", e),
        Err(e) => warn!(%url, "Write-back task failed: {}", e),
      }
    });

    if let Ok(mut pending) = self.write_backs.lock() {
      pending.retain(|h| !h.is_finished());
      pending.push(handle);
    }
  }

  /// Wait for every write-back started so far to finish.
  pub async fn settle(&self) {
    let pending = match self.write_backs.lock() {
      Ok(mut pending) => std::mem::take(&mut *pending),
      Err(_) => return,
    };

    for handle in pending {
      // Failures were already logged by the task
      let _ = handle.await;
    }
  }

  /// Run a blocking store call off the async executor.
  async fn with_storage<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&S) -> Result<R> + Send + 'static,
    R: Send + 'static,
  {
    let storage = Arc::clone(&self.storage);
    tokio::task::spawn_blocking(move || f(&storage))
      .await
      .map_err(|e| eyre!("Storage task failed: {}", e))?
  }
}

impl<S: CacheStorage, T: Transport> Clone for CacheManager<S, T> {
  fn clone(&self) -> Self {
    Self {
      config: Arc::clone(&self.config),
      storage: Arc::clone(&self.storage),
      transport: Arc::clone(&self.transport),
      clients: Arc::clone(&self.clients),
      write_backs: Arc::clone(&self.write_backs),
    }
  }
}
