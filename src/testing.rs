//! Test doubles for the transport and the store backend.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Mutex;

use crate::cache::{CacheStorage, CachedKey, CachedResponse, SqliteStorage};
use crate::net::{Request, RequestKey, Response, Transport};

/// Transport serving canned responses; unknown URLs get a 404.
#[derive(Default)]
pub struct FakeTransport {
  routes: Mutex<HashMap<String, Response>>,
  calls: Mutex<Vec<String>>,
  offline: AtomicBool,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(self, url: &str, response: Response) -> Self {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
    self
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Every request seen so far, as "METHOD url"
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Transport for FakeTransport {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self
      .calls
      .lock()
      .unwrap()
      .push(format!("{} {}", request.method, request.url));

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable"));
    }

    let routes = self.routes.lock().unwrap();
    Ok(match routes.get(request.url.as_str()) {
      Some(response) => response.duplicate(),
      None => Response::new(404).with_body("not found"),
    })
  }
}

/// SQLite storage that counts reads and writes and can be told to fail.
pub struct InstrumentedStorage {
  inner: SqliteStorage,
  pub reads: AtomicUsize,
  pub writes: AtomicUsize,
  pub fail_reads: AtomicBool,
  pub fail_writes: AtomicBool,
  pub fail_deletes: AtomicBool,
  /// When set, the next `put` blocks until a value arrives on this channel
  pub put_gate: Mutex<Option<Receiver<()>>>,
}

impl InstrumentedStorage {
  pub fn new() -> Self {
    Self {
      inner: SqliteStorage::in_memory().unwrap(),
      reads: AtomicUsize::new(0),
      writes: AtomicUsize::new(0),
      fail_reads: AtomicBool::new(false),
      fail_writes: AtomicBool::new(false),
      fail_deletes: AtomicBool::new(false),
      put_gate: Mutex::new(None),
    }
  }

  pub fn reads(&self) -> usize {
    self.reads.load(Ordering::SeqCst)
  }

  pub fn writes(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }

  pub fn urls(&self, generation: &str) -> Vec<String> {
    self
      .inner
      .keys(generation)
      .unwrap()
      .into_iter()
      .map(|k| k.key.url)
      .collect()
  }
}

impl CacheStorage for InstrumentedStorage {
  fn open(&self, generation: &str) -> Result<()> {
    self.inner.open(generation)
  }

  fn match_request(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    self.reads.fetch_add(1, Ordering::SeqCst);
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(eyre!("disk read error"));
    }
    self.inner.match_request(generation, key)
  }

  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let gate = self.put_gate.lock().unwrap().take();
    if let Some(rx) = gate {
      let _ = rx.recv();
    }
    self.writes.fetch_add(1, Ordering::SeqCst);
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(eyre!("disk full"));
    }
    self.inner.put(generation, key, response)
  }

  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(eyre!("disk full"));
    }
    self.inner.put_all(generation, entries)
  }

  fn keys(&self, generation: &str) -> Result<Vec<CachedKey>> {
    self.inner.keys(generation)
  }

  fn generation_names(&self) -> Result<Vec<String>> {
    self.inner.generation_names()
  }

  fn delete_generation(&self, generation: &str) -> Result<bool> {
    if self.fail_deletes.load(Ordering::SeqCst) {
      return Err(eyre!("generation {} is locked", generation));
    }
    self.inner.delete_generation(generation)
  }
}
