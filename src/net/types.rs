use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Offline notice served when a cacheable request cannot reach the network.
pub const OFFLINE_PAGE: &str =
  "<h1>You are offline!</h1><p>It looks like you're not connected to the internet.</p>";

/// An intercepted outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  /// Only forwarded on pass-through, never part of the cache key
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      body: None,
    }
  }

  /// Build a request from a locator. Absolute URLs are used as-is; anything
  /// else is a root-relative path on `origin`, whatever path `origin` carries.
  pub fn resolve(method: Method, locator: &str, origin: &Url) -> Result<Self> {
    let url = match Url::parse(locator) {
      Ok(url) => url,
      Err(_) => origin
        .join(&format!("/{}", locator.trim_start_matches('/')))
        .map_err(|e| eyre!("Invalid request URL '{}': {}", locator, e))?,
    };
    Ok(Self::new(method, url))
  }

  pub fn with_body(mut self, body: Vec<u8>) -> Self {
    self.body = Some(body);
    self
  }

  pub fn key(&self) -> RequestKey {
    RequestKey {
      method: self.method.as_str().to_string(),
      url: self.url.to_string(),
    }
  }
}

/// Store key for a request: method plus full URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  /// SHA256 hash for stable, fixed-length storage keys.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl std::fmt::Display for RequestKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// A response as produced by the transport or read back from the store.
///
/// Not `Clone`; a second consumer (the store) gets its own value from
/// [`Response::duplicate`].
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  /// Header names are stored lower-cased; repeated headers keep every value in order
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: Vec::new(),
    }
  }

  /// Append a header, keeping earlier values of the same name.
  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.push((name.to_ascii_lowercase(), value.into()));
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = body.into();
    self
  }

  /// Synthesized placeholder for a cacheable request that failed on the network.
  pub fn offline(page: &str) -> Self {
    Self::new(200)
      .with_header("content-type", "text/html")
      .with_body(page.as_bytes())
  }

  /// Status in the 200-299 range
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// First value of a header
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn content_type(&self) -> Option<&str> {
    self.header("content-type")
  }

  /// Independent copy of this response, for a second consumer.
  pub fn duplicate(&self) -> Self {
    Self {
      status: self.status,
      headers: self.headers.clone(),
      body: self.body.clone(),
    }
  }
}
