//! Static asset manifest and the classifier deciding which requests are cacheable.

use reqwest::Method;
use url::Url;

use crate::net::Request;

/// How a single manifest locator matches incoming requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryRule {
  /// The application shell: `/` or the root document
  Shell,
  /// Root-relative path, compared against the request path
  Local(String),
  /// Absolute URL, compared as a literal prefix of the full request URL
  External(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
  /// Locator as written in the configuration
  pub locator: String,
  pub rule: EntryRule,
}

impl ManifestEntry {
  fn parse(locator: &str, root_document: &str) -> Self {
    let rule = if is_external(locator) {
      EntryRule::External(locator.to_string())
    } else {
      let path = locator.trim_start_matches('/');
      if path.is_empty() || path == root_document {
        EntryRule::Shell
      } else {
        EntryRule::Local(format!("/{}", path))
      }
    };

    Self {
      locator: locator.to_string(),
      rule,
    }
  }
}

fn is_external(locator: &str) -> bool {
  Url::parse(locator)
    .map(|url| matches!(url.scheme(), "http" | "https"))
    .unwrap_or(false)
}

/// Ordered list of assets pre-fetched into a cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
  entries: Vec<ManifestEntry>,
  /// Root document as a path, e.g. `/index.html`
  root_document_path: String,
}

impl Manifest {
  pub fn parse<S: AsRef<str>>(locators: &[S], root_document: &str) -> Self {
    let root_document = root_document.trim_start_matches('/');
    Self {
      entries: locators
        .iter()
        .map(|l| ManifestEntry::parse(l.as_ref(), root_document))
        .collect(),
      root_document_path: format!("/{}", root_document),
    }
  }

  pub fn entries(&self) -> &[ManifestEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// The first manifest entry matching this URL, if any. Method is not considered.
  pub fn matching_entry(&self, url: &Url) -> Option<&ManifestEntry> {
    let path = url.path();
    self.entries.iter().find(|entry| match &entry.rule {
      EntryRule::Shell => path == "/" || path == self.root_document_path,
      EntryRule::Local(local) => path == local,
      EntryRule::External(prefix) => url.as_str().starts_with(prefix.as_str()),
    })
  }

  /// Only GET requests matching a manifest entry are served through the cache.
  pub fn is_cacheable(&self, request: &Request) -> bool {
    request.method == Method::GET && self.matching_entry(&request.url).is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn manifest() -> Manifest {
    Manifest::parse(
      &[
        "/",
        "index.html",
        "manifest.json",
        "/logo.png",
        "https://cdn.tailwindcss.com",
        "https://cdnjs.cloudflare.com/ajax/libs/prism/1.29.0/prism.min.js",
      ],
      "index.html",
    )
  }

  fn get(url: &str) -> Request {
    Request::new(Method::GET, Url::parse(url).unwrap())
  }

  #[test]
  fn test_entry_rules() {
    let m = manifest();
    let rules: Vec<_> = m.entries().iter().map(|e| e.rule.clone()).collect();
    assert_eq!(rules[0], EntryRule::Shell);
    assert_eq!(rules[1], EntryRule::Shell);
    assert_eq!(rules[2], EntryRule::Local("/manifest.json".to_string()));
    assert_eq!(rules[3], EntryRule::Local("/logo.png".to_string()));
    assert_eq!(
      rules[4],
      EntryRule::External("https://cdn.tailwindcss.com".to_string())
    );
  }

  #[test]
  fn test_root_equivalence() {
    let m = Manifest::parse(&["/"], "index.html");
    let root = m.matching_entry(&Url::parse("https://app.example.com/").unwrap());
    let doc = m.matching_entry(&Url::parse("https://app.example.com/index.html").unwrap());
    assert!(root.is_some());
    assert_eq!(root, doc);

    let m = Manifest::parse(&["index.html"], "index.html");
    assert!(m.is_cacheable(&get("https://app.example.com/")));
  }

  #[test]
  fn test_local_path_match() {
    let m = manifest();
    assert!(m.is_cacheable(&get("https://app.example.com/manifest.json")));
    assert!(m.is_cacheable(&get("https://app.example.com/logo.png?v=2")));
    assert!(!m.is_cacheable(&get("https://app.example.com/assets/manifest.json")));
    assert!(!m.is_cacheable(&get("https://app.example.com/other.png")));
  }

  #[test]
  fn test_local_path_ignores_host() {
    let m = manifest();
    assert!(m.is_cacheable(&get("https://elsewhere.example.org/manifest.json")));
  }

  #[test]
  fn test_external_prefix_match() {
    let m = manifest();
    assert!(m.is_cacheable(&get("https://cdn.tailwindcss.com/")));
    assert!(m.is_cacheable(&get("https://cdn.tailwindcss.com/?plugins=forms")));
    assert!(m.is_cacheable(&get(
      "https://cdnjs.cloudflare.com/ajax/libs/prism/1.29.0/prism.min.js?x=1"
    )));
    assert!(!m.is_cacheable(&get(
      "https://cdnjs.cloudflare.com/ajax/libs/prism/1.28.0/prism.min.js"
    )));
  }

  #[test]
  fn test_non_get_never_cacheable() {
    let m = manifest();
    let url = Url::parse("https://app.example.com/").unwrap();
    for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
      assert!(!m.is_cacheable(&Request::new(method, url.clone())));
    }
  }

  #[test]
  fn test_custom_root_document() {
    let m = Manifest::parse(&["/home.html", "index.html"], "/home.html");
    assert_eq!(m.entries()[0].rule, EntryRule::Shell);
    assert_eq!(m.entries()[1].rule, EntryRule::Local("/index.html".to_string()));
    assert!(m.is_cacheable(&get("https://app.example.com/home.html")));
    assert!(m.is_cacheable(&get("https://app.example.com/")));
  }

  #[test]
  fn test_empty_manifest_matches_nothing() {
    let m = Manifest::parse::<&str>(&[], "index.html");
    assert!(m.is_empty());
    assert!(!m.is_cacheable(&get("https://app.example.com/")));
  }
}
