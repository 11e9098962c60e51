//! Concrete requests as the transport sees them.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::TransportError;

/// HTTP verb of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Get => "GET",
      Self::Post => "POST",
      Self::Put => "PUT",
      Self::Patch => "PATCH",
      Self::Delete => "DELETE",
    }
  }

  /// Verbs that normally carry a request body.
  pub fn sends_body(self) -> bool {
    matches!(self, Self::Post | Self::Put | Self::Patch)
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Resolved base address that endpoint paths are joined onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase {
  url: Url,
}

impl ApiBase {
  pub fn parse(base: &str) -> Result<Self, TransportError> {
    let mut url = Url::parse(base)
      .map_err(|e| TransportError::UrlGeneration(format!("invalid base address '{}': {}", base, e)))?;

    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
      return Err(TransportError::UrlGeneration(format!(
        "base address '{}' is not an http(s) location",
        base
      )));
    }

    // Url::join replaces the last segment unless the path ends with '/'
    if !url.path().ends_with('/') {
      let path = format!("{}/", url.path());
      url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);

    Ok(Self { url })
  }

  pub fn as_str(&self) -> &str {
    self.url.as_str()
  }

  /// Join `path` onto the base and attach `query` in key order.
  pub(crate) fn resolve(
    &self,
    path: &str,
    query: &BTreeMap<String, String>,
  ) -> Result<Url, TransportError> {
    let relative = path.trim_start_matches('/');
    let mut url = self
      .url
      .join(relative)
      .map_err(|e| TransportError::UrlGeneration(format!("cannot join '{}': {}", path, e)))?;

    if url.origin() != self.url.origin() || !url.path().starts_with(self.url.path()) {
      return Err(TransportError::UrlGeneration(format!(
        "path '{}' escapes base address {}",
        path, self.url
      )));
    }

    url.set_fragment(None);
    url.set_query(None);
    if !query.is_empty() {
      url.query_pairs_mut().extend_pairs(query.iter());
    }

    Ok(url)
  }
}

/// A fully specified request, ready for a `Transport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
  pub method: Method,
  pub url: Url,
  /// Lower-cased header names, kept sorted
  pub headers: BTreeMap<String, String>,
  pub body: Option<Vec<u8>>,
}

impl WireRequest {
  pub fn request_line(&self) -> String {
    format!("{} {}", self.method, self.url)
  }

  /// Canonical byte form: request line, sorted headers, blank line, body.
  ///
  /// Equal inputs always give equal bytes, which is what retries and cache
  /// fingerprints rely on.
  pub fn canonical_bytes(&self) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(self.request_line().as_bytes());
    out.push(b'\n');
    for (name, value) in &self.headers {
      out.extend_from_slice(name.as_bytes());
      out.extend_from_slice(b": ");
      out.extend_from_slice(value.as_bytes());
      out.push(b'\n');
    }
    out.push(b'\n');
    if let Some(body) = &self.body {
      out.extend_from_slice(body);
    }
    out
  }

  /// Identity of the request for caching: verb, target and body. Headers are
  /// left out so credentials never influence the key.
  pub fn identity(&self) -> Vec<u8> {
    let mut out = self.request_line().into_bytes();
    out.push(b'\n');
    if let Some(body) = &self.body {
      out.extend_from_slice(body);
    }
    out
  }
}

/// SHA256 hex digest for stable, fixed-length keys.
pub(crate) fn fingerprint(input: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(input);
  hex::encode(hasher.finalize())
}
