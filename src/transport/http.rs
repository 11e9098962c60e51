//! reqwest-backed transport.

use std::collections::BTreeMap;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use super::redact;
use super::{Transport, TransportResult};
use crate::endpoint::{Method, WireRequest};
use crate::error::TransportError;

/// HTTP transport with static default headers.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  default_headers: BTreeMap<String, String>,
}

impl HttpTransport {
  /// Create a transport. `timeout` bounds each whole request; expiry is
  /// reported as a generic transport failure.
  pub fn new(timeout: Option<Duration>, user_agent: &str) -> Result<Self> {
    let mut builder = reqwest::Client::builder().user_agent(user_agent);
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      default_headers: BTreeMap::new(),
    })
  }

  /// Send `Authorization: Bearer <token>` with every request.
  pub fn with_bearer_token(self, token: &str) -> Self {
    self.with_header("authorization", format!("Bearer {}", token))
  }

  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self
      .default_headers
      .insert(name.to_ascii_lowercase(), value.into());
    self
  }
}

impl Transport for HttpTransport {
  fn execute(&self, request: WireRequest) -> BoxFuture<'static, TransportResult> {
    let client = self.client.clone();
    let mut headers = self.default_headers.clone();
    headers.extend(request.headers.clone());

    Box::pin(async move {
      let line = request.request_line();
      debug!(
        request = %line,
        headers = %redact::headers(&headers),
        body = %request.body.as_deref().map(redact::body).unwrap_or_default(),
        "sending request"
      );

      let mut builder = client.request(reqwest_method(request.method), request.url);
      for (name, value) in &headers {
        builder = builder.header(name.as_str(), value.as_str());
      }
      if let Some(body) = request.body {
        builder = builder.body(body);
      }

      let response = match builder.send().await {
        Ok(response) => response,
        Err(error) => {
          let classified = classify(&error);
          warn!(request = %line, error = %error, outcome = ?classified, "request did not complete");
          return Err(classified);
        }
      };

      let status = response.status();
      let bytes = response.bytes().await.map_err(|error| {
        let classified = classify(&error);
        warn!(request = %line, status = status.as_u16(), error = %error, "failed reading response body");
        classified
      })?;

      info!(request = %line, status = status.as_u16(), bytes = bytes.len(), "response received");

      if !status.is_success() {
        return Err(TransportError::Status {
          code: status.as_u16(),
          body: bytes.to_vec(),
        });
      }

      Ok(if bytes.is_empty() {
        None
      } else {
        Some(bytes.to_vec())
      })
    })
  }
}

fn reqwest_method(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
  }
}

fn classify(error: &reqwest::Error) -> TransportError {
  if error.is_connect() {
    TransportError::NotConnected
  } else {
    TransportError::Generic(error.to_string())
  }
}
