//! Reclassification and diagnostics for failed requests.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{TransferError, TransportError};

/// A transport failure the resolver recognised as a structured API error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ResolvedError {
  pub status: Option<u16>,
  /// Application-specific error code, if the server sent one
  pub code: Option<String>,
  pub message: String,
}

/// What a resolver decided about a transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  PassThrough(TransportError),
  Resolved(ResolvedError),
}

impl Resolution {
  pub fn into_transfer(self) -> TransferError {
    match self {
      Self::PassThrough(error) => TransferError::TransportFailure(error),
      Self::Resolved(error) => TransferError::Resolved(error),
    }
  }
}

/// Hook for turning raw transport failures into domain errors.
pub trait ErrorResolver: Send + Sync {
  fn resolve(&self, error: TransportError) -> Resolution;
}

/// Default resolver: every failure stays a transport failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughResolver;

impl ErrorResolver for PassThroughResolver {
  fn resolve(&self, error: TransportError) -> Resolution {
    Resolution::PassThrough(error)
  }
}

/// Resolver that reads `{"message": ..., "code": ...}` (or `{"error": ...}`)
/// out of non-2xx bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiErrorResolver;

#[derive(Deserialize)]
struct ApiErrorBody {
  #[serde(alias = "error")]
  message: Option<String>,
  #[serde(default)]
  code: Option<Value>,
}

impl ErrorResolver for ApiErrorResolver {
  fn resolve(&self, error: TransportError) -> Resolution {
    if let TransportError::Status { code, body } = &error {
      if let Ok(ApiErrorBody {
        message: Some(message),
        code: api_code,
      }) = serde_json::from_slice::<ApiErrorBody>(body)
      {
        return Resolution::Resolved(ResolvedError {
          status: Some(*code),
          code: api_code.map(|c| match c {
            Value::String(s) => s,
            other => other.to_string(),
          }),
          message,
        });
      }
    }
    Resolution::PassThrough(error)
  }
}

/// Records diagnostics for failed requests before they are handed back.
pub trait ErrorLogger: Send + Sync {
  fn log(&self, request_line: &str, error: &TransferError);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorLogger;

impl ErrorLogger for TracingErrorLogger {
  fn log(&self, request_line: &str, error: &TransferError) {
    match error {
      e if e.is_cancelled() => debug!(request = request_line, "request cancelled"),
      TransferError::Decode(reason) => {
        warn!(request = request_line, %reason, "response did not match declared type")
      }
      other => warn!(request = request_line, error = %other, "request failed"),
    }
  }
}
