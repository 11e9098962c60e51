//! Two-tier error taxonomy for the data-access pipeline.
//!
//! - `TransportError` describes what happened on the wire. It only travels
//!   between a `Transport` and the `ErrorResolver`.
//! - `TransferError` is what repositories, use cases and callbacks observe.
//!   Transport failures reach them wrapped in `TransferError::TransportFailure`.

mod resolver;

pub use resolver::{
  ApiErrorResolver, ErrorLogger, ErrorResolver, PassThroughResolver, Resolution, ResolvedError,
  TracingErrorLogger,
};

use thiserror::Error;

/// Failures raised while building or executing a wire request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
  /// The server answered outside 2xx. The raw body is kept so a resolver can
  /// still parse a structured error payload out of it.
  #[error("server responded with status {code}")]
  Status { code: u16, body: Vec<u8> },
  #[error("not connected")]
  NotConnected,
  #[error("request cancelled")]
  Cancelled,
  #[error("could not build request target: {0}")]
  UrlGeneration(String),
  #[error("transport failure: {0}")]
  Generic(String),
}

/// Failures observed by everything above the transfer pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
  /// A body was required but the server sent none.
  #[error("response had no body")]
  NoResponseBody,
  /// The server responded but the payload did not match the declared type.
  #[error("failed to decode response: {0}")]
  Decode(String),
  #[error("{0}")]
  TransportFailure(TransportError),
  /// A transport failure the resolver turned into a domain error.
  #[error("{0}")]
  Resolved(ResolvedError),
}

impl TransferError {
  pub fn cancelled() -> Self {
    Self::TransportFailure(TransportError::Cancelled)
  }

  /// Cancellation is a no-op for UI code, not a user-visible failure.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::TransportFailure(TransportError::Cancelled))
  }
}

/// Outcome of one logical request.
pub type TypedResult<T> = Result<T, TransferError>;
