//! Executing wire requests.
//!
//! A [`Transport`] turns one [`WireRequest`] into raw bytes or a
//! transport-tier failure. It neither decodes nor caches; cancellation happens
//! by dropping the returned future, which the pipeline does when an
//! `InFlightHandle` is cancelled.

mod http;
#[cfg(test)]
pub(crate) mod mock;
mod redact;

pub use http::HttpTransport;

use futures::future::BoxFuture;

use crate::endpoint::WireRequest;
use crate::error::TransportError;

/// Raw outcome of a request: the body of a 2xx response (`None` when empty)
/// or the classified failure.
pub type TransportResult = Result<Option<Vec<u8>>, TransportError>;

/// Something that can put a request on the wire.
pub trait Transport: Send + Sync {
  fn execute(&self, request: WireRequest) -> BoxFuture<'static, TransportResult>;
}
