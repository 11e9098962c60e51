//! Transport + decoding + error resolution, delivered on the caller's context.
//!
//! [`DataTransferPipeline::fetch`] is the async core: it executes a
//! descriptor, decodes the body into the descriptor's response type, and maps
//! failures into the transfer tier. [`DataTransferPipeline::request`] wraps it
//! in a spawned task and hands the outcome to a callback on the
//! [`ExecutionContext`] the pipeline was built with.

mod dispatch;

pub use dispatch::{Completion, Guard, InFlightHandle};

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::runtime::Handle;

use crate::context::ExecutionContext;
use crate::endpoint::EndpointDescriptor;
use crate::error::{
  ErrorLogger, ErrorResolver, PassThroughResolver, TracingErrorLogger, TransferError,
  TransportError, TypedResult,
};
use crate::transport::Transport;

/// Turns endpoint descriptors into typed results.
#[derive(Clone)]
pub struct DataTransferPipeline {
  transport: Arc<dyn Transport>,
  resolver: Arc<dyn ErrorResolver>,
  logger: Arc<dyn ErrorLogger>,
  context: ExecutionContext,
  runtime: Option<Handle>,
}

impl DataTransferPipeline {
  /// Pipeline with the pass-through resolver and tracing logger.
  ///
  /// Work is spawned on the runtime current at construction, if any. Use
  /// [`with_runtime`](Self::with_runtime) when building the pipeline outside
  /// of one.
  pub fn new(transport: Arc<dyn Transport>, context: ExecutionContext) -> Self {
    Self {
      transport,
      resolver: Arc::new(PassThroughResolver),
      logger: Arc::new(TracingErrorLogger),
      context,
      runtime: Handle::try_current().ok(),
    }
  }

  /// Spawn request work on `runtime`, whichever thread issues it.
  pub fn with_runtime(mut self, runtime: Handle) -> Self {
    self.runtime = Some(runtime);
    self
  }

  pub fn with_resolver(mut self, resolver: Arc<dyn ErrorResolver>) -> Self {
    self.resolver = resolver;
    self
  }

  pub fn with_logger(mut self, logger: Arc<dyn ErrorLogger>) -> Self {
    self.logger = logger;
    self
  }

  pub fn context(&self) -> &ExecutionContext {
    &self.context
  }

  /// Execute `descriptor` and decode its response.
  pub async fn fetch<Req, Resp>(&self, descriptor: &EndpointDescriptor<Req, Resp>) -> TypedResult<Resp>
  where
    Resp: DeserializeOwned,
  {
    let request = descriptor.wire();
    let result = match self.transport.execute(request.clone()).await {
      Ok(body) => decode(body, descriptor.requires_body()),
      Err(error) => Err(self.resolve(error)),
    };

    if let Err(error) = &result {
      self.logger.log(&request.request_line(), error);
    }
    result
  }

  /// Execute `descriptor` in the background; `completion` runs on the
  /// pipeline's context with the outcome.
  pub fn request<Req, Resp>(
    &self,
    descriptor: EndpointDescriptor<Req, Resp>,
    completion: impl FnOnce(TypedResult<Resp>) + Send + 'static,
  ) -> InFlightHandle
  where
    Req: Send + Sync + 'static,
    Resp: DeserializeOwned + Send + 'static,
  {
    let pipeline = self.clone();
    self.dispatch(
      async move { pipeline.fetch(&descriptor).await },
      None,
      Box::new(completion),
    )
  }

  /// Spawn arbitrary pipeline work with the same delivery guarantees as
  /// [`request`](Self::request).
  pub fn dispatch<T, W>(&self, work: W, guard: Option<Guard>, completion: Completion<T>) -> InFlightHandle
  where
    T: Send + 'static,
    W: Future<Output = TypedResult<T>> + Send + 'static,
  {
    dispatch::spawn(self.runtime.as_ref(), &self.context, work, guard, completion)
  }

  fn resolve(&self, error: TransportError) -> TransferError {
    if error == TransportError::Cancelled {
      return TransferError::TransportFailure(error);
    }
    self.resolver.resolve(error).into_transfer()
  }
}

/// Decode a 2xx body. Never hands back partial data: anything that does not
/// parse as `T` is a `Decode` failure.
fn decode<T: DeserializeOwned>(body: Option<Vec<u8>>, requires_body: bool) -> TypedResult<T> {
  match body {
    Some(bytes) if !bytes.is_empty() => {
      serde_json::from_slice(&bytes).map_err(|e| TransferError::Decode(e.to_string()))
    }
    _ if requires_body => Err(TransferError::NoResponseBody),
    _ => serde_json::from_slice(b"null").map_err(|e| TransferError::Decode(e.to_string())),
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;
  use std::time::{Duration, Instant};

  use serde::Deserialize;
  use serde_json::json;

  use super::*;
  use crate::context::{self, ContextLoop};
  use crate::endpoint::{ApiBase, Method};
  use crate::error::{ApiErrorResolver, ResolvedError};
  use crate::transport::mock::MockTransport;

  #[derive(Debug, Clone, PartialEq, Deserialize)]
  struct Profile {
    id: u64,
    name: String,
  }

  fn setup() -> (Arc<MockTransport>, DataTransferPipeline, ContextLoop) {
    let transport = MockTransport::new();
    let (context, context_loop) = context::channel();
    let pipeline = DataTransferPipeline::new(transport.clone(), context);
    (transport, pipeline, context_loop)
  }

  fn profile_descriptor() -> EndpointDescriptor<(), Profile> {
    EndpointDescriptor::<(), Profile>::builder(Method::Get, "me")
      .build(&ApiBase::parse("https://api.example.com").unwrap())
      .unwrap()
  }

  /// Record outcomes plus whether they arrived on the pipeline's context.
  fn recorder<T: Send + 'static>(
    pipeline: &DataTransferPipeline,
  ) -> (
    Arc<Mutex<Vec<(TypedResult<T>, bool)>>>,
    impl FnOnce(TypedResult<T>) + Send + 'static,
  ) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let context = pipeline.context().clone();
    (seen, move |result: TypedResult<T>| {
      sink.lock().unwrap().push((result, context.is_current()))
    })
  }

  #[tokio::test]
  async fn test_success_is_decoded_and_delivered_on_context() {
    let (transport, pipeline, mut context_loop) = setup();
    transport.reply_json(json!({"id": 7, "name": "Ana"}));
    let (seen, completion) = recorder::<Profile>(&pipeline);

    pipeline.request(profile_descriptor(), completion);
    assert!(context_loop.next().await);

    let seen = seen.lock().unwrap();
    assert_eq!(
      *seen,
      vec![(
        Ok(Profile {
          id: 7,
          name: "Ana".to_string()
        }),
        true
      )]
    );
  }

  #[tokio::test]
  async fn test_malformed_payload_is_decode_failure() {
    let (transport, pipeline, _loop) = setup();
    transport.reply_json(json!({"id": "seven"}));

    let result = pipeline.fetch(&profile_descriptor()).await;

    assert!(matches!(result, Err(TransferError::Decode(_))));
  }

  #[tokio::test]
  async fn test_missing_body_is_no_response_body() {
    let (transport, pipeline, _loop) = setup();
    transport.reply(Ok(None));

    let result = pipeline.fetch(&profile_descriptor()).await;

    assert_eq!(result, Err(TransferError::NoResponseBody));
  }

  #[tokio::test]
  async fn test_empty_body_allowed_decodes_unit() {
    let (transport, pipeline, _loop) = setup();
    transport.reply(Ok(None));
    let descriptor = EndpointDescriptor::<(), ()>::builder(Method::Delete, "notes/1")
      .allow_empty_response()
      .build(&ApiBase::parse("https://api.example.com").unwrap())
      .unwrap();

    assert_eq!(pipeline.fetch(&descriptor).await, Ok(()));
  }

  #[tokio::test]
  async fn test_not_connected_passes_through() {
    let (transport, pipeline, _loop) = setup();
    transport.fail(TransportError::NotConnected);

    let result = pipeline.fetch(&profile_descriptor()).await;

    assert_eq!(
      result,
      Err(TransferError::TransportFailure(TransportError::NotConnected))
    );
  }

  #[tokio::test]
  async fn test_resolver_reclassifies_status_errors() {
    let (transport, pipeline, _loop) = setup();
    let pipeline = pipeline.with_resolver(Arc::new(ApiErrorResolver));
    transport.fail(TransportError::Status {
      code: 403,
      body: br#"{"message":"forbidden"}"#.to_vec(),
    });

    let result = pipeline.fetch(&profile_descriptor()).await;

    assert_eq!(
      result,
      Err(TransferError::Resolved(ResolvedError {
        status: Some(403),
        code: None,
        message: "forbidden".to_string(),
      }))
    );
  }

  #[tokio::test]
  async fn test_cancel_delivers_cancelled_once_and_drops_late_bytes() {
    let (transport, pipeline, mut context_loop) = setup();
    let gate = transport.reply_later();
    let (seen, completion) = recorder::<Profile>(&pipeline);

    let handle = pipeline.request(profile_descriptor(), completion);
    tokio::task::yield_now().await;
    handle.cancel();
    handle.cancel();

    // The transport future was dropped with the task, so the late reply goes nowhere.
    let _ = gate.send(Ok(Some(br#"{"id":1,"name":"late"}"#.to_vec())));
    tokio::time::sleep(Duration::from_millis(20)).await;
    context_loop.run_pending();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].0.as_ref().unwrap_err().is_cancelled());
    assert!(seen[0].1);
    assert!(handle.is_cancelled());
  }

  #[tokio::test]
  async fn test_cancel_after_result_queued_still_reports_cancelled() {
    let (transport, pipeline, mut context_loop) = setup();
    transport.reply_json(json!({"id": 1, "name": "Ana"}));
    let (seen, completion) = recorder::<Profile>(&pipeline);

    let handle = pipeline.request(profile_descriptor(), completion);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(handle.is_finished());

    handle.cancel();
    context_loop.run_pending();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].0.as_ref().unwrap_err().is_cancelled());
  }

  #[tokio::test]
  async fn test_guard_turns_superseded_result_into_cancelled() {
    let (_transport, pipeline, mut context_loop) = setup();
    let (seen, completion) = recorder::<u32>(&pipeline);

    pipeline.dispatch(async { Ok(5) }, Some(Arc::new(|| false)), Box::new(completion));
    assert!(context_loop.next().await);

    assert!(seen.lock().unwrap()[0].0.as_ref().unwrap_err().is_cancelled());
  }

  #[test]
  fn test_request_from_thread_outside_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
      .worker_threads(1)
      .enable_all()
      .build()
      .unwrap();
    let transport = MockTransport::new();
    transport.reply_json(json!({"id": 3, "name": "Bo"}));
    let (context, mut context_loop) = context::channel();
    let pipeline = DataTransferPipeline::new(transport.clone(), context)
      .with_runtime(runtime.handle().clone());
    let (seen, completion) = recorder::<Profile>(&pipeline);

    pipeline.request(profile_descriptor(), completion);

    let deadline = Instant::now() + Duration::from_secs(2);
    while seen.lock().unwrap().is_empty() && Instant::now() < deadline {
      context_loop.run_pending();
      std::thread::sleep(Duration::from_millis(5));
    }

    let seen = seen.lock().unwrap();
    assert_eq!(
      *seen,
      vec![(
        Ok(Profile {
          id: 3,
          name: "Bo".to_string()
        }),
        true
      )]
    );
  }

  #[test]
  fn test_request_without_runtime_fails_instead_of_panicking() {
    let (transport, pipeline, mut context_loop) = setup();
    let (seen, completion) = recorder::<Profile>(&pipeline);

    let handle = pipeline.request(profile_descriptor(), completion);

    assert_eq!(context_loop.run_pending(), 1);
    assert!(handle.is_finished());
    assert_eq!(transport.calls(), 0);
    let seen = seen.lock().unwrap();
    assert!(matches!(
      seen[0].0,
      Err(TransferError::TransportFailure(TransportError::Generic(_)))
    ));
    assert!(seen[0].1);
  }
}
