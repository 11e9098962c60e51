//! Scripted transport for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use super::{Transport, TransportResult};
use crate::endpoint::WireRequest;
use crate::error::TransportError;

enum Step {
  Reply(TransportResult),
  /// Held until the test sends the outcome
  Gated(oneshot::Receiver<TransportResult>),
}

/// Replays scripted outcomes in order and records every request it sees.
#[derive(Default)]
pub(crate) struct MockTransport {
  script: Mutex<VecDeque<Step>>,
  requests: Mutex<Vec<WireRequest>>,
}

impl MockTransport {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub(crate) fn reply(&self, outcome: TransportResult) {
    self.script.lock().unwrap().push_back(Step::Reply(outcome));
  }

  pub(crate) fn reply_json(&self, value: serde_json::Value) {
    self.reply(Ok(Some(serde_json::to_vec(&value).unwrap())));
  }

  pub(crate) fn fail(&self, error: TransportError) {
    self.reply(Err(error));
  }

  /// Queue a reply that only resolves once the returned sender fires.
  pub(crate) fn reply_later(&self) -> oneshot::Sender<TransportResult> {
    let (tx, rx) = oneshot::channel();
    self.script.lock().unwrap().push_back(Step::Gated(rx));
    tx
  }

  pub(crate) fn calls(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  pub(crate) fn requests(&self) -> Vec<WireRequest> {
    self.requests.lock().unwrap().clone()
  }
}

impl Transport for MockTransport {
  fn execute(&self, request: WireRequest) -> BoxFuture<'static, TransportResult> {
    self.requests.lock().unwrap().push(request);
    let step = self.script.lock().unwrap().pop_front();

    Box::pin(async move {
      match step {
        Some(Step::Reply(outcome)) => outcome,
        Some(Step::Gated(rx)) => rx
          .await
          .unwrap_or_else(|_| Err(TransportError::Generic("gate dropped".to_string()))),
        None => Err(TransportError::Generic("no scripted reply".to_string())),
      }
    })
  }
}
