//! Application-level entry point: one use case per endpoint family.
//!
//! A use case checks the caller's inputs, resolves the endpoint case to a
//! descriptor and hands it to its repository under the operation the route
//! names. Invalid inputs are rejected before anything touches the network.

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::endpoint::{ApiBase, EndpointSet};
use crate::error::{TransferError, TypedResult};
use crate::pipeline::InFlightHandle;
use crate::repository::{CachedCallback, Repository};

/// A request body a use case can send.
pub trait RequestPayload: Serialize + Send + Sync + 'static {
  /// Reject inputs the server would refuse anyway.
  fn validate(&self) -> Result<(), String> {
    Ok(())
  }
}

impl RequestPayload for () {}

impl RequestPayload for serde_json::Value {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UseCaseError {
  /// Inputs were rejected before any request was made.
  #[error("invalid input: {0}")]
  Precondition(String),
  /// The request could not be built.
  #[error(transparent)]
  Transfer(TransferError),
}

/// Ties a closed endpoint set `E` to a repository and an API base.
pub struct UseCase<E> {
  repository: Repository,
  base: ApiBase,
  _endpoints: PhantomData<fn(E)>,
}

impl<E: EndpointSet> UseCase<E> {
  pub fn new(repository: Repository, base: ApiBase) -> Self {
    Self {
      repository,
      base,
      _endpoints: PhantomData,
    }
  }

  pub fn repository(&self) -> &Repository {
    &self.repository
  }

  /// Issue `endpoint` with `payload`.
  ///
  /// `cached` only fires for operations that read the store. `completion`
  /// fires exactly once on the pipeline's context unless this returns `Err`,
  /// in which case neither callback runs.
  pub fn request<Req, Resp>(
    &self,
    endpoint: &E,
    payload: Option<Req>,
    cached: Option<CachedCallback<Resp>>,
    completion: impl FnOnce(TypedResult<Resp>) + Send + 'static,
  ) -> Result<InFlightHandle, UseCaseError>
  where
    Req: RequestPayload,
    Resp: Serialize + DeserializeOwned + Send + 'static,
  {
    let route = endpoint.route();

    match &payload {
      Some(payload) => payload.validate().map_err(UseCaseError::Precondition)?,
      None if route.requires_payload() => {
        return Err(UseCaseError::Precondition(format!(
          "{} {} needs a request body",
          route.method, route.path
        )));
      }
      None => {}
    }

    let descriptor = route
      .descriptor::<Req, Resp>(payload, &self.base)
      .map_err(|e| UseCaseError::Transfer(TransferError::TransportFailure(e)))?;
    debug!(
      operation = route.operation.as_str(),
      request = %descriptor.request_line(),
      "use case request"
    );

    Ok(
      self
        .repository
        .perform(route.operation, descriptor, cached, completion),
    )
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  use serde_json::json;

  use super::*;
  use crate::context::{self, ContextLoop};
  use crate::endpoint::catalog::{AuthEndpoint, Credentials, NewNote, Note, NoteEndpoint, Session};
  use crate::endpoint::Method;
  use crate::error::TransportError;
  use crate::pipeline::DataTransferPipeline;
  use crate::store::{MemoryStore, PersistentResponseStore};
  use crate::transport::mock::MockTransport;

  fn setup<E: EndpointSet>() -> (Arc<MockTransport>, UseCase<E>, ContextLoop) {
    let transport = MockTransport::new();
    let (context, context_loop) = context::channel();
    let pipeline = DataTransferPipeline::new(transport.clone(), context);
    let repository = Repository::new(
      pipeline,
      PersistentResponseStore::new(MemoryStore::new()),
      "ana",
    );
    let base = ApiBase::parse("https://notes.example.com/api").unwrap();
    (transport, UseCase::new(repository, base), context_loop)
  }

  fn note_json(id: u64, title: &str) -> serde_json::Value {
    json!({"id": id, "title": title, "body": "", "tags": [], "updated_at": null})
  }

  #[tokio::test]
  async fn test_empty_password_fails_before_network() {
    let (transport, auth, _loop) = setup::<AuthEndpoint>();
    let credentials = Credentials {
      email: "ana@example.com".to_string(),
      password: String::new(),
    };

    let result = auth.request::<_, Session>(&AuthEndpoint::SignIn, Some(credentials), None, |_| {
      panic!("completion must not run");
    });

    assert_eq!(
      result.unwrap_err(),
      UseCaseError::Precondition("password must not be empty".to_string())
    );
    assert_eq!(transport.calls(), 0);
  }

  #[tokio::test]
  async fn test_create_without_payload_is_rejected() {
    let (transport, notes, _loop) = setup::<NoteEndpoint>();

    let result = notes.request::<NewNote, Note>(&NoteEndpoint::Create, None, None, |_| {});

    assert!(matches!(result, Err(UseCaseError::Precondition(_))));
    assert_eq!(transport.calls(), 0);
  }

  #[tokio::test]
  async fn test_sign_in_posts_credentials() {
    let (transport, auth, mut context_loop) = setup::<AuthEndpoint>();
    transport.reply_json(json!({"token": "t0k", "user_id": "u1"}));
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();

    auth
      .request::<_, Session>(
        &AuthEndpoint::SignIn,
        Some(Credentials {
          email: "ana@example.com".to_string(),
          password: "hunter2".to_string(),
        }),
        None,
        move |result: TypedResult<Session>| *sink.lock().unwrap() = Some(result),
      )
      .unwrap();
    assert!(context_loop.next().await);

    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.url.as_str(), "https://notes.example.com/api/auth/sign-in");
    assert_eq!(
      request.body.as_deref(),
      Some(br#"{"email":"ana@example.com","password":"hunter2"}"#.as_slice())
    );
    assert_eq!(
      seen.lock().unwrap().clone(),
      Some(Ok(Session {
        token: "t0k".to_string(),
        user_id: "u1".to_string(),
      }))
    );
  }

  #[tokio::test]
  async fn test_list_serves_cache_then_network() {
    let (transport, notes, mut context_loop) = setup::<NoteEndpoint>();
    let events = Arc::new(Mutex::new(Vec::new()));

    // First run populates the store.
    transport.reply_json(json!([note_json(1, "one")]));
    let sink = events.clone();
    notes
      .request::<(), Vec<Note>>(&NoteEndpoint::List { tag: None }, None, None, move |r| {
        sink.lock().unwrap().push(format!("fresh {}", r.unwrap().len()))
      })
      .unwrap();
    assert!(context_loop.next().await);

    transport.reply_json(json!([note_json(1, "one"), note_json(2, "two")]));
    let cached_sink = events.clone();
    let sink = events.clone();
    notes
      .request::<(), Vec<Note>>(
        &NoteEndpoint::List { tag: None },
        None,
        Some(Box::new(move |cached: Option<Vec<Note>>| {
          cached_sink
            .lock()
            .unwrap()
            .push(format!("cached {:?}", cached.map(|n| n.len())))
        })),
        move |r| sink.lock().unwrap().push(format!("fresh {}", r.unwrap().len())),
      )
      .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    context_loop.run_pending();

    assert_eq!(
      *events.lock().unwrap(),
      vec![
        "fresh 1".to_string(),
        "cached Some(1)".to_string(),
        "fresh 2".to_string(),
      ]
    );
  }

  #[tokio::test]
  async fn test_tag_filter_lands_in_query() {
    let (transport, notes, _loop) = setup::<NoteEndpoint>();
    transport.reply_json(json!([]));

    notes
      .request::<(), Vec<Note>>(
        &NoteEndpoint::List {
          tag: Some("work".to_string()),
        },
        None,
        None,
        |_| {},
      )
      .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(
      transport.requests()[0].url.as_str(),
      "https://notes.example.com/api/notes?tag=work"
    );
  }

  #[tokio::test]
  async fn test_server_error_reaches_completion() {
    let (transport, notes, mut context_loop) = setup::<NoteEndpoint>();
    transport.fail(TransportError::Status {
      code: 404,
      body: Vec::new(),
    });
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();

    notes
      .request::<(), Note>(&NoteEndpoint::Get { id: 3 }, None, None, move |r| {
        *sink.lock().unwrap() = Some(r)
      })
      .unwrap();
    assert!(context_loop.next().await);

    assert_eq!(
      seen.lock().unwrap().clone(),
      Some(Err(TransferError::TransportFailure(TransportError::Status {
        code: 404,
        body: Vec::new(),
      })))
    );
  }
}
