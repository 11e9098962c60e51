//! Generic CRUD contract over the transfer pipeline and the response store.
//!
//! Every operation follows the same script:
//! 1. if the operation reads the cache and a `cached` callback was given,
//!    post the stored value (or `None`) to the caller's context
//! 2. issue the network request
//! 3. on success, reconcile the store, then deliver `Ok(value)`
//! 4. on failure, deliver `Err(error)` and leave the store alone
//!
//! A repository owns one [`RequestSlot`]: issuing a request cancels the one
//! before it. Callers that need independent concurrent requests use separate
//! repositories.

mod slot;

pub use slot::RequestSlot;

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::endpoint::{EndpointDescriptor, Operation};
use crate::error::{TransferError, TypedResult};
use crate::pipeline::{DataTransferPipeline, InFlightHandle};
use crate::store::{CacheKey, PersistentResponseStore};

/// Callback receiving the stored value ahead of the network result.
pub type CachedCallback<T> = Box<dyn FnOnce(Option<T>) + Send + 'static>;

/// Pipeline + store behind the get/create/update/delete operation family.
pub struct Repository {
  pipeline: DataTransferPipeline,
  store: PersistentResponseStore,
  principal: String,
  slot: Arc<RequestSlot>,
}

impl Repository {
  /// `principal` scopes every cache entry this repository reads or writes.
  pub fn new(
    pipeline: DataTransferPipeline,
    store: PersistentResponseStore,
    principal: impl Into<String>,
  ) -> Self {
    Self {
      pipeline,
      store,
      principal: principal.into(),
      slot: Arc::new(RequestSlot::new()),
    }
  }

  pub fn principal(&self) -> &str {
    &self.principal
  }

  pub fn store(&self) -> &PersistentResponseStore {
    &self.store
  }

  /// Handle of the most recently issued request.
  pub fn current(&self) -> Option<InFlightHandle> {
    self.slot.current()
  }

  /// Cancel the outstanding request, if any.
  pub fn cancel(&self) {
    self.slot.cancel();
  }

  /// Drop every cache entry belonging to `principal` (sign-out and other
  /// invalidation events). Returns how many entries went.
  pub fn invalidate_principal(&self, principal: &str) -> usize {
    invalidate(&self.store, principal)
  }

  pub fn get_all<Req, Resp>(
    &self,
    descriptor: EndpointDescriptor<Req, Resp>,
    cached: Option<CachedCallback<Resp>>,
    completion: impl FnOnce(TypedResult<Resp>) + Send + 'static,
  ) -> InFlightHandle
  where
    Req: Send + Sync + 'static,
    Resp: Serialize + DeserializeOwned + Send + 'static,
  {
    self.perform(Operation::GetAll, descriptor, cached, completion)
  }

  pub fn get_one<Req, Resp>(
    &self,
    descriptor: EndpointDescriptor<Req, Resp>,
    cached: Option<CachedCallback<Resp>>,
    completion: impl FnOnce(TypedResult<Resp>) + Send + 'static,
  ) -> InFlightHandle
  where
    Req: Send + Sync + 'static,
    Resp: Serialize + DeserializeOwned + Send + 'static,
  {
    self.perform(Operation::GetOne, descriptor, cached, completion)
  }

  pub fn create_one<Req, Resp>(
    &self,
    descriptor: EndpointDescriptor<Req, Resp>,
    completion: impl FnOnce(TypedResult<Resp>) + Send + 'static,
  ) -> InFlightHandle
  where
    Req: Send + Sync + 'static,
    Resp: Serialize + DeserializeOwned + Send + 'static,
  {
    self.perform(Operation::CreateOne, descriptor, None, completion)
  }

  /// The `cached` value is the last known state of the item, which callers
  /// can show while the update is in flight.
  pub fn update_one<Req, Resp>(
    &self,
    descriptor: EndpointDescriptor<Req, Resp>,
    cached: Option<CachedCallback<Resp>>,
    completion: impl FnOnce(TypedResult<Resp>) + Send + 'static,
  ) -> InFlightHandle
  where
    Req: Send + Sync + 'static,
    Resp: Serialize + DeserializeOwned + Send + 'static,
  {
    self.perform(Operation::UpdateOne, descriptor, cached, completion)
  }

  /// On success the entry under the descriptor's fingerprint is removed.
  pub fn delete_one<Req, Resp>(
    &self,
    descriptor: EndpointDescriptor<Req, Resp>,
    completion: impl FnOnce(TypedResult<Resp>) + Send + 'static,
  ) -> InFlightHandle
  where
    Req: Send + Sync + 'static,
    Resp: Serialize + DeserializeOwned + Send + 'static,
  {
    self.perform(Operation::DeleteOne, descriptor, None, completion)
  }

  /// On success every entry of this repository's principal is removed.
  pub fn delete_all<Req, Resp>(
    &self,
    descriptor: EndpointDescriptor<Req, Resp>,
    completion: impl FnOnce(TypedResult<Resp>) + Send + 'static,
  ) -> InFlightHandle
  where
    Req: Send + Sync + 'static,
    Resp: Serialize + DeserializeOwned + Send + 'static,
  {
    self.perform(Operation::DeleteAll, descriptor, None, completion)
  }

  /// Run `operation` for `descriptor`. The named methods above forward here;
  /// use cases call it directly with the operation their route names.
  pub fn perform<Req, Resp>(
    &self,
    operation: Operation,
    descriptor: EndpointDescriptor<Req, Resp>,
    cached: Option<CachedCallback<Resp>>,
    completion: impl FnOnce(TypedResult<Resp>) + Send + 'static,
  ) -> InFlightHandle
  where
    Req: Send + Sync + 'static,
    Resp: Serialize + DeserializeOwned + Send + 'static,
  {
    let key = CacheKey::new(self.principal.clone(), descriptor.fingerprint());
    let generation = self.slot.advance();
    debug!(
      operation = operation.as_str(),
      request = %descriptor.request_line(),
      generation,
      "issuing request"
    );

    if let Some(cached) = cached {
      if operation.reads_cache() {
        let value = self.store.lookup::<Resp>(&key);
        debug!(key = %key, hit = value.is_some(), "serving cached value");
        self.pipeline.context().post(move || cached(value));
      }
    }

    let pipeline = self.pipeline.clone();
    let store = self.store.clone();
    let slot = Arc::clone(&self.slot);
    let principal = self.principal.clone();
    let work = async move {
      let result = pipeline.fetch(&descriptor).await;
      let storable = descriptor.is_storable();
      let reconciled = slot.while_current(generation, || {
        if let Ok(value) = &result {
          reconcile(&store, operation, &key, &principal, storable, value);
        }
      });
      if reconciled.is_none() {
        debug!(generation, "discarding superseded response");
        return Err(TransferError::cancelled());
      }
      result
    };

    let handle = self
      .pipeline
      .dispatch(work, Some(self.slot.guard(generation)), Box::new(completion));
    self.slot.install(generation, handle.clone());
    handle
  }
}

/// Drop `principal`'s entries, logging rather than failing.
pub(crate) fn invalidate(store: &PersistentResponseStore, principal: &str) -> usize {
  match store.delete_principal(principal) {
    Ok(count) => {
      info!(principal, count, "invalidated cached responses");
      count
    }
    Err(error) => {
      warn!(principal, error = %error, "failed to invalidate cached responses");
      0
    }
  }
}

/// Bring the store in line with a successful response.
fn reconcile<V: Serialize>(
  store: &PersistentResponseStore,
  operation: Operation,
  key: &CacheKey,
  principal: &str,
  storable: bool,
  value: &V,
) {
  let outcome = match operation {
    Operation::DeleteOne => store.delete(key),
    Operation::DeleteAll => store.delete_principal(principal).map(|_| ()),
    Operation::GetAll | Operation::GetOne | Operation::CreateOne | Operation::UpdateOne => {
      if !storable {
        return;
      }
      store.store(key, value)
    }
  };

  if let Err(error) = outcome {
    warn!(key = %key, operation = operation.as_str(), error = %error, "cache update failed");
  }
}
