//! Closed endpoint enumerations and the routes they resolve to.

use std::collections::BTreeMap;

use serde::Serialize;

use super::descriptor::{BodyEncoding, EndpointDescriptor};
use super::wire::{ApiBase, Method};
use crate::error::TransportError;

/// Repository operation an endpoint maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
  GetAll,
  GetOne,
  CreateOne,
  UpdateOne,
  DeleteOne,
  DeleteAll,
}

impl Operation {
  /// Operations that can serve a stored value before the network answers.
  pub fn reads_cache(self) -> bool {
    matches!(self, Self::GetAll | Self::GetOne | Self::UpdateOne)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::GetAll => "get_all",
      Self::GetOne => "get_one",
      Self::CreateOne => "create_one",
      Self::UpdateOne => "update_one",
      Self::DeleteOne => "delete_one",
      Self::DeleteAll => "delete_all",
    }
  }
}

/// Everything needed to build a descriptor for one endpoint case, minus the
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
  pub operation: Operation,
  pub method: Method,
  pub path: String,
  pub query: BTreeMap<String, String>,
  pub encoding: BodyEncoding,
  pub cache_as: Option<String>,
  pub expects_body: bool,
  /// Responses may be persisted
  pub storable: bool,
}

impl Route {
  pub fn new(operation: Operation, method: Method, path: impl Into<String>) -> Self {
    Self {
      operation,
      method,
      path: path.into(),
      query: BTreeMap::new(),
      encoding: BodyEncoding::Json,
      cache_as: None,
      expects_body: true,
      storable: true,
    }
  }

  pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
    self.query.insert(name.into(), value.to_string());
    self
  }

  pub fn cache_as(mut self, name: impl Into<String>) -> Self {
    self.cache_as = Some(name.into());
    self
  }

  pub fn form(mut self) -> Self {
    self.encoding = BodyEncoding::Form;
    self
  }

  /// The server answers with an empty body (204 and friends).
  pub fn no_content(mut self) -> Self {
    self.expects_body = false;
    self
  }

  /// Responses carry secrets and must never reach the store.
  pub fn no_store(mut self) -> Self {
    self.storable = false;
    self
  }

  /// Whether the endpoint is meaningless without a request payload.
  pub fn requires_payload(&self) -> bool {
    self.method.sends_body()
  }

  pub fn descriptor<Req: Serialize, Resp>(
    &self,
    payload: Option<Req>,
    base: &ApiBase,
  ) -> Result<EndpointDescriptor<Req, Resp>, TransportError> {
    let mut builder = EndpointDescriptor::<Req, Resp>::builder(self.method, self.path.clone())
      .queries(&self.query)
      .encoding(self.encoding)
      .maybe_body(payload);
    if let Some(name) = &self.cache_as {
      builder = builder.cache_as(name.clone());
    }
    if !self.expects_body {
      builder = builder.allow_empty_response();
    }
    if !self.storable {
      builder = builder.no_store();
    }
    builder.build(base)
  }
}

/// A closed set of named operations, one variant per endpoint.
///
/// Implemented by plain enums whose `route` is an exhaustive `match`, so
/// adding a case without a route does not compile.
pub trait EndpointSet: Send + Sync {
  fn route(&self) -> Route;
}
