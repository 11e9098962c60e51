//! Typed, immutable descriptions of single API calls.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde::Serialize;
use serde_json::Value;
use url::form_urlencoded;

use super::wire::{fingerprint, ApiBase, Method, WireRequest};
use crate::error::TransportError;

/// How a request payload is written into the body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyEncoding {
  #[default]
  Json,
  /// `application/x-www-form-urlencoded`; the payload must be a flat object
  Form,
}

impl BodyEncoding {
  fn content_type(self) -> &'static str {
    match self {
      Self::Json => "application/json",
      Self::Form => "application/x-www-form-urlencoded",
    }
  }
}

/// One API operation: where it goes, what it sends, and the type `Resp` the
/// caller expects back.
///
/// Built once per call site through [`DescriptorBuilder`]; the wire form is
/// fixed at build time, so a descriptor can be executed, fingerprinted and
/// logged without re-serializing anything.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor<Req, Resp> {
  wire: WireRequest,
  payload: Option<Req>,
  encoding: BodyEncoding,
  cache_as: Option<String>,
  requires_body: bool,
  storable: bool,
  _response: PhantomData<fn() -> Resp>,
}

impl<Req, Resp> EndpointDescriptor<Req, Resp> {
  pub fn builder(method: Method, path: impl Into<String>) -> DescriptorBuilder<Req, Resp> {
    DescriptorBuilder {
      method,
      path: path.into(),
      headers: BTreeMap::new(),
      query: BTreeMap::new(),
      payload: None,
      encoding: BodyEncoding::default(),
      cache_as: None,
      requires_body: true,
      storable: true,
      _response: PhantomData,
    }
  }

  pub fn wire(&self) -> &WireRequest {
    &self.wire
  }

  pub fn method(&self) -> Method {
    self.wire.method
  }

  pub fn payload(&self) -> Option<&Req> {
    self.payload.as_ref()
  }

  pub fn encoding(&self) -> BodyEncoding {
    self.encoding
  }

  /// Whether an empty 2xx body is a `NoResponseBody` failure.
  pub fn requires_body(&self) -> bool {
    self.requires_body
  }

  pub fn request_line(&self) -> String {
    self.wire.request_line()
  }

  /// Whether a successful response may be written to the response store.
  pub fn is_storable(&self) -> bool {
    self.storable
  }

  /// Cache fingerprint: the explicit cache identity when one was given,
  /// otherwise the request's own identity (verb, target, body).
  pub fn fingerprint(&self) -> String {
    match &self.cache_as {
      Some(name) => fingerprint(format!("cache_as:{}", name).as_bytes()),
      None => fingerprint(&self.wire.identity()),
    }
  }
}

/// Builder for [`EndpointDescriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder<Req, Resp> {
  method: Method,
  path: String,
  headers: BTreeMap<String, String>,
  query: BTreeMap<String, String>,
  payload: Option<Req>,
  encoding: BodyEncoding,
  cache_as: Option<String>,
  requires_body: bool,
  storable: bool,
  _response: PhantomData<fn() -> Resp>,
}

impl<Req: Serialize, Resp> DescriptorBuilder<Req, Resp> {
  pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
    self
      .headers
      .insert(name.as_ref().to_ascii_lowercase(), value.into());
    self
  }

  pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
    self.query.insert(name.into(), value.to_string());
    self
  }

  pub fn queries(mut self, pairs: &BTreeMap<String, String>) -> Self {
    self
      .query
      .extend(pairs.iter().map(|(k, v)| (k.clone(), v.clone())));
    self
  }

  pub fn body(mut self, payload: Req) -> Self {
    self.payload = Some(payload);
    self
  }

  pub fn maybe_body(mut self, payload: Option<Req>) -> Self {
    self.payload = payload;
    self
  }

  pub fn encoding(mut self, encoding: BodyEncoding) -> Self {
    self.encoding = encoding;
    self
  }

  /// Share one cache entry between operations on the same resource
  /// (e.g. reading and patching a single item).
  pub fn cache_as(mut self, name: impl Into<String>) -> Self {
    self.cache_as = Some(name.into());
    self
  }

  /// Accept an empty 2xx body; it decodes as JSON `null`.
  pub fn allow_empty_response(mut self) -> Self {
    self.requires_body = false;
    self
  }

  /// Never persist the response (credentials, session tokens).
  pub fn no_store(mut self) -> Self {
    self.storable = false;
    self
  }

  /// Resolve against `base` and freeze the wire form.
  ///
  /// Fails with `UrlGeneration` when no well-formed target can be produced;
  /// in that case nothing is ever sent.
  pub fn build(self, base: &ApiBase) -> Result<EndpointDescriptor<Req, Resp>, TransportError> {
    let url = base.resolve(&self.path, &self.query)?;
    let mut headers = self.headers;

    let body = match &self.payload {
      Some(payload) => {
        let bytes = encode_body(payload, self.encoding)?;
        headers
          .entry("content-type".to_string())
          .or_insert_with(|| self.encoding.content_type().to_string());
        Some(bytes)
      }
      None => None,
    };
    headers
      .entry("accept".to_string())
      .or_insert_with(|| "application/json".to_string());

    Ok(EndpointDescriptor {
      wire: WireRequest {
        method: self.method,
        url,
        headers,
        body,
      },
      payload: self.payload,
      encoding: self.encoding,
      cache_as: self.cache_as,
      requires_body: self.requires_body,
      storable: self.storable,
      _response: PhantomData,
    })
  }
}

/// Serialize through `serde_json::Value` so object keys come out sorted
/// whatever map type the payload uses.
fn encode_body<T: Serialize>(payload: &T, encoding: BodyEncoding) -> Result<Vec<u8>, TransportError> {
  let value = serde_json::to_value(payload)
    .map_err(|e| TransportError::Generic(format!("could not encode request body: {}", e)))?;

  match encoding {
    BodyEncoding::Json => serde_json::to_vec(&value)
      .map_err(|e| TransportError::Generic(format!("could not encode request body: {}", e))),
    BodyEncoding::Form => encode_form(&value).map(String::into_bytes),
  }
}

fn encode_form(value: &Value) -> Result<String, TransportError> {
  let Value::Object(fields) = value else {
    return Err(TransportError::UrlGeneration(
      "form bodies must be objects".to_string(),
    ));
  };

  let mut form = form_urlencoded::Serializer::new(String::new());
  for (name, field) in fields {
    match field {
      Value::Null => {}
      Value::String(s) => {
        form.append_pair(name, s);
      }
      Value::Bool(_) | Value::Number(_) => {
        form.append_pair(name, &field.to_string());
      }
      Value::Array(_) | Value::Object(_) => {
        return Err(TransportError::UrlGeneration(format!(
          "form field '{}' is not a scalar",
          name
        )));
      }
    }
  }
  Ok(form.finish())
}
