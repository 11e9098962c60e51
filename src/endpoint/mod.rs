//! Typed endpoint descriptions and their canonical wire form.
//!
//! A call site picks a case from a closed endpoint enumeration (see
//! [`EndpointSet`]), which resolves to a [`Route`]; the route plus a payload
//! builds an [`EndpointDescriptor`]. Descriptors are deterministic: equal
//! inputs produce byte-identical [`WireRequest`]s and equal fingerprints.

pub mod catalog;
mod descriptor;
mod route;
mod wire;

pub use descriptor::{BodyEncoding, DescriptorBuilder, EndpointDescriptor};
pub use route::{EndpointSet, Operation, Route};
pub use wire::{ApiBase, Method, WireRequest};
