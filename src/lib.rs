//! Typed data-access pipeline.
//!
//! A call site names an endpoint case, a [`usecase::UseCase`] turns it into an
//! [`endpoint::EndpointDescriptor`], and a [`repository::Repository`] runs it
//! through the [`pipeline::DataTransferPipeline`] (transport, decode, error
//! resolution). Successful responses land in the
//! [`store::PersistentResponseStore`]; read operations can serve the stored
//! value first while the network request is in flight. Every callback runs on
//! the caller's [`context::ExecutionContext`].

pub mod config;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod repository;
pub mod session;
pub mod store;
pub mod transport;
pub mod usecase;

pub use endpoint::{EndpointDescriptor, EndpointSet, Operation};
pub use error::{TransferError, TransportError, TypedResult};
pub use pipeline::{DataTransferPipeline, InFlightHandle};
pub use repository::Repository;
pub use store::PersistentResponseStore;
pub use usecase::{RequestPayload, UseCase, UseCaseError};
