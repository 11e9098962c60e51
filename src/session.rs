//! Session lifecycle on top of the auth use case.

use tracing::debug;

use crate::endpoint::catalog::AuthEndpoint;
use crate::error::TypedResult;
use crate::pipeline::InFlightHandle;
use crate::repository;
use crate::usecase::{UseCase, UseCaseError};

/// What a sign-out did locally and remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOutOutcome {
  /// Cache entries removed for the principal
  pub dropped: usize,
  /// Result of ending the session on the server
  pub result: TypedResult<()>,
}

/// End the session and drop every cached response of the auth repository's
/// principal.
///
/// The local invalidation happens whatever the server says, including when
/// the request fails, is cancelled, or cannot be issued at all. It runs once
/// the request settles so no late response can repopulate the store.
pub fn sign_out(
  auth: &UseCase<AuthEndpoint>,
  completion: impl FnOnce(SignOutOutcome) + Send + 'static,
) -> Result<InFlightHandle, UseCaseError> {
  let store = auth.repository().store().clone();
  let principal = auth.repository().principal().to_string();

  let issued = {
    let store = store.clone();
    let principal = principal.clone();
    auth.request::<(), ()>(&AuthEndpoint::SignOut, None, None, move |result| {
      let dropped = repository::invalidate(&store, &principal);
      debug!(principal = %principal, dropped, ok = result.is_ok(), "signed out");
      completion(SignOutOutcome { dropped, result });
    })
  };

  if issued.is_err() {
    repository::invalidate(&store, &principal);
  }
  issued
}
