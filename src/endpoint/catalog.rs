//! Endpoint catalog for the notes service used by the CLI.

use serde::{Deserialize, Serialize};

use super::route::{EndpointSet, Operation, Route};
use super::wire::Method;
use crate::usecase::RequestPayload;

// ============================================================================
// Payloads
// ============================================================================

/// Sign-in request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
  pub email: String,
  pub password: String,
}

impl RequestPayload for Credentials {
  fn validate(&self) -> Result<(), String> {
    if self.email.trim().is_empty() {
      return Err("email must not be empty".to_string());
    }
    if self.password.is_empty() {
      return Err("password must not be empty".to_string());
    }
    Ok(())
  }
}

/// Session returned by a successful sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub token: String,
  pub user_id: String,
}

/// A single note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
  pub id: u64,
  pub title: String,
  #[serde(default)]
  pub body: String,
  #[serde(default)]
  pub tags: Vec<String>,
  pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNote {
  pub title: String,
  #[serde(default)]
  pub body: String,
  #[serde(default)]
  pub tags: Vec<String>,
}

impl RequestPayload for NewNote {
  fn validate(&self) -> Result<(), String> {
    if self.title.trim().is_empty() {
      return Err("title must not be empty".to_string());
    }
    Ok(())
  }
}

/// Partial update; omitted fields stay unchanged on the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotePatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub body: Option<String>,
}

impl RequestPayload for NotePatch {
  fn validate(&self) -> Result<(), String> {
    match (&self.title, &self.body) {
      (None, None) => Err("patch must change at least one field".to_string()),
      (Some(title), _) if title.trim().is_empty() => Err("title must not be empty".to_string()),
      _ => Ok(()),
    }
  }
}

// ============================================================================
// Endpoints
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEndpoint {
  SignIn,
  SignOut,
}

impl EndpointSet for AuthEndpoint {
  fn route(&self) -> Route {
    match self {
      // The session holds the bearer token; keep it out of the store.
      Self::SignIn => Route::new(Operation::CreateOne, Method::Post, "auth/sign-in").no_store(),
      Self::SignOut => {
        Route::new(Operation::DeleteOne, Method::Delete, "auth/session").no_content()
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteEndpoint {
  List { tag: Option<String> },
  Get { id: u64 },
  Create,
  Update { id: u64 },
  Delete { id: u64 },
  DeleteAll,
}

impl EndpointSet for NoteEndpoint {
  fn route(&self) -> Route {
    match self {
      Self::List { tag } => {
        let route = Route::new(Operation::GetAll, Method::Get, "notes");
        match tag {
          Some(tag) => route.query("tag", tag),
          None => route,
        }
      }
      Self::Get { id } => {
        Route::new(Operation::GetOne, Method::Get, format!("notes/{}", id)).cache_as(note_key(*id))
      }
      Self::Create => Route::new(Operation::CreateOne, Method::Post, "notes"),
      Self::Update { id } => Route::new(Operation::UpdateOne, Method::Patch, format!("notes/{}", id))
        .cache_as(note_key(*id)),
      Self::Delete { id } => Route::new(Operation::DeleteOne, Method::Delete, format!("notes/{}", id))
        .cache_as(note_key(*id))
        .no_content(),
      Self::DeleteAll => Route::new(Operation::DeleteAll, Method::Delete, "notes").no_content(),
    }
  }
}

/// Reads, patches and deletes of one note share a cache entry.
fn note_key(id: u64) -> String {
  format!("note:{}", id)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_note_routes_share_cache_identity() {
    let get = NoteEndpoint::Get { id: 9 }.route();
    let update = NoteEndpoint::Update { id: 9 }.route();
    let delete = NoteEndpoint::Delete { id: 9 }.route();

    assert_eq!(get.cache_as.as_deref(), Some("note:9"));
    assert_eq!(get.cache_as, update.cache_as);
    assert_eq!(get.cache_as, delete.cache_as);
    assert_eq!(update.method, Method::Patch);
    assert!(!delete.expects_body);
  }

  #[test]
  fn test_sign_in_session_is_never_stored() {
    let route = AuthEndpoint::SignIn.route();
    assert!(!route.storable);
    assert_eq!(route.cache_as, None);
    assert!(NoteEndpoint::Get { id: 1 }.route().storable);
  }

  #[test]
  fn test_list_route_carries_tag_query() {
    let route = NoteEndpoint::List {
      tag: Some("work".to_string()),
    }
    .route();
    assert_eq!(route.operation, Operation::GetAll);
    assert_eq!(route.query.get("tag").map(String::as_str), Some("work"));
  }

  #[test]
  fn test_credentials_validation() {
    let ok = Credentials {
      email: "ana@example.com".to_string(),
      password: "hunter2".to_string(),
    };
    assert!(ok.validate().is_ok());

    let empty_password = Credentials {
      password: String::new(),
      ..ok.clone()
    };
    assert_eq!(
      empty_password.validate(),
      Err("password must not be empty".to_string())
    );

    let blank_email = Credentials {
      email: "  ".to_string(),
      ..ok
    };
    assert!(blank_email.validate().is_err());
  }

  #[test]
  fn test_patch_needs_a_change() {
    assert!(NotePatch::default().validate().is_err());
    assert!(NotePatch {
      body: Some("new body".to_string()),
      ..Default::default()
    }
    .validate()
    .is_ok());
  }
}
