/// Available commands and their mapping onto endpoints
use clap::Subcommand;

use datapipe::endpoint::catalog::{NewNote, NoteEndpoint, NotePatch};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Sign in (password from DATAPIPE_PASSWORD) and print the session
  SignIn {
    #[arg(long)]
    email: String,
  },
  /// End the session and drop everything cached for the principal
  SignOut,
  /// Work with notes
  #[command(subcommand)]
  Notes(NotesCommand),
  /// Manage the local response cache
  #[command(subcommand)]
  Cache(CacheCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum NotesCommand {
  /// List notes, optionally filtered by tag
  #[command(alias = "ls")]
  List {
    #[arg(long)]
    tag: Option<String>,
  },
  /// Show one note
  Get { id: u64 },
  /// Create a note
  Create {
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    body: String,
    #[arg(long = "tag")]
    tags: Vec<String>,
  },
  /// Change a note's title and/or body
  Update {
    id: u64,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    body: Option<String>,
  },
  /// Delete one note
  #[command(alias = "rm")]
  Delete { id: u64 },
  /// Delete every note
  DeleteAll {
    /// Required; there is no undo
    #[arg(long)]
    yes: bool,
  },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CacheCommand {
  /// Remove cached responses for the current principal
  Clear {
    /// Remove entries of every principal
    #[arg(long)]
    all: bool,
  },
}

impl NotesCommand {
  pub fn endpoint(&self) -> NoteEndpoint {
    match self {
      Self::List { tag } => NoteEndpoint::List { tag: tag.clone() },
      Self::Get { id } => NoteEndpoint::Get { id: *id },
      Self::Create { .. } => NoteEndpoint::Create,
      Self::Update { id, .. } => NoteEndpoint::Update { id: *id },
      Self::Delete { id } => NoteEndpoint::Delete { id: *id },
      Self::DeleteAll { .. } => NoteEndpoint::DeleteAll,
    }
  }

  /// Body for `create`, `None` for every other command.
  pub fn new_note(&self) -> Option<NewNote> {
    match self {
      Self::Create { title, body, tags } => Some(NewNote {
        title: title.clone(),
        body: body.clone(),
        tags: tags.clone(),
      }),
      _ => None,
    }
  }

  /// Body for `update`, `None` for every other command.
  pub fn patch(&self) -> Option<NotePatch> {
    match self {
      Self::Update { title, body, .. } => Some(NotePatch {
        title: title.clone(),
        body: body.clone(),
      }),
      _ => None,
    }
  }
}
