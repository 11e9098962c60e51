use std::sync::{Arc, Mutex};

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::commands::{CacheCommand, Command, NotesCommand};
use datapipe::config::Config;
use datapipe::context::{self, ContextLoop};
use datapipe::endpoint::catalog::{AuthEndpoint, Credentials, Note, NoteEndpoint, Session};
use datapipe::endpoint::ApiBase;
use datapipe::error::{ApiErrorResolver, TypedResult};
use datapipe::pipeline::{Completion, DataTransferPipeline, InFlightHandle};
use datapipe::repository::{CachedCallback, Repository};
use datapipe::session;
use datapipe::store::{PersistentResponseStore, SqliteStore};
use datapipe::transport::HttpTransport;
use datapipe::usecase::{UseCase, UseCaseError};

/// Main application state
pub struct App {
  /// Cache scope for every repository
  principal: String,

  store: PersistentResponseStore,

  auth: UseCase<AuthEndpoint>,

  notes: UseCase<NoteEndpoint>,

  /// Where completions are delivered; drained while a command waits
  context_loop: ContextLoop,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let base = ApiBase::parse(&config.api.base_url)
      .map_err(|e| eyre!("Invalid api.base_url '{}': {}", config.api.base_url, e))?;

    let mut transport = HttpTransport::new(config.timeout(), &config.api.user_agent)?;
    if let Some(token) = Config::get_api_token() {
      transport = transport.with_bearer_token(&token);
    }

    let (context, context_loop) = context::channel();
    let pipeline = DataTransferPipeline::new(Arc::new(transport), context)
      .with_resolver(Arc::new(ApiErrorResolver));

    let store = open_store(&config)?;
    let principal = config.principal().to_string();
    info!(base = base.as_str(), principal = %principal, "datapipe starting");

    let auth = UseCase::new(
      Repository::new(pipeline.clone(), store.clone(), principal.clone()),
      base.clone(),
    );
    let notes = UseCase::new(
      Repository::new(pipeline, store.clone(), principal.clone()),
      base,
    );

    Ok(Self {
      principal,
      store,
      auth,
      notes,
      context_loop,
    })
  }

  pub async fn run(&mut self, command: Command) -> Result<()> {
    match command {
      Command::SignIn { email } => {
        let credentials = Credentials {
          email,
          password: Config::get_password()?,
        };
        let session: Session = wait_for(&mut self.context_loop, |done| {
          self
            .auth
            .request::<_, Session>(&AuthEndpoint::SignIn, Some(credentials), None, done)
        })
        .await?;
        if session.user_id != self.principal {
          info!(user_id = %session.user_id, "signed in; set `principal` to this id to scope the cache");
        }
        print_json(&session)
      }
      Command::SignOut => {
        let outcome = drive::<session::SignOutOutcome>(&mut self.context_loop, |done| {
          session::sign_out(&self.auth, done)
        })
        .await?;
        eprintln!("Dropped {} cached responses", outcome.dropped);
        outcome
          .result
          .map_err(|e| eyre!("Sign-out request failed: {}", e))?;
        eprintln!("Signed out");
        Ok(())
      }
      Command::Notes(command) => self.run_notes(command).await,
      Command::Cache(CacheCommand::Clear { all }) => {
        let removed = if all {
          self.store.delete_where(|_| true)?
        } else {
          self.store.delete_principal(&self.principal)?
        };
        eprintln!("Removed {} cached responses", removed);
        Ok(())
      }
    }
  }

  async fn run_notes(&mut self, command: NotesCommand) -> Result<()> {
    let endpoint = command.endpoint();
    match &command {
      NotesCommand::List { .. } => {
        let notes: Vec<Note> = wait_for(&mut self.context_loop, |done| {
          self
            .notes
            .request::<(), Vec<Note>>(&endpoint, None, Some(show_cached("notes")), done)
        })
        .await?;
        print_json(&notes)
      }
      NotesCommand::Get { .. } => {
        let note: Note = wait_for(&mut self.context_loop, |done| {
          self
            .notes
            .request::<(), Note>(&endpoint, None, Some(show_cached("note")), done)
        })
        .await?;
        print_json(&note)
      }
      NotesCommand::Create { .. } => {
        let payload = command.new_note();
        let note: Note = wait_for(&mut self.context_loop, |done| {
          self.notes.request::<_, Note>(&endpoint, payload, None, done)
        })
        .await?;
        print_json(&note)
      }
      NotesCommand::Update { .. } => {
        let payload = command.patch();
        let note: Note = wait_for(&mut self.context_loop, |done| {
          self
            .notes
            .request::<_, Note>(&endpoint, payload, Some(show_cached("note")), done)
        })
        .await?;
        print_json(&note)
      }
      NotesCommand::Delete { id } => {
        wait_for::<()>(&mut self.context_loop, |done| {
          self.notes.request::<(), ()>(&endpoint, None, None, done)
        })
        .await?;
        eprintln!("Deleted note {}", id);
        Ok(())
      }
      NotesCommand::DeleteAll { yes } => {
        if !yes {
          return Err(eyre!("Refusing to delete every note without --yes"));
        }
        wait_for::<()>(&mut self.context_loop, |done| {
          self.notes.request::<(), ()>(&endpoint, None, None, done)
        })
        .await?;
        eprintln!("Deleted all notes");
        Ok(())
      }
    }
  }
}

fn open_store(config: &Config) -> Result<PersistentResponseStore> {
  if !config.cache.enabled {
    debug!("response cache disabled");
    return Ok(PersistentResponseStore::disabled());
  }

  let backend = match &config.cache.path {
    Some(path) => SqliteStore::open_at(path)?,
    None => SqliteStore::open()?,
  };
  let store = PersistentResponseStore::new(backend);

  Ok(match config.cache_max_age() {
    Some(max_age) => store.with_max_age(max_age),
    None => store,
  })
}

/// Issue a request and wait for its typed result.
async fn wait_for<T: Send + 'static>(
  context_loop: &mut ContextLoop,
  issue: impl FnOnce(Completion<T>) -> std::result::Result<InFlightHandle, UseCaseError>,
) -> Result<T> {
  drive::<TypedResult<T>>(context_loop, issue)
    .await?
    .map_err(|e| eyre!("Request failed: {}", e))
}

/// Issue a request and drive the context loop until its completion has run.
/// Ctrl-C cancels the request, which then completes with `Cancelled`.
async fn drive<R: Send + 'static>(
  context_loop: &mut ContextLoop,
  issue: impl FnOnce(Box<dyn FnOnce(R) + Send + 'static>)
    -> std::result::Result<InFlightHandle, UseCaseError>,
) -> Result<R> {
  let outcome: Arc<Mutex<Option<R>>> = Arc::new(Mutex::new(None));
  let sink = outcome.clone();
  let handle = issue(Box::new(move |result: R| {
    if let Ok(mut slot) = sink.lock() {
      *slot = Some(result);
    }
  }))?;

  let ctrl_c = tokio::signal::ctrl_c();
  tokio::pin!(ctrl_c);
  let mut interrupted = false;

  loop {
    let finished = outcome
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .take();
    if let Some(result) = finished {
      return Ok(result);
    }

    tokio::select! {
      alive = context_loop.next() => {
        if !alive {
          return Err(eyre!("Execution context closed before request {} finished", handle.id()));
        }
      }
      _ = &mut ctrl_c, if !interrupted => {
        interrupted = true;
        info!(request = handle.id(), "interrupted, cancelling");
        handle.cancel();
      }
    }
  }
}

/// Show whatever the cache holds while the network request is in flight.
fn show_cached<T: Serialize + Send + 'static>(what: &'static str) -> CachedCallback<T> {
  Box::new(move |cached: Option<T>| match cached {
    Some(value) => match serde_json::to_string_pretty(&value) {
      Ok(json) => eprintln!("cached {} (refreshing):\n{}", what, json),
      Err(e) => debug!(error = %e, "could not render cached value"),
    },
    None => debug!(what, "nothing cached"),
  })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let json = serde_json::to_string_pretty(value)
    .map_err(|e| eyre!("Failed to render response: {}", e))?;
  println!("{}", json);
  Ok(())
}
