//! The caller's designated execution context.
//!
//! Pipeline work (transport, decoding, cache writes) runs on tokio tasks.
//! Callbacks never run there: they are posted to an [`ExecutionContext`] and
//! only run when the owner of the matching [`ContextLoop`] drains it, so a UI
//! loop observes every completion on its own thread.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
  /// Id of the context whose jobs are running on this thread, 0 if none
  static CURRENT: Cell<u64> = const { Cell::new(0) };
}

/// Create a context and the loop that runs its jobs.
pub fn channel() -> (ExecutionContext, ContextLoop) {
  let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
  let (tx, rx) = mpsc::unbounded_channel();
  (ExecutionContext { id, tx }, ContextLoop { id, rx })
}

/// Handle for posting callbacks onto a context. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
  id: u64,
  tx: mpsc::UnboundedSender<Job>,
}

impl ExecutionContext {
  /// Queue `job`; returns `false` if the loop is gone.
  pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
    self.tx.send(Box::new(job)).is_ok()
  }

  /// Whether the calling code is running inside this context's loop.
  pub fn is_current(&self) -> bool {
    CURRENT.with(|current| current.get() == self.id)
  }
}

/// Receiving end of a context, owned by the caller's event loop.
pub struct ContextLoop {
  id: u64,
  rx: mpsc::UnboundedReceiver<Job>,
}

impl ContextLoop {
  /// Wait for the next job and run it. Returns `false` once every
  /// `ExecutionContext` clone has been dropped and the queue is empty.
  pub async fn next(&mut self) -> bool {
    match self.rx.recv().await {
      Some(job) => {
        self.run(job);
        true
      }
      None => false,
    }
  }

  /// Run everything already queued without waiting. Returns the job count.
  pub fn run_pending(&mut self) -> usize {
    let mut ran = 0;
    while let Ok(job) = self.rx.try_recv() {
      self.run(job);
      ran += 1;
    }
    ran
  }

  fn run(&self, job: Job) {
    let previous = CURRENT.with(|current| current.replace(self.id));
    job();
    CURRENT.with(|current| current.set(previous));
  }
}

impl std::fmt::Debug for ContextLoop {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ContextLoop")
      .field("id", &self.id)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;

  #[test]
  fn test_jobs_run_in_order_on_the_loop() {
    let (context, mut context_loop) = channel();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..3 {
      let seen = seen.clone();
      let ctx = context.clone();
      context.post(move || seen.lock().unwrap().push((i, ctx.is_current())));
    }

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(context_loop.run_pending(), 3);
    assert_eq!(*seen.lock().unwrap(), vec![(0, true), (1, true), (2, true)]);
    assert!(!context.is_current());
  }

  #[test]
  fn test_other_contexts_are_not_current() {
    let (first, mut first_loop) = channel();
    let (second, _second_loop) = channel();
    let observed = Arc::new(Mutex::new(None));

    let obs = observed.clone();
    first.post(move || *obs.lock().unwrap() = Some(second.is_current()));
    first_loop.run_pending();

    assert_eq!(*observed.lock().unwrap(), Some(false));
  }

  #[tokio::test]
  async fn test_next_ends_when_senders_are_dropped() {
    let (context, mut context_loop) = channel();
    context.post(|| {});
    drop(context);

    assert!(context_loop.next().await);
    assert!(!context_loop.next().await);
  }

  #[test]
  fn test_post_fails_after_loop_dropped() {
    let (context, context_loop) = channel();
    drop(context_loop);
    assert!(!context.post(|| {}));
  }
}
