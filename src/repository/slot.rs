//! Latest-request-wins bookkeeping for one repository.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::pipeline::{Guard, InFlightHandle};

/// Holds the handle of the current request plus a generation counter.
///
/// Every issued request bumps the generation and captures the new value.
/// Late work compares its captured generation with the current one rather
/// than trusting a flag, so a request cancelled and immediately reissued
/// can never be mistaken for its successor.
#[derive(Debug, Default)]
pub struct RequestSlot {
  generation: Arc<AtomicU64>,
  current: Mutex<Option<InFlightHandle>>,
}

impl RequestSlot {
  pub fn new() -> Self {
    Self::default()
  }

  /// Supersede the current request (cancelling it) and return the
  /// generation for the next one.
  pub fn advance(&self) -> u64 {
    let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(previous) = current.take() {
      previous.cancel();
    }
    generation
  }

  /// Record `handle` as current if `generation` still is. A handle that
  /// lost the race is cancelled instead.
  pub fn install(&self, generation: u64, handle: InFlightHandle) {
    let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
    if self.is_current(generation) {
      *current = Some(handle);
    } else {
      handle.cancel();
    }
  }

  /// Run `f` only if `generation` is still current, holding the slot so no
  /// newer request can be issued until `f` returns.
  pub fn while_current<R>(&self, generation: u64, f: impl FnOnce() -> R) -> Option<R> {
    let _current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
    if self.is_current(generation) {
      Some(f())
    } else {
      None
    }
  }

  pub fn is_current(&self, generation: u64) -> bool {
    self.generation.load(Ordering::SeqCst) == generation
  }

  /// Delivery guard for the request issued under `generation`.
  pub fn guard(&self, generation: u64) -> Guard {
    let counter = Arc::clone(&self.generation);
    Arc::new(move || counter.load(Ordering::SeqCst) == generation)
  }

  pub fn current(&self) -> Option<InFlightHandle> {
    self
      .current
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Cancel the current request, leaving the slot idle.
  pub fn cancel(&self) {
    self.advance();
  }
}
