//! Spawning, cancellation and exactly-once delivery.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{trace, warn};

use crate::context::ExecutionContext;
use crate::error::{TransferError, TransportError, TypedResult};

/// Completion callback for a request.
pub type Completion<T> = Box<dyn FnOnce(TypedResult<T>) + Send + 'static>;

/// Checked on the execution context right before delivery; `false` means the
/// request was superseded and the caller gets `Cancelled` instead.
pub type Guard = Arc<dyn Fn() -> bool + Send + Sync>;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Owns the completion until exactly one outcome claims it.
struct Delivery<T> {
  context: ExecutionContext,
  completion: Mutex<Option<Completion<T>>>,
  cancelled: AtomicBool,
  guard: Option<Guard>,
}

impl<T: Send + 'static> Delivery<T> {
  fn is_live(&self) -> bool {
    !self.cancelled.load(Ordering::SeqCst) && self.guard.as_ref().map_or(true, |guard| guard())
  }

  fn finish(self: Arc<Self>, result: TypedResult<T>) {
    let completion = self
      .completion
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    let Some(completion) = completion else {
      return;
    };

    let context = self.context.clone();
    context.post(move || {
      let result = if self.is_live() {
        result
      } else {
        Err(TransferError::cancelled())
      };
      completion(result);
    });
  }

  fn cancel(self: Arc<Self>) {
    self.cancelled.store(true, Ordering::SeqCst);
    self.finish(Err(TransferError::cancelled()));
  }
}

struct HandleInner {
  id: u64,
  /// `None` when the work never started
  abort: Option<AbortHandle>,
  cancelled: AtomicBool,
  on_cancel: Box<dyn Fn() + Send + Sync>,
}

/// Cancellation token for one outstanding request.
///
/// Cloning shares the token. Cancelling aborts the underlying task (which
/// drops the transport future) and, unless an outcome was already
/// delivered, completes the request with `Cancelled`. A result that raced
/// ahead and is still queued on the context is turned into `Cancelled` too.
#[derive(Clone)]
pub struct InFlightHandle {
  inner: Arc<HandleInner>,
}

impl InFlightHandle {
  pub fn id(&self) -> u64 {
    self.inner.id
  }

  pub fn cancel(&self) {
    if self.inner.cancelled.swap(true, Ordering::SeqCst) {
      return;
    }
    trace!(handle = self.inner.id, "cancelling request");
    if let Some(abort) = &self.inner.abort {
      abort.abort();
    }
    (self.inner.on_cancel)();
  }

  pub fn is_cancelled(&self) -> bool {
    self.inner.cancelled.load(Ordering::SeqCst)
  }

  /// Whether the background work has stopped, by finishing or by abort.
  pub fn is_finished(&self) -> bool {
    self
      .inner
      .abort
      .as_ref()
      .map_or(true, AbortHandle::is_finished)
  }
}

impl fmt::Debug for InFlightHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InFlightHandle")
      .field("id", &self.inner.id)
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}

/// Run `work` on `runtime` (or the runtime the caller is inside of) and
/// deliver its outcome to `completion` on `context`, exactly once.
///
/// With no runtime at all the request fails with a transport error instead
/// of panicking, so callers on plain threads still get their completion.
pub(crate) fn spawn<T, W>(
  runtime: Option<&Handle>,
  context: &ExecutionContext,
  work: W,
  guard: Option<Guard>,
  completion: Completion<T>,
) -> InFlightHandle
where
  T: Send + 'static,
  W: Future<Output = TypedResult<T>> + Send + 'static,
{
  let delivery = Arc::new(Delivery {
    context: context.clone(),
    completion: Mutex::new(Some(completion)),
    cancelled: AtomicBool::new(false),
    guard,
  });

  let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
  let abort = match runtime.cloned().or_else(|| Handle::try_current().ok()) {
    Some(runtime) => {
      let task_delivery = Arc::clone(&delivery);
      let task = runtime.spawn(async move {
        let result = work.await;
        task_delivery.finish(result);
      });
      Some(task.abort_handle())
    }
    None => {
      warn!(handle = id, "no async runtime available, failing request");
      Arc::clone(&delivery).finish(Err(TransferError::TransportFailure(
        TransportError::Generic("no async runtime to run the request on".to_string()),
      )));
      None
    }
  };

  InFlightHandle {
    inner: Arc::new(HandleInner {
      id,
      abort,
      cancelled: AtomicBool::new(false),
      on_cancel: Box::new(move || Arc::clone(&delivery).cancel()),
    }),
  }
}
