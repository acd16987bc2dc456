//! Named execution contexts.
//!
//! The producer (game) side and the render side each run on their own
//! thread and drain a FIFO of type-erased tasks. Tasks enqueued to the same
//! context execute in enqueue order.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;

use crate::error::CaptureError;
use crate::signal::CompletionSignal;

/// Type-erased work closure sent to a context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

struct ContextShared {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    thread_id: ThreadId,
}

/// Cloneable handle used to enqueue work onto a context.
#[derive(Clone)]
pub struct ContextHandle {
    shared: Arc<ContextShared>,
}

impl ContextHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns `true` when called from this context's thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.shared.thread_id
    }

    /// Appends a task to the context's queue.
    ///
    /// Fails once the owning [`ExecutionContext`] has been dropped.
    pub fn enqueue(&self, task: Task) -> Result<(), CaptureError> {
        let sender = self.shared.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(CaptureError::ContextClosed(self.shared.name.clone()));
        };
        sender
            .send(task)
            .map_err(|_| CaptureError::ContextClosed(self.shared.name.clone()))
    }

    /// Blocks until every task enqueued before this call has run.
    pub fn flush(&self) -> Result<(), CaptureError> {
        if self.is_current() {
            return Err(CaptureError::ForbiddenContext(self.shared.name.clone()));
        }
        let signal = Arc::new(CompletionSignal::new());
        let remote = signal.clone();
        self.enqueue(Box::new(move || remote.signal()))?;
        signal.wait();
        Ok(())
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("name", &self.shared.name)
            .finish()
    }
}

/// A named worker thread draining a task queue.
///
/// Dropping the context closes the queue, lets the already enqueued tasks
/// finish, and joins the thread.
pub struct ExecutionContext {
    handle: ContextHandle,
    join: Option<JoinHandle<()>>,
}

impl ExecutionContext {
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Task>();

        let thread_name = name.clone();
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_tasks(&thread_name, receiver))?;

        log::debug!("Spawned {} context", name);

        let shared = Arc::new(ContextShared {
            name,
            sender: Mutex::new(Some(sender)),
            thread_id: join.thread().id(),
        });

        Ok(Self {
            handle: ContextHandle { shared },
            join: Some(join),
        })
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.handle.shared.sender.lock().take();
        if let Some(join) = self.join.take() {
            if self.handle.is_current() {
                // Dropped from one of its own tasks; the loop ends on its own.
                return;
            }
            if join.join().is_err() {
                log::error!("{} context thread panicked", self.handle.name());
            }
        }
        log::debug!("Stopped {} context", self.handle.name());
    }
}

fn run_tasks(name: &str, receiver: mpsc::Receiver<Task>) {
    while let Ok(task) = receiver.recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            log::error!(
                "Task panicked on {} context: {}",
                name,
                panic_message(payload.as_ref())
            );
            std::process::abort();
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
