// src/exec/cancel.rs

//! Cooperative build cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::info;

type Callback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    callbacks: Mutex<Vec<(u64, Callback)>>,
    next_id: Mutex<u64>,
}

/// Shared cancellation flag. Cloning gives another handle to the same flag.
///
/// Cancelling never interrupts running work; the scheduler checks the flag
/// once per selection and stops handing out required work.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

/// Handle returned by [`CancellationToken::add_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackId(u64);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation and run the registered callbacks (once).
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("build cancellation requested");
        let callbacks = self.inner.callbacks.lock();
        for (_, callback) in callbacks.iter() {
            callback();
        }
    }

    /// Register a callback run on cancellation. If cancellation was already
    /// requested the callback runs right away.
    pub fn add_callback(&self, callback: impl Fn() + Send + Sync + 'static) -> CallbackId {
        let id = {
            let mut next = self.inner.next_id.lock();
            *next += 1;
            *next
        };
        let mut callbacks = self.inner.callbacks.lock();
        if self.is_cancellation_requested() {
            drop(callbacks);
            callback();
        } else {
            callbacks.push((id, Box::new(callback)));
        }
        CallbackId(id)
    }

    pub fn remove_callback(&self, id: CallbackId) {
        self.inner
            .callbacks
            .lock()
            .retain(|(registered, _)| *registered != id.0);
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancellation_requested())
            .finish()
    }
}
