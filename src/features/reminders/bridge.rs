//! # Completion Bridge
//!
//! Turns a single-shot, callback-driven native operation into an awaitable
//! call with a bounded wait. The native side gets a `Resolver` it may call
//! from any thread; the caller waits here and nowhere else.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Report `Abandoned` when every resolver is dropped unresolved
//! - 1.0.0: Initial oneshot + timeout implementation

use log::debug;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

type Slot<T> = Mutex<Option<oneshot::Sender<T>>>;

/// How a bridged wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The native side resolved before the deadline
    Resolved(T),
    /// The deadline passed first; any later resolution is ignored
    TimedOut,
    /// Every resolver was dropped without resolving
    Abandoned,
}

impl<T> Outcome<T> {
    pub fn resolved(self) -> Option<T> {
        match self {
            Outcome::Resolved(value) => Some(value),
            Outcome::TimedOut | Outcome::Abandoned => None,
        }
    }
}

/// One-shot completion handle given to the native side
///
/// Cloneable and `Send`, so it can move into whatever callback the native
/// API takes. Only the first `resolve` across all clones has any effect.
pub struct Resolver<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Resolver<T> {
    /// Deliver the completion value
    ///
    /// Returns `true` if a waiter received it. Calls after the first, after a
    /// timeout, or after the waiter went away are no-ops returning `false`.
    pub fn resolve(&self, value: T) -> bool {
        match take_sender(&self.slot) {
            Some(sender) => sender.send(value).is_ok(),
            None => false,
        }
    }
}

fn take_sender<T>(slot: &Slot<T>) -> Option<oneshot::Sender<T>> {
    // A panic inside another resolve cannot leave the Option half-written
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

/// Wait for a callback-style operation to complete, up to `limit`
///
/// `register` runs exactly once, synchronously, before the wait begins. It
/// may resolve inline or hand the resolver to another thread.
pub async fn await_completion<T, F>(register: F, limit: Duration) -> Outcome<T>
where
    F: FnOnce(Resolver<T>),
{
    let (sender, receiver) = oneshot::channel();
    let slot = Arc::new(Mutex::new(Some(sender)));
    // The waiter holds only a weak reference so that dropping every resolver
    // drops the sender and wakes the receiver.
    let waiter_slot: Weak<Slot<T>> = Arc::downgrade(&slot);

    register(Resolver { slot });

    let outcome = match timeout(limit, receiver).await {
        Ok(Ok(value)) => Outcome::Resolved(value),
        Ok(Err(_)) => Outcome::Abandoned,
        Err(_) => Outcome::TimedOut,
    };

    if let Some(slot) = waiter_slot.upgrade() {
        // Close the slot so late resolutions are observed as no-ops
        drop(take_sender(&slot));
    }

    match &outcome {
        Outcome::Resolved(_) => debug!("Completion resolved"),
        Outcome::TimedOut => debug!("Completion timed out after {:?}", limit),
        Outcome::Abandoned => debug!("Completion abandoned by native side"),
    }

    outcome
}
