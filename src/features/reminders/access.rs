//! # Reminder Access
//!
//! Process-wide permission state for the reminder domain and the gate that
//! drives it. The state moves `Unrequested -> Pending -> Granted | Denied`
//! exactly once and is never reset; a denial lasts for the process lifetime.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.2.0: Settle as denied when the requesting caller is cancelled mid-wait
//! - 1.1.0: Coalesce concurrent requests onto a single native prompt
//! - 1.0.0: Initial release

use crate::core::error::{ReminderError, ReminderResult};
use crate::features::reminders::bridge::{await_completion, Outcome, Resolver};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;

/// Completion handed to the native permission request: `(granted, error)`
pub type AccessCallback = Box<dyn FnOnce(bool, Option<String>) + Send + 'static>;

/// The native "request access to reminders" call
///
/// Implementations may invoke `completion` inline, from any other thread,
/// or never. Invoking it more than once has no effect.
pub trait AccessRequester: Send + Sync {
    fn request_access(&self, completion: AccessCallback);
}

/// Permission status for the reminder domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessStatus {
    Unrequested,
    Pending,
    Granted,
    Denied,
}

impl AccessStatus {
    pub fn is_settled(self) -> bool {
        matches!(self, AccessStatus::Granted | AccessStatus::Denied)
    }
}

impl std::fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessStatus::Unrequested => write!(f, "unrequested"),
            AccessStatus::Pending => write!(f, "pending"),
            AccessStatus::Granted => write!(f, "granted"),
            AccessStatus::Denied => write!(f, "denied"),
        }
    }
}

/// Guarded access-state cell
///
/// Transitions are compare-and-set: only the first `Unrequested -> Pending`
/// and the first `Pending -> settled` change take effect.
pub struct AccessState {
    cell: watch::Sender<AccessStatus>,
}

impl Default for AccessState {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessState {
    pub fn new() -> Self {
        let (cell, _) = watch::channel(AccessStatus::Unrequested);
        Self { cell }
    }

    /// The state shared by every gate in this process
    pub fn global() -> Arc<AccessState> {
        static GLOBAL: OnceLock<Arc<AccessState>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(AccessState::new())))
    }

    pub fn status(&self) -> AccessStatus {
        *self.cell.borrow()
    }

    /// Claim the right to issue the native request
    fn begin_request(&self) -> bool {
        self.cell.send_if_modified(|status| {
            if *status == AccessStatus::Unrequested {
                *status = AccessStatus::Pending;
                true
            } else {
                false
            }
        })
    }

    /// Record the outcome; returns the settled status (first writer wins)
    fn settle(&self, granted: bool) -> AccessStatus {
        let target = if granted {
            AccessStatus::Granted
        } else {
            AccessStatus::Denied
        };
        let changed = self.cell.send_if_modified(|status| {
            if *status == AccessStatus::Pending {
                *status = target;
                true
            } else {
                false
            }
        });
        if changed {
            info!("Reminder access {}", target);
        }
        self.status()
    }

    /// Wait for whoever holds the pending request to settle it
    async fn wait_settled(&self) -> AccessStatus {
        let mut receiver = self.cell.subscribe();
        let settled = match receiver.wait_for(|status| status.is_settled()).await {
            Ok(status) => *status,
            // The sender lives in self, so this cannot close while we borrow it
            Err(_) => AccessStatus::Denied,
        };
        settled
    }
}

/// Settles the state as denied if the requesting caller is dropped mid-wait,
/// so coalesced waiters are never left behind a request nobody will finish.
struct SettleOnDrop<'a> {
    state: &'a AccessState,
    armed: bool,
}

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Access request cancelled before completion; treating as denied");
            self.state.settle(false);
        }
    }
}

/// Requests access once per process and caches the answer
pub struct AuthorizationGate {
    state: Arc<AccessState>,
    requester: Arc<dyn AccessRequester>,
    timeout: Duration,
}

impl AuthorizationGate {
    pub fn new(
        state: Arc<AccessState>,
        requester: Arc<dyn AccessRequester>,
        timeout: Duration,
    ) -> Self {
        Self {
            state,
            requester,
            timeout,
        }
    }

    pub fn status(&self) -> AccessStatus {
        self.state.status()
    }

    /// Resolve access, prompting at most once per process
    ///
    /// The first caller issues the native request and waits up to the
    /// configured timeout (a timeout counts as denied). Concurrent callers
    /// wait on that same request; later callers get the cached answer.
    pub async fn ensure_granted(&self) -> bool {
        if self.state.begin_request() {
            return self.request().await == AccessStatus::Granted;
        }

        match self.state.status() {
            AccessStatus::Granted => true,
            AccessStatus::Denied => false,
            _ => {
                debug!("Access request already pending; waiting on it");
                self.state.wait_settled().await == AccessStatus::Granted
            }
        }
    }

    /// Like `ensure_granted`, but as an error for the operation at hand
    pub async fn require(&self) -> ReminderResult<()> {
        if self.ensure_granted().await {
            Ok(())
        } else {
            Err(ReminderError::permission_denied(
                "reminder access was denied or not answered for this process",
            ))
        }
    }

    async fn request(&self) -> AccessStatus {
        info!(
            "Requesting access to reminders (waiting up to {}s)",
            self.timeout.as_secs()
        );

        let mut guard = SettleOnDrop {
            state: &self.state,
            armed: true,
        };
        let requester = Arc::clone(&self.requester);

        let outcome = await_completion(
            move |resolver: Resolver<(bool, Option<String>)>| {
                requester.request_access(Box::new(move |granted: bool, error: Option<String>| {
                    resolver.resolve((granted, error));
                }));
            },
            self.timeout,
        )
        .await;
        guard.armed = false;

        let granted = match outcome {
            Outcome::Resolved((granted, error)) => {
                if let Some(error) = error {
                    warn!("Access request reported an error: {}", error);
                }
                granted
            }
            Outcome::TimedOut => {
                warn!(
                    "No answer to the access request after {}s",
                    self.timeout.as_secs()
                );
                false
            }
            Outcome::Abandoned => {
                warn!("Access request completion was dropped without an answer");
                false
            }
        };

        self.state.settle(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;

    enum Reply {
        Inline(bool),
        Delayed(bool, Duration),
        Never,
    }

    struct FakeRequester {
        reply: Reply,
        calls: AtomicUsize,
        parked: Mutex<Vec<AccessCallback>>,
    }

    impl FakeRequester {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                parked: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AccessRequester for FakeRequester {
        fn request_access(&self, completion: AccessCallback) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Inline(granted) => completion(granted, None),
                Reply::Delayed(granted, delay) => {
                    thread::spawn(move || {
                        thread::sleep(delay);
                        completion(granted, None);
                    });
                }
                Reply::Never => self.parked.lock().unwrap().push(completion),
            }
        }
    }

    fn gate(requester: Arc<FakeRequester>, timeout: Duration) -> AuthorizationGate {
        AuthorizationGate::new(Arc::new(AccessState::new()), requester, timeout)
    }

    #[tokio::test]
    async fn test_grant_is_cached() {
        let requester = FakeRequester::new(Reply::Inline(true));
        let gate = gate(requester.clone(), Duration::from_secs(1));

        assert_eq!(gate.status(), AccessStatus::Unrequested);
        for _ in 0..5 {
            assert!(gate.ensure_granted().await);
        }
        assert_eq!(requester.calls(), 1);
        assert_eq!(gate.status(), AccessStatus::Granted);
    }

    #[tokio::test]
    async fn test_denial_is_sticky() {
        let requester = FakeRequester::new(Reply::Inline(false));
        let gate = gate(requester.clone(), Duration::from_secs(1));

        assert!(!gate.ensure_granted().await);
        assert!(!gate.ensure_granted().await);
        assert_eq!(requester.calls(), 1);

        let err = gate.require().await.unwrap_err();
        assert_eq!(err.kind(), "permission_denied");
    }

    #[tokio::test]
    async fn test_callback_from_background_thread() {
        let requester = FakeRequester::new(Reply::Delayed(true, Duration::from_millis(20)));
        let gate = gate(requester, Duration::from_secs(2));
        assert!(gate.ensure_granted().await);
    }

    #[tokio::test]
    async fn test_silent_requester_times_out_as_denied() {
        let requester = FakeRequester::new(Reply::Never);
        let gate = gate(requester.clone(), Duration::from_millis(50));

        let started = std::time::Instant::now();
        assert!(!gate.ensure_granted().await);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(gate.status(), AccessStatus::Denied);

        // A callback arriving after the timeout changes nothing
        let late = requester.parked.lock().unwrap().pop().unwrap();
        late(true, None);
        assert!(!gate.ensure_granted().await);
        assert_eq!(requester.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_request() {
        let requester = FakeRequester::new(Reply::Delayed(true, Duration::from_millis(50)));
        let gate = gate(requester.clone(), Duration::from_secs(2));

        let (a, b, c) = tokio::join!(
            gate.ensure_granted(),
            gate.ensure_granted(),
            gate.ensure_granted()
        );
        assert!(a && b && c);
        assert_eq!(requester.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_request_settles_denied() {
        let requester = FakeRequester::new(Reply::Never);
        let gate = gate(requester, Duration::from_secs(60));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), gate.ensure_granted()).await;
        assert!(cancelled.is_err());
        assert_eq!(gate.status(), AccessStatus::Denied);
        assert!(!gate.ensure_granted().await);
    }

    #[tokio::test]
    async fn test_gates_sharing_state_prompt_once() {
        let state = Arc::new(AccessState::new());
        let requester = FakeRequester::new(Reply::Inline(true));
        let first = AuthorizationGate::new(state.clone(), requester.clone(), Duration::from_secs(1));
        let second = AuthorizationGate::new(state, requester.clone(), Duration::from_secs(1));

        assert!(first.ensure_granted().await);
        assert!(second.ensure_granted().await);
        assert_eq!(requester.calls(), 1);
    }

    #[test]
    fn test_global_state_is_shared() {
        let a = AccessState::global();
        let b = AccessState::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
