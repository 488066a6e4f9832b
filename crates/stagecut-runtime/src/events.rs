//! Process-wide wait/record event table.
//!
//! Events are one-shot: once `(namespace, id)` has been recorded every
//! current and future wait on it returns immediately. Waits block on a
//! single condition variable; every record wakes all waiters, which recheck
//! their own key.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use stagecut_types::event::EventNamespace;

use crate::error::{Result, RuntimeError};

#[derive(Debug, Default)]
struct State {
    recorded: HashSet<(EventNamespace, i64)>,
    aborted: Option<String>,
}

#[derive(Debug, Default)]
pub struct EventRegistry {
    state: Mutex<State>,
    signal: Condvar,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A waiter panicking mid-check leaves the set itself consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until `(namespace, id)` is recorded, the registry is aborted,
    /// or `timeout` elapses. Negative ids return immediately.
    pub fn wait(&self, namespace: EventNamespace, id: i64, timeout: Option<Duration>) -> Result<()> {
        if id < 0 {
            return Ok(());
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();

        loop {
            if let Some(reason) = &state.aborted {
                return Err(RuntimeError::Aborted(reason.clone()));
            }
            if state.recorded.contains(&(namespace, id)) {
                return Ok(());
            }
            state = match deadline {
                None => self.signal.wait(state).unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(RuntimeError::EventTimeout { namespace, id });
                    }
                    self.signal
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
            };
        }
    }

    /// Signal `(namespace, id)` and wake every waiter.
    pub fn record(&self, namespace: EventNamespace, id: i64) {
        if id < 0 {
            return;
        }
        let fresh = self.lock().recorded.insert((namespace, id));
        if fresh {
            debug!(%namespace, id, "event recorded");
        } else {
            warn!(%namespace, id, "event recorded twice");
        }
        self.signal.notify_all();
    }

    pub fn is_recorded(&self, namespace: EventNamespace, id: i64) -> bool {
        self.lock().recorded.contains(&(namespace, id))
    }

    /// Fail every pending and future wait with `reason`.
    pub fn abort(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "aborting event registry");
        self.lock().aborted.get_or_insert(reason);
        self.signal.notify_all();
    }

    /// Forget every recorded event and clear an abort.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.recorded.clear();
        state.aborted = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn record_releases_waiter() {
        let reg = Arc::new(EventRegistry::new());
        let waiter = {
            let reg = reg.clone();
            thread::spawn(move || reg.wait(EventNamespace::Data, 3, Some(Duration::from_secs(5))))
        };
        thread::sleep(Duration::from_millis(20));
        reg.record(EventNamespace::Data, 3);
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn namespaces_do_not_alias() {
        let reg = EventRegistry::new();
        reg.record(EventNamespace::Pipeline, 7);
        assert!(reg.is_recorded(EventNamespace::Pipeline, 7));
        let err = reg
            .wait(EventNamespace::Data, 7, Some(Duration::from_millis(30)))
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::EventTimeout { namespace: EventNamespace::Data, id: 7 }
        ));
    }

    #[test]
    fn negative_id_never_blocks() {
        let reg = EventRegistry::new();
        assert!(reg.wait(EventNamespace::Pipeline, -1, None).is_ok());
        reg.record(EventNamespace::Pipeline, -1);
        assert!(!reg.is_recorded(EventNamespace::Pipeline, -1));
    }

    #[test]
    fn abort_wakes_blocked_waiters() {
        let reg = Arc::new(EventRegistry::new());
        let waiter = {
            let reg = reg.clone();
            thread::spawn(move || reg.wait(EventNamespace::Data, 0, None))
        };
        thread::sleep(Duration::from_millis(20));
        reg.abort("stage 1 failed");
        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, RuntimeError::Aborted(ref r) if r == "stage 1 failed"));
    }

    #[test]
    fn reset_clears_events_and_abort() {
        let reg = EventRegistry::new();
        reg.record(EventNamespace::Data, 1);
        reg.abort("x");
        reg.reset();
        assert!(!reg.is_recorded(EventNamespace::Data, 1));
        reg.record(EventNamespace::Data, 1);
        assert!(reg.wait(EventNamespace::Data, 1, None).is_ok());
    }
}
