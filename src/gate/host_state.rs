use crate::gate::policy::HostPolicy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Pacing state for one host, private to the gate
///
/// Created on first contact with the host and kept for the life of the gate.
#[derive(Debug)]
pub(crate) struct HostState {
    pub(crate) host: String,
    pub(crate) policy: HostPolicy,
    pub(crate) permits: Arc<Semaphore>,
    next_allowed: Mutex<Option<Instant>>,
    in_use: AtomicUsize,
}

impl HostState {
    pub(crate) fn new(host: &str, policy: HostPolicy) -> Self {
        Self {
            host: host.to_string(),
            policy,
            permits: Arc::new(Semaphore::new(policy.max_concurrent)),
            next_allowed: Mutex::new(None),
            in_use: AtomicUsize::new(0),
        }
    }

    /// Calculates how long to wait before the next request may start
    ///
    /// Returns None if a request can be made now.
    pub(crate) fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let next_allowed = *self.lock_next_allowed();
        match next_allowed {
            Some(at) if at > now => Some(at - now),
            _ => None,
        }
    }

    pub(crate) fn begin_request(&self) {
        self.in_use.fetch_add(1, Ordering::SeqCst);
    }

    /// Records a finished request, pushing the next start out by the delay
    pub(crate) fn finish_request(&self, now: Instant) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
        let mut next_allowed = self.lock_next_allowed();
        let candidate = now + self.policy.min_delay;
        // concurrent completions never pull the deadline backwards
        if next_allowed.map_or(true, |at| candidate > at) {
            *next_allowed = Some(candidate);
        }
    }

    pub(crate) fn slots_in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    fn lock_next_allowed(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        match self.next_allowed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
