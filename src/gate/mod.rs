//! Politeness gate
//!
//! Every network attempt runs inside the gate, which:
//! - bounds in-flight requests globally and per host
//! - spaces consecutive requests to a host by a minimum delay
//! - retries retryable failures with exponential backoff plus jitter
//!
//! All waits observe the run's cancellation token.

mod host_state;
mod policy;

pub use policy::{default_retry_on, HostOverride, HostPolicy, PolitenessPolicy};

use crate::url::NormalizedUrl;
use crate::{ConfigResult, FetchError, FetchErrorKind, FetchResult};
use host_state::HostState;
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared rate limiter for one crawl run
#[derive(Debug)]
pub struct PolitenessGate {
    policy: PolitenessPolicy,
    global: Arc<Semaphore>,
    hosts: Mutex<HashMap<String, Arc<HostState>>>,
}

/// Permits held for the duration of one attempt
///
/// Dropping the lease records the completion time and releases the host
/// permit before the global one.
struct Lease {
    host: Arc<HostState>,
    _host_permit: OwnedSemaphorePermit,
    _global_permit: OwnedSemaphorePermit,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.host.finish_request(Instant::now());
    }
}

impl PolitenessGate {
    /// Creates a gate, rejecting policies that could never make progress
    pub fn new(policy: PolitenessPolicy) -> ConfigResult<Self> {
        policy.validate()?;
        Ok(Self {
            global: Arc::new(Semaphore::new(policy.max_global_concurrent)),
            policy,
            hosts: Mutex::new(HashMap::new()),
        })
    }

    pub fn policy(&self) -> &PolitenessPolicy {
        &self.policy
    }

    /// Number of hosts the gate has seen so far
    pub fn host_count(&self) -> usize {
        self.lock_hosts().len()
    }

    /// Requests currently in flight for `host`
    pub fn in_flight(&self, host: &str) -> usize {
        self.lock_hosts()
            .get(host)
            .map(|state| state.slots_in_use())
            .unwrap_or(0)
    }

    /// Runs `operation` for `url` under the politeness rules
    ///
    /// The closure receives the 1-based attempt number and is invoked once
    /// per attempt. Permits are released between attempts so backoff never
    /// holds up other hosts.
    ///
    /// # Arguments
    ///
    /// * `url` - Target of the operation; its host selects the pacing state
    /// * `cancel` - Run-level cancellation token
    /// * `operation` - One network attempt
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - The first successful attempt's output
    /// * `Err(FetchError)` - A non-retryable failure, the last failure once
    ///   retries are exhausted, or `Cancelled`
    pub async fn run<T, F, Fut>(
        &self,
        url: &NormalizedUrl,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> FetchResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        let host = self.host_state(url.host());
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let outcome = {
                let _lease = self.acquire(&host, url, cancel).await?;

                if let Some(wait) = host.time_until_next_request(Instant::now()) {
                    tracing::trace!(url = %url, wait_ms = wait.as_millis() as u64, "pacing host");
                    sleep_or_cancel(wait, url, cancel).await?;
                }

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(FetchError::cancelled(url.as_str())),
                    result = operation(attempt) => result,
                }
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if error.kind == FetchErrorKind::Cancelled {
                return Err(error);
            }

            let retryable = self.policy.is_retryable(error.kind);
            if retryable && attempt <= host.policy.max_retries {
                let delay = self
                    .policy
                    .backoff_for(attempt)
                    .saturating_add(jitter(self.policy.max_jitter));
                tracing::warn!(
                    url = %url,
                    kind = %error.kind,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                sleep_or_cancel(delay, url, cancel).await?;
                continue;
            }

            if retryable {
                tracing::warn!(url = %url, kind = %error.kind, attempt, "retries exhausted");
            }
            return Err(error);
        }
    }

    async fn acquire(
        &self,
        host: &Arc<HostState>,
        url: &NormalizedUrl,
        cancel: &CancellationToken,
    ) -> FetchResult<Lease> {
        let global_permit = acquire_permit(&self.global, url, cancel).await?;
        let host_permit = acquire_permit(&host.permits, url, cancel).await?;
        host.begin_request();
        Ok(Lease {
            host: Arc::clone(host),
            _host_permit: host_permit,
            _global_permit: global_permit,
        })
    }

    fn host_state(&self, host: &str) -> Arc<HostState> {
        let mut hosts = self.lock_hosts();
        if let Some(state) = hosts.get(host) {
            return Arc::clone(state);
        }

        let resolved = self.policy.resolve(host);
        tracing::debug!(
            host,
            max_concurrent = resolved.max_concurrent,
            min_delay_ms = resolved.min_delay.as_millis() as u64,
            "tracking new host"
        );
        let state = Arc::new(HostState::new(host, resolved));
        hosts.insert(state.host.clone(), Arc::clone(&state));
        state
    }

    fn lock_hosts(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<HostState>>> {
        match self.hosts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

async fn acquire_permit(
    semaphore: &Arc<Semaphore>,
    url: &NormalizedUrl,
    cancel: &CancellationToken,
) -> FetchResult<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::cancelled(url.as_str())),
        permit = Arc::clone(semaphore).acquire_owned() => permit.map_err(|_| {
            FetchError::new(url.as_str(), FetchErrorKind::Other, "politeness gate closed")
        }),
    }
}

async fn sleep_or_cancel(
    duration: Duration,
    url: &NormalizedUrl,
    cancel: &CancellationToken,
) -> FetchResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::cancelled(url.as_str())),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Uniform random jitter in `[0, max]`
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis().min(u64::MAX as u128) as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}
