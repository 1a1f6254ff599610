//! Waiter - Block until a remote resource reaches a desired status
//!
//! Resource operations against the API are asynchronous: a create or delete
//! returns as soon as the request is accepted. The waiter polls the resource
//! at a fixed interval until it reports the requested status, and turns a
//! sustained `defunct` status into an error.
//!
//! Each resource kind plugs in through [`StatusAccessor`], which knows how to
//! fetch the resource and whether a snapshot that already has the right
//! status is actually usable.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{BoxFuture, Clock, TokioClock};
use crate::resource::{ResourceKind, StatusSnapshot, WaitRequest, status};

/// Default delay between two polls, in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// How long a resource may report `defunct` before the wait fails, in seconds
pub const DEFAULT_DEFUNCT_GRACE_SECS: u64 = 30;

/// Errors that end a wait
#[derive(Debug, Error)]
pub enum WaitError {
    /// Fetching the resource failed; never retried
    #[error("{0}")]
    Fetch(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The resource stayed defunct past the grace period
    #[error("{kind} entered a defunct state!")]
    Defunct { kind: ResourceKind },

    /// The caller cancelled the wait
    #[error("waiting for {kind} was cancelled")]
    Cancelled { kind: ResourceKind },

    /// A configured attempt or duration limit was exhausted
    #[error("timed out waiting for {kind} after {attempts} attempts")]
    TimedOut { kind: ResourceKind, attempts: u32 },
}

impl WaitError {
    pub fn fetch(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Fetch(Box::new(cause))
    }
}

/// Result type for wait operations
pub type WaitResult<T> = Result<T, WaitError>;

/// Capability a resource kind provides to the waiter
pub trait StatusAccessor: Send + Sync {
    type Snapshot: StatusSnapshot + Send;
    type Error: std::error::Error + Send + Sync + 'static;

    fn kind(&self) -> ResourceKind;

    /// Get the current view of the resource named by the request
    fn fetch<'a>(
        &'a self,
        request: &'a WaitRequest,
    ) -> BoxFuture<'a, Result<Self::Snapshot, Self::Error>>;

    /// Extra check applied once the desired status is reached.
    ///
    /// Not consulted when waiting for `deleted`. Returning false keeps the
    /// waiter polling.
    fn is_ready(&self, _snapshot: &Self::Snapshot) -> bool {
        true
    }
}

/// Polling cadence and limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    pub interval: Duration,
    pub defunct_grace: Duration,
    /// Unbounded when `None`
    pub max_attempts: Option<u32>,
    /// Unbounded when `None`
    pub max_duration: Option<Duration>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            defunct_grace: Duration::from_secs(DEFAULT_DEFUNCT_GRACE_SECS),
            max_attempts: None,
            max_duration: None,
        }
    }
}

impl WaitOptions {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_defunct_grace(mut self, grace: Duration) -> Self {
        self.defunct_grace = grace;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }
}

/// Generic polling loop shared by every resource kind
#[derive(Clone)]
pub struct StateWaiter {
    clock: Arc<dyn Clock>,
    options: WaitOptions,
}

impl std::fmt::Debug for StateWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateWaiter")
            .field("options", &self.options)
            .finish()
    }
}

impl Default for StateWaiter {
    fn default() -> Self {
        Self::new(Arc::new(TokioClock))
    }
}

impl StateWaiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            options: WaitOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WaitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Poll until the resource reports `request.state` and passes the
    /// accessor's readiness check.
    ///
    /// Returns the final snapshot. Fetch errors end the wait immediately.
    /// Without limits in [`WaitOptions`] the loop only ends on success, a
    /// sustained `defunct` status, or cancellation.
    pub async fn wait_for_state<A>(
        &self,
        accessor: &A,
        request: &WaitRequest,
        cancel: &CancellationToken,
    ) -> WaitResult<A::Snapshot>
    where
        A: StatusAccessor,
    {
        let kind = accessor.kind();
        let start = self.clock.now();
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(WaitError::Cancelled { kind });
            }

            let snapshot = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WaitError::Cancelled { kind }),
                result = accessor.fetch(request) => result.map_err(WaitError::fetch)?,
            };
            attempts += 1;

            let elapsed = self.clock.now().saturating_duration_since(start);
            let current = snapshot.status();
            let reached = current == request.state;
            debug!(
                %kind,
                resource_id = %request.resource_id,
                status = current,
                desired = %request.state,
                attempts,
                "Polled resource status"
            );

            if current == status::DEFUNCT {
                // Defunct resources sometimes recover, or flip to deleted a
                // little late during destroys.
                if elapsed > self.options.defunct_grace {
                    return Err(WaitError::Defunct { kind });
                }
                warn!(
                    %kind,
                    resource_id = %request.resource_id,
                    elapsed_secs = elapsed.as_secs(),
                    "Resource reported a defunct state"
                );
            }

            if reached {
                if request.is_deletion() || accessor.is_ready(&snapshot) {
                    info!(
                        %kind,
                        resource_id = %request.resource_id,
                        state = %request.state,
                        attempts,
                        "Resource reached desired state"
                    );
                    return Ok(snapshot);
                }
                debug!(
                    %kind,
                    resource_id = %request.resource_id,
                    "Desired state reached but resource is not ready yet"
                );
            }

            if let Some(max) = self.options.max_attempts
                && attempts >= max
            {
                return Err(WaitError::TimedOut { kind, attempts });
            }
            if let Some(max) = self.options.max_duration
                && elapsed >= max
            {
                return Err(WaitError::TimedOut { kind, attempts });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WaitError::Cancelled { kind }),
                _ = self.clock.sleep(self.options.interval) => {}
            }
        }
    }
}
