//! Rate Governor: shared pacing of reasoning-service calls.
//!
//! One governor is shared by every run in the process. Calls are spaced at
//! least `60s / calls_per_minute` apart; callers queue on a mutex and sleep
//! until their slot opens. Nothing is ever dropped or retried here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ServiceError;

/// Spaces calls evenly under a requests-per-minute budget.
#[derive(Debug)]
pub struct RateGovernor {
    min_interval: Duration,
    /// Time the previous slot was granted. Held across the sleep so that
    /// waiters are served in lock order.
    last_grant: Mutex<Option<Instant>>,
    granted: AtomicU64,
}

impl RateGovernor {
    /// A governor allowing `calls_per_minute` calls per minute.
    ///
    /// A budget of zero is treated as one call per minute.
    pub fn per_minute(calls_per_minute: u32) -> Self {
        let calls = calls_per_minute.max(1);
        Self::with_interval(Duration::from_secs(60) / calls)
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_grant: Mutex::new(None),
            granted: AtomicU64::new(0),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Number of slots handed out so far.
    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }

    /// Wait until a slot is available, then claim it.
    pub async fn acquire(&self) {
        let mut last = self.last_grant.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                debug!(wait_ms = (ready_at - now).as_millis() as u64, "Rate governor waiting");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
        self.granted.fetch_add(1, Ordering::Relaxed);
    }
}

/// A completion request to the reasoning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// The external reasoning service.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
        timeout: Duration,
    ) -> Result<String, ServiceError>;
}

/// Wraps a client so every request first passes through the governor.
pub struct GovernedClient {
    inner: Arc<dyn ReasoningClient>,
    governor: Arc<RateGovernor>,
}

impl GovernedClient {
    pub fn new(inner: Arc<dyn ReasoningClient>, governor: Arc<RateGovernor>) -> Self {
        Self { inner, governor }
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }
}

#[async_trait]
impl ReasoningClient for GovernedClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
        timeout: Duration,
    ) -> Result<String, ServiceError> {
        self.governor.acquire().await;
        self.inner.complete(request, timeout).await
    }
}
