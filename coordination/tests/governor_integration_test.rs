//! Rate governor under concurrency: many tasks, one shared pacing budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use coordination::{CompletionRequest, GovernedClient, RateGovernor, ReasoningClient, ServiceError};

struct Stamp {
    calls: tokio::sync::Mutex<Vec<Instant>>,
}

#[async_trait]
impl ReasoningClient for Stamp {
    async fn complete(
        &self,
        request: &CompletionRequest,
        _timeout: Duration,
    ) -> Result<String, ServiceError> {
        self.calls.lock().await.push(Instant::now());
        Ok(request.prompt.clone())
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_budget() {
    let inner = Arc::new(Stamp {
        calls: tokio::sync::Mutex::new(Vec::new()),
    });
    // 25 calls per minute -> 2.4s apart
    let governor = RateGovernor::per_minute(25).shared();
    let client = Arc::new(GovernedClient::new(inner.clone(), governor.clone()));

    let mut handles = Vec::new();
    for i in 0..6 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .complete(
                    &CompletionRequest::new("system", format!("call {}", i)),
                    Duration::from_secs(30),
                )
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let mut calls = inner.calls.lock().await.clone();
    calls.sort();
    assert_eq!(calls.len(), 6);
    for pair in calls.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(2400));
    }
    assert_eq!(governor.granted(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_idle_governor_grants_immediately() {
    let governor = RateGovernor::with_interval(Duration::from_secs(10));
    let start = Instant::now();
    governor.acquire().await;
    assert_eq!(Instant::now() - start, Duration::ZERO);

    tokio::time::sleep(Duration::from_secs(15)).await;
    let later = Instant::now();
    governor.acquire().await;
    assert_eq!(Instant::now() - later, Duration::ZERO);
}
