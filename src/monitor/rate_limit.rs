//! Shared outbound request budget.
//!
//! All subjects' fetches drain one token bucket, so the sum of their
//! request rates stays inside the external API's tolerance no matter how
//! many subjects are monitored. Waiters queue on the bucket's lock, which
//! keeps ordering close to first-come-first-served across subject tasks.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Token-bucket request budget shared by every polling task
pub struct RequestBudget {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BudgetState>,
}

struct BudgetState {
    tokens: f64,
    last_refill: Instant,
}

impl RequestBudget {
    /// `requests_per_sec` is the sustained rate; `burst` bounds how many
    /// requests may fire back-to-back after an idle stretch.
    pub fn new(requests_per_sec: f64, burst: u32) -> Arc<Self> {
        let capacity = f64::from(burst.max(1));
        Arc::new(Self {
            capacity,
            refill_per_sec: requests_per_sec.max(f64::MIN_POSITIVE),
            state: Mutex::new(BudgetState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Wait for permission to make one external request.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };
            sleep(wait).await;
        }
    }

    /// Tokens currently available (diagnostic)
    pub async fn available(&self) -> f64 {
        let state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        (state.tokens + elapsed * self.refill_per_sec).min(self.capacity)
    }
}
