//! Leaky bucket admission gate.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::bucket::{Bucket, Fit};
use super::waiters::{Ticket, WaiterRegistry};
use crate::config::LimiterConfig;
use crate::error::{Result, SluiceError};

/// Admits callers at no more than `max_rate` units per `time_period`.
///
/// The bucket fills on admission and leaks continuously. Callers that do not
/// fit are suspended until either their own leak time elapses or another
/// caller's capacity check finds slack and wakes them early. There is no
/// release: capacity comes back through time alone.
///
/// The limiter is safe to share across tasks. State is only touched inside
/// short synchronous sections, never across an `.await`.
pub struct LeakyBucket {
    state: Mutex<LimiterState>,
    time_period: Duration,
}

struct LimiterState {
    bucket: Bucket,
    waiters: WaiterRegistry,
}

impl LimiterState {
    fn check(&mut self, amount: f64) -> bool {
        self.bucket.drain(Instant::now());

        match self.bucket.fits(amount) {
            Fit::Overflow => false,
            Fit::Exact => true,
            Fit::Slack => {
                if let Some(ticket) = self.waiters.wake_first() {
                    trace!(ticket = %ticket, level = self.bucket.level(), "Woke waiter early");
                }
                true
            }
        }
    }
}

fn is_valid_amount(amount: f64) -> bool {
    amount.is_finite() && amount > 0.0
}

impl LeakyBucket {
    /// Create a limiter admitting `max_rate` units per `time_period`.
    pub fn new(max_rate: f64, time_period: Duration) -> Result<Self> {
        let period_secs = time_period.as_secs_f64();
        if !(max_rate.is_finite() && max_rate > 0.0 && period_secs > 0.0) {
            return Err(SluiceError::InvalidLimit {
                max_rate,
                time_period: period_secs,
            });
        }

        Ok(Self {
            state: Mutex::new(LimiterState {
                bucket: Bucket::new(max_rate, time_period),
                waiters: WaiterRegistry::new(),
            }),
            time_period,
        })
    }

    /// Create a limiter from configuration.
    pub fn from_config(config: &LimiterConfig) -> Result<Self> {
        let time_period = Duration::try_from_secs_f64(config.time_period_secs).map_err(|_| {
            SluiceError::InvalidLimit {
                max_rate: config.max_rate,
                time_period: config.time_period_secs,
            }
        })?;
        Self::new(config.max_rate, time_period)
    }

    /// Check whether `amount` would currently be admitted.
    ///
    /// When the check finds slack beyond the requested amount, the earliest
    /// suspended caller is woken so it can re-check before its own timer
    /// runs out. Every check therefore doubles as a nudge for waiting peers.
    ///
    /// Amounts that are not positive and finite never fit and wake nobody.
    pub fn has_capacity(&self, amount: f64) -> bool {
        if !is_valid_amount(amount) {
            return false;
        }
        let mut state = self.state.lock();
        state.check(amount)
    }

    /// Acquire `amount` units, suspending until they fit.
    ///
    /// Fails immediately with [`SluiceError::CapacityOverflow`] when `amount`
    /// exceeds the maximum rate, since no amount of draining could admit it.
    /// Dropping the returned future while it is suspended is safe: the
    /// caller's waiter entry is removed on drop.
    pub async fn acquire(&self, amount: f64) -> Result<()> {
        self.validate(amount)?;

        while !self.try_admit(amount) {
            let (ticket, woken) = self.state.lock().waiters.register();
            let _waiter = WaiterGuard {
                limiter: self,
                ticket,
            };
            let wait = self.state.lock().bucket.leak_time(amount);

            trace!(ticket = %ticket, amount, wait = ?wait, "Suspending until capacity drains");

            // A timeout only means it is time to check again.
            let _ = tokio::time::timeout(wait, woken).await;
        }

        Ok(())
    }

    /// Check and charge under one lock, so no peer can slip in between.
    fn try_admit(&self, amount: f64) -> bool {
        let mut state = self.state.lock();
        let admitted = state.check(amount);
        if admitted {
            state.bucket.fill(amount);
        }
        admitted
    }

    /// Acquire `amount` units unless `token` is cancelled first.
    pub async fn acquire_until_cancelled(
        &self,
        amount: f64,
        token: &CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(SluiceError::Cancelled),
            result = self.acquire(amount) => result,
        }
    }

    /// Scoped acquisition of a single unit.
    ///
    /// Unlike a semaphore permit, the returned [`Admission`] has nothing to
    /// give back when it goes out of scope. The charge is paid off by the
    /// bucket draining over time.
    pub async fn admit(&self) -> Result<Admission> {
        self.acquire(1.0).await?;
        Ok(Admission::granted())
    }

    /// Run `work` inside a scoped acquisition of a single unit.
    pub async fn scoped<F>(&self, work: F) -> Result<F::Output>
    where
        F: Future,
    {
        let admission = self.admit().await?;
        Ok(admission.run(work).await)
    }

    /// Current fill level, after draining.
    pub fn level(&self) -> f64 {
        let mut state = self.state.lock();
        state.bucket.drain(Instant::now());
        state.bucket.level()
    }

    pub fn max_rate(&self) -> f64 {
        self.state.lock().bucket.max_rate()
    }

    pub fn time_period(&self) -> Duration {
        self.time_period
    }

    pub fn rate_per_sec(&self) -> f64 {
        self.state.lock().bucket.rate_per_sec()
    }

    /// Number of callers currently suspended.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn validate(&self, amount: f64) -> Result<()> {
        if !is_valid_amount(amount) {
            return Err(SluiceError::InvalidAmount(amount));
        }
        let max_rate = self.max_rate();
        if amount > max_rate {
            return Err(SluiceError::CapacityOverflow {
                requested: amount,
                max_rate,
            });
        }
        Ok(())
    }

    fn remove_waiter(&self, ticket: Ticket) -> bool {
        self.state.lock().waiters.remove(ticket)
    }
}

impl std::fmt::Debug for LeakyBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LeakyBucket")
            .field("max_rate", &state.bucket.max_rate())
            .field("time_period", &self.time_period)
            .field("level", &state.bucket.level())
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

/// Removes a suspended caller's entry whether it resumed or was cancelled.
struct WaiterGuard<'a> {
    limiter: &'a LeakyBucket,
    ticket: Ticket,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.limiter.remove_waiter(self.ticket);
    }
}

/// Proof that one unit was admitted.
///
/// Dropping an `Admission` does nothing. This is deliberate and unlike most
/// scoped guards: the limiter charges for admission, not for held capacity,
/// so there is no resource to release on exit.
#[must_use = "an admission marks the start of a rate limited unit of work"]
#[derive(Debug)]
pub struct Admission {
    _private: (),
}

impl Admission {
    pub(crate) fn granted() -> Self {
        Self { _private: () }
    }

    /// Run `work` as the admitted unit.
    pub async fn run<F>(self, work: F) -> F::Output
    where
        F: Future,
    {
        work.await
    }
}
