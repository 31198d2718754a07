//! Admission trait consumed by work drivers.

use async_trait::async_trait;
use std::sync::Arc;

use super::limiter::{Admission, LeakyBucket};
use crate::error::Result;

/// Trait for anything that gates admission of work.
///
/// This lets the batch driver run against the leaky bucket in production and
/// against simpler gates in tests.
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Wait until `amount` units are admitted.
    async fn acquire(&self, amount: f64) -> Result<()>;

    /// Scoped acquisition of a single unit of work.
    async fn admit_one(&self) -> Result<Admission> {
        self.acquire(1.0).await?;
        Ok(Admission::granted())
    }
}

#[async_trait]
impl AdmissionGate for LeakyBucket {
    async fn acquire(&self, amount: f64) -> Result<()> {
        LeakyBucket::acquire(self, amount).await
    }

    async fn admit_one(&self) -> Result<Admission> {
        self.admit().await
    }
}

#[async_trait]
impl<G: AdmissionGate + ?Sized> AdmissionGate for Arc<G> {
    async fn acquire(&self, amount: f64) -> Result<()> {
        (**self).acquire(amount).await
    }

    async fn admit_one(&self) -> Result<Admission> {
        (**self).admit_one().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn admit_through<G: AdmissionGate>(gate: &G) -> Result<u32> {
        let admission = gate.admit_one().await?;
        Ok(admission.run(async { 7 }).await)
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaky_bucket_as_gate() {
        let limiter = Arc::new(LeakyBucket::new(3.0, Duration::from_secs(3)).unwrap());

        assert_eq!(admit_through(&limiter).await.unwrap(), 7);
        AdmissionGate::acquire(&limiter, 2.0).await.unwrap();

        assert_eq!(limiter.level(), 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_propagates_overflow() {
        let limiter = LeakyBucket::new(3.0, Duration::from_secs(3)).unwrap();
        let gate: &dyn AdmissionGate = &limiter;

        let err = gate.acquire(4.0).await.unwrap_err();
        assert!(matches!(err, crate::error::SluiceError::CapacityOverflow { .. }));
    }
}
