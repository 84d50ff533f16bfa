//! Timed waits: render delays, human-like jitter and block backoff all go
//! through [`Pacing::pause`], which gives up early when the run is cancelled.
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("interrupted by user")]
pub struct Interrupted;

/// Clock used for every wait. Tests swap in a recording implementation.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Clone)]
pub struct Pacing {
    pacer: Arc<dyn Pacer>,
    cancel: CancellationToken,
}

impl Pacing {
    pub fn new(pacer: Arc<dyn Pacer>, cancel: CancellationToken) -> Self {
        Self { pacer, cancel }
    }

    pub fn real(cancel: CancellationToken) -> Self {
        Self::new(Arc::new(TokioPacer), cancel)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The underlying clock, for waits that must not be cut short.
    pub fn pacer(&self) -> Arc<dyn Pacer> {
        self.pacer.clone()
    }

    /// Suspend for `duration` unless the run is cancelled first.
    pub async fn pause(&self, duration: Duration) -> Result<(), Interrupted> {
        if self.cancel.is_cancelled() {
            return Err(Interrupted);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted),
            _ = self.pacer.sleep(duration) => Ok(()),
        }
    }
}

/// Uniform random delay in `[min_secs, max_secs]`.
pub fn jitter(min_secs: f64, max_secs: f64) -> Duration {
    let span = (max_secs - min_secs).max(0.0);
    Duration::from_secs_f64(min_secs.max(0.0) + fastrand::f64() * span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..200 {
            let d = jitter(2.0, 5.0).as_secs_f64();
            assert!((2.0..=5.0).contains(&d), "{d}");
        }
        assert_eq!(jitter(1.0, 1.0), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn pause_returns_early_when_cancelled() {
        let cancel = CancellationToken::new();
        let pacing = Pacing::real(cancel.clone());
        cancel.cancel();
        assert_eq!(pacing.pause(Duration::from_secs(3600)).await, Err(Interrupted));
    }

    #[tokio::test]
    async fn pause_sleeps_when_not_cancelled() {
        let pacing = Pacing::real(CancellationToken::new());
        assert_eq!(pacing.pause(Duration::from_millis(1)).await, Ok(()));
    }
}
