use crate::pacing::{jitter, Interrupted, Pacing};
use crate::pin_ref::PinRef;
use crate::records::FailureEntry;
use crate::saver::{PinSaver, SaveError};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub const REASON_SAVE_FAILED: &str = "Save failed";
pub const REASON_BLOCKED: &str = "Block after retries";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinOutcome {
    Saved,
    Failed(String),
}

/// What the current run has done so far.
#[derive(Debug, Default, Clone)]
pub struct RunLedger {
    pub succeeded: Vec<(PinRef, DateTime<Utc>)>,
    pub failed: Vec<FailureEntry>,
    /// Every pin with a recorded outcome, including ones carried over from
    /// an interrupted earlier run.
    pub processed: BTreeSet<PinRef>,
}

impl RunLedger {
    /// Pick up where an interrupted run stopped: its handled pins and the
    /// failures it had recorded so far.
    pub fn resumed(processed: BTreeSet<PinRef>, failed: Vec<FailureEntry>) -> Self {
        Self {
            processed,
            failed,
            ..Self::default()
        }
    }

    pub fn record(&mut self, pin: &PinRef, outcome: &PinOutcome) {
        let now = Utc::now();
        match outcome {
            PinOutcome::Saved => self.succeeded.push((pin.clone(), now)),
            PinOutcome::Failed(reason) => self.failed.push(FailureEntry {
                pin_url: pin.clone(),
                reason: reason.clone(),
                timestamp: now,
            }),
        }
        self.processed.insert(pin.clone());
    }

    pub fn successful_pins(&self) -> Vec<PinRef> {
        self.succeeded.iter().map(|(p, _)| p.clone()).collect()
    }
}

/// Drives one pin at a time through the saver, backing off when the site
/// pushes back.
pub struct BlockAwareExecutor<'a> {
    saver: &'a dyn PinSaver,
    pacing: &'a Pacing,
    target_board: &'a str,
    backoff: Vec<Duration>,
    min_delay_secs: f64,
    max_delay_secs: f64,
}

impl<'a> BlockAwareExecutor<'a> {
    pub fn new(
        saver: &'a dyn PinSaver,
        pacing: &'a Pacing,
        target_board: &'a str,
        backoff: Vec<Duration>,
        min_delay_secs: f64,
        max_delay_secs: f64,
    ) -> Self {
        Self {
            saver,
            pacing,
            target_board,
            backoff,
            min_delay_secs,
            max_delay_secs,
        }
    }

    /// Save `pin`, retrying only on blocks. The n-th block waits
    /// `backoff[n-1]`; once every wait is spent the pin is failed. A random
    /// delay follows every recorded outcome.
    ///
    /// Cancellation during a wait returns `Err(Interrupted)`. If the outcome
    /// was already recorded it stays in the ledger.
    #[instrument(skip(self, ledger), fields(pin = %pin))]
    pub async fn process_pin(
        &self,
        pin: &PinRef,
        ledger: &mut RunLedger,
    ) -> Result<PinOutcome, Interrupted> {
        let outcome = self.attempt(pin).await?;
        match &outcome {
            PinOutcome::Saved => info!("pin saved"),
            PinOutcome::Failed(reason) => warn!(reason = %reason, "pin failed"),
        }
        ledger.record(pin, &outcome);
        self.pacing
            .pause(jitter(self.min_delay_secs, self.max_delay_secs))
            .await?;
        Ok(outcome)
    }

    async fn attempt(&self, pin: &PinRef) -> Result<PinOutcome, Interrupted> {
        let mut blocks = 0usize;
        loop {
            match self.saver.save_pin(pin, self.target_board).await {
                Ok(true) => return Ok(PinOutcome::Saved),
                Ok(false) => return Ok(PinOutcome::Failed(REASON_SAVE_FAILED.into())),
                Err(SaveError::Failed(msg)) => {
                    return Ok(PinOutcome::Failed(format!("{REASON_SAVE_FAILED}: {msg}")));
                }
                Err(SaveError::Browser(err)) => {
                    warn!(?err, "browser error while saving");
                    return Ok(PinOutcome::Failed(format!("{REASON_SAVE_FAILED}: {err}")));
                }
                Err(SaveError::Blocked(reason)) => {
                    blocks += 1;
                    let Some(wait) = self.backoff.get(blocks - 1).copied() else {
                        return Ok(PinOutcome::Failed(REASON_BLOCKED.into()));
                    };
                    error!(
                        reason = %reason,
                        block = blocks,
                        wait_secs = wait.as_secs(),
                        "block detected; backing off"
                    );
                    self.pacing.pause(wait).await?;
                    if blocks == self.backoff.len() {
                        return Ok(PinOutcome::Failed(REASON_BLOCKED.into()));
                    }
                }
            }
        }
    }
}
