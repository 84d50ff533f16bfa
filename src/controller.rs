//! Run orchestration: collect, snapshot, dedup, resume, save, persist.
//!
//! Per-run records are flushed at every checkpoint interval and once more
//! when the run ends, whatever the reason.
use crate::browser::BrowserSession;
use crate::checkpoint::CheckpointStore;
use crate::collector::{CollectorSettings, LinkCollector};
use crate::config::Config;
use crate::error::RunError;
use crate::executor::{BlockAwareExecutor, RunLedger};
use crate::inventory::InventoryManager;
use crate::pacing::{Interrupted, Pacing};
use crate::pin_ref::PinRef;
use crate::records::{
    latest_failure_file, load_failure_file, write_json, FailureFile, LogPaths, RecordError, RunId,
    SuccessFile, FAILURE_FILE_VERSION,
};
use crate::saver::PinSaver;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

pub struct RunContext {
    pub config: Config,
    pub paths: LogPaths,
    pub pacing: Pacing,
    pub run_id: RunId,
}

impl RunContext {
    pub fn new(config: Config, pacing: Pacing) -> Self {
        let paths = LogPaths::new(config.logs_dir());
        Self {
            config,
            paths,
            pacing,
            run_id: RunId::new(),
        }
    }

    fn target_board(&self) -> &str {
        &self.config.boards.target_name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    NothingToDo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

pub struct RunController<'a> {
    ctx: &'a RunContext,
    ledger: RunLedger,
    acknowledge_duplicates: bool,
    drove_pins: bool,
    total: usize,
    skipped: usize,
    duplicates: usize,
}

impl<'a> RunController<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self {
            ctx,
            ledger: RunLedger::default(),
            acknowledge_duplicates: false,
            drove_pins: false,
            total: 0,
            skipped: 0,
            duplicates: 0,
        }
    }

    /// Accept the duplicates currently on record instead of halting on them.
    pub fn acknowledge_duplicates(mut self, yes: bool) -> Self {
        self.acknowledge_duplicates = yes;
        self
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.total,
            succeeded: self.ledger.succeeded.len(),
            failed: self.ledger.failed.len(),
            skipped: self.skipped,
            duplicates: self.duplicates,
        }
    }

    /// Full copy run: collect the source board, snapshot it, work out what is
    /// left and save it.
    #[instrument(skip_all, fields(run = %self.ctx.run_id.as_str()))]
    pub async fn run_copy(
        &mut self,
        browser: &dyn BrowserSession,
        saver: &dyn PinSaver,
    ) -> Result<RunOutcome, RunError> {
        let result = self.copy_inner(browser, saver).await;
        self.finalize(&result);
        result
    }

    /// Retry the pins listed in the most recent failure record. Does not
    /// consult the inventory or the checkpoint.
    #[instrument(skip_all, fields(run = %self.ctx.run_id.as_str()))]
    pub async fn run_retry(&mut self, saver: &dyn PinSaver) -> Result<RunOutcome, RunError> {
        let result = self.retry_inner(saver).await;
        self.finalize(&result);
        result
    }

    async fn copy_inner(
        &mut self,
        browser: &dyn BrowserSession,
        saver: &dyn PinSaver,
    ) -> Result<RunOutcome, RunError> {
        let ctx = self.ctx;
        let cfg = &ctx.config;

        let collector = LinkCollector::new(browser, &ctx.pacing, CollectorSettings::from_config(cfg));
        let collection = collector.collect(&cfg.boards.source_url).await?;
        if collection.pins.is_empty() {
            return Err(RunError::Collection(cfg.boards.source_url.clone()));
        }

        let manager = InventoryManager::new(ctx.paths.clone(), ctx.target_board());
        let previous = manager.previous_checksum();
        let inventory = manager.create_inventory(&collection.pins)?;
        manager.verify_inventory_integrity(previous.as_deref(), &inventory);
        self.total = inventory.pins.len();

        let report = manager.detect_duplicates()?;
        if let Some(dups) = &report.duplicates {
            self.duplicates = dups.len();
            if self.acknowledge_duplicates {
                manager.acknowledge_duplicates(dups)?;
                warn!(count = dups.len(), "continuing with acknowledged duplicates");
            } else {
                let blocking = manager.unacknowledged(dups)?;
                if !manager.log_resume_instructions(&report, &blocking) {
                    return Err(RunError::DuplicateState(blocking.len()));
                }
                info!(count = dups.len(), "all duplicates previously acknowledged");
            }
        }

        let checkpoint = CheckpointStore::new(ctx.paths.checkpoint(), ctx.target_board());
        let mut pending = report.remaining.clone();
        if let Some(cp) = checkpoint.load() {
            let before = pending.len();
            pending.retain(|p| !cp.processed.contains(p));
            info!(
                skipped = before - pending.len(),
                carried_failures = cp.failed.len(),
                "resuming from checkpoint"
            );
            self.ledger = RunLedger::resumed(cp.processed, cp.failed);
        }
        self.skipped = self.total - pending.len();

        if pending.is_empty() {
            info!(total = self.total, "all pins already saved; nothing to do");
            checkpoint.clear();
            return Ok(RunOutcome::NothingToDo);
        }
        manager.log_resume_instructions(&report, &BTreeMap::new());

        self.drive(&pending, saver, Some(&checkpoint)).await?;
        checkpoint.clear();
        Ok(RunOutcome::Completed)
    }

    async fn retry_inner(&mut self, saver: &dyn PinSaver) -> Result<RunOutcome, RunError> {
        let Some(path) = latest_failure_file(self.ctx.paths.dir())? else {
            info!("no failure records found; nothing to retry");
            return Ok(RunOutcome::NothingToDo);
        };
        let file = load_failure_file(&path)?;
        let mut seen = HashSet::new();
        let pins: Vec<PinRef> = file
            .failed_pins
            .into_iter()
            .map(|f| f.pin_url)
            .filter(|p| seen.insert(p.clone()))
            .collect();
        self.total = pins.len();
        if pins.is_empty() {
            info!(path = %path.display(), "latest failure record is empty; nothing to retry");
            return Ok(RunOutcome::NothingToDo);
        }
        info!(path = %path.display(), pins = pins.len(), "retrying failed pins");
        self.drive(&pins, saver, None).await?;
        Ok(RunOutcome::Completed)
    }

    async fn drive(
        &mut self,
        pins: &[PinRef],
        saver: &dyn PinSaver,
        checkpoint: Option<&CheckpointStore>,
    ) -> Result<(), RunError> {
        let ctx = self.ctx;
        let cfg = &ctx.config;
        let executor = BlockAwareExecutor::new(
            saver,
            &ctx.pacing,
            ctx.target_board(),
            cfg.block_backoff(),
            cfg.pacing.min_delay_secs,
            cfg.pacing.max_delay_secs,
        );
        self.drove_pins = true;
        let started = Instant::now();
        let total = pins.len();

        for (idx, pin) in pins.iter().enumerate() {
            if ctx.pacing.is_cancelled() {
                self.persist(checkpoint);
                return Err(Interrupted.into());
            }
            info!(index = idx + 1, total, pin = %pin, "processing pin");
            if let Err(err) = executor.process_pin(pin, &mut self.ledger).await {
                self.persist(checkpoint);
                return Err(err.into());
            }

            let done = idx + 1;
            if done % cfg.run.checkpoint_interval == 0 {
                self.persist(checkpoint);
            }
            if done % cfg.run.progress_interval == 0 {
                log_progress(started.elapsed(), done, total, &self.ledger);
            }
        }
        Ok(())
    }

    fn persist(&self, checkpoint: Option<&CheckpointStore>) {
        if let Some(store) = checkpoint {
            store.save(&self.ledger.processed, &self.ledger.failed);
        }
        if let Err(err) = self.write_records() {
            warn!(?err, "could not flush run records");
        }
    }

    /// Success records are only written when something succeeded, so that
    /// empty files never shadow real ones. The failure record is written
    /// whenever pins were attempted, so the latest failure file always
    /// reflects the latest run.
    fn write_records(&self) -> Result<(), RecordError> {
        let ctx = self.ctx;
        let now = Utc::now();
        let target = Some(ctx.target_board().to_string());
        let run_id = Some(ctx.run_id.as_str().to_string());

        if !self.ledger.succeeded.is_empty() {
            let pins = self.ledger.successful_pins();
            let file = SuccessFile {
                count: pins.len(),
                successful_pins: pins,
                timestamp: now,
                target_board: target.clone(),
                run_id: run_id.clone(),
            };
            write_json(&ctx.paths.success_for_run(&ctx.run_id), &file)?;
            write_json(&ctx.paths.success_latest(), &file)?;
        }
        if self.drove_pins {
            let file = FailureFile {
                version: FAILURE_FILE_VERSION,
                count: self.ledger.failed.len(),
                failed_pins: self.ledger.failed.clone(),
                timestamp: now,
                target_board: target,
                run_id,
            };
            write_json(&ctx.paths.failure_for_run(&ctx.run_id), &file)?;
        }
        Ok(())
    }

    fn finalize(&self, result: &Result<RunOutcome, RunError>) {
        if let Err(err) = self.write_records() {
            error!(?err, "could not write run records");
        }
        let summary = self.summary();
        info!(
            total = summary.total,
            success = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            duplicates = summary.duplicates,
            "Total: {} | Success: {} | Failed: {} | Skipped: {}",
            summary.total,
            summary.succeeded,
            summary.failed,
            summary.skipped
        );
        match result {
            Ok(RunOutcome::Completed) => info!("run completed"),
            Ok(RunOutcome::NothingToDo) => info!("nothing to do"),
            Err(RunError::Interrupted(_)) => {
                warn!("run interrupted; progress saved, rerun the same command to resume")
            }
            Err(err) => error!(%err, "run stopped"),
        }
    }
}

fn log_progress(elapsed: Duration, done: usize, total: usize, ledger: &RunLedger) {
    let per_pin = elapsed.as_secs_f64() / done as f64;
    let eta = Duration::from_secs_f64(per_pin * (total - done) as f64);
    info!(
        done,
        total,
        success = ledger.succeeded.len(),
        failed = ledger.failed.len(),
        eta_mins = eta.as_secs() / 60,
        eta_secs = eta.as_secs() % 60,
        "progress"
    );
}
