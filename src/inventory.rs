//! Inventory snapshots and the dedup/resume plan derived from them.
//!
//! The plan is a pure function of the inventory and the per-pin save counts
//! aggregated across every success record for the same target board. The
//! manager wraps that with the file I/O and operator-facing logging.
use crate::error::RunError;
use crate::pin_ref::PinRef;
use crate::records::model::InventoryHeader;
use crate::records::{
    list_success_files, load_success_file, read_json, write_json, DuplicateEntry,
    DuplicatesReport, Inventory, LogPaths, RecordError,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use tracing::{error, info, instrument, warn};

/// Resume plan for a target board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupReport {
    /// Inventory pins never saved, in inventory order.
    pub remaining: Vec<PinRef>,
    /// Pins saved more than once, with their save counts.
    pub duplicates: Option<BTreeMap<PinRef, usize>>,
    /// Inventory index of the first remaining pin; inventory length if none.
    pub resume_index: usize,
    /// Inventory pins that already appear in some success record.
    pub already_saved: usize,
    pub total: usize,
}

/// Order-independent content hash: blake3 over the sorted canonical links.
pub fn checksum(pins: &[PinRef]) -> String {
    let mut urls: Vec<String> = pins.iter().map(PinRef::url).collect();
    urls.sort();
    blake3::hash(urls.join("|").as_bytes()).to_hex().to_string()
}

pub fn plan(inventory: &Inventory, saved_counts: &BTreeMap<PinRef, usize>) -> DedupReport {
    let remaining: Vec<PinRef> = inventory
        .pins
        .iter()
        .filter(|p| !saved_counts.contains_key(*p))
        .cloned()
        .collect();
    let resume_index = inventory
        .pins
        .iter()
        .position(|p| !saved_counts.contains_key(p))
        .unwrap_or(inventory.pins.len());
    let unique: HashSet<&PinRef> = inventory.pins.iter().collect();
    let already_saved = unique.iter().filter(|p| saved_counts.contains_key(**p)).count();
    let dups: BTreeMap<PinRef, usize> = saved_counts
        .iter()
        .filter(|(_, n)| **n > 1)
        .map(|(p, n)| (p.clone(), *n))
        .collect();

    DedupReport {
        remaining,
        duplicates: (!dups.is_empty()).then_some(dups),
        resume_index,
        already_saved,
        total: inventory.pins.len(),
    }
}

pub struct InventoryManager {
    paths: LogPaths,
    target_board: String,
}

impl InventoryManager {
    pub fn new(paths: LogPaths, target_board: impl Into<String>) -> Self {
        Self {
            paths,
            target_board: target_board.into(),
        }
    }

    /// Checksum of the inventory currently on disk, if any. Unreadable files
    /// count as absent.
    pub fn previous_checksum(&self) -> Option<String> {
        match read_json::<InventoryHeader>(&self.paths.inventory()) {
            Ok(Some(header)) => header.checksum,
            Ok(None) => None,
            Err(err) => {
                warn!(?err, "previous inventory unreadable");
                None
            }
        }
    }

    /// Compare a fresh inventory with the checksum it replaced. `None` when
    /// there was no earlier inventory.
    pub fn verify_inventory_integrity(&self, previous: Option<&str>, current: &Inventory) -> Option<bool> {
        let unchanged = previous? == current.checksum;
        if unchanged {
            info!("source board unchanged since last inventory");
        } else {
            warn!(checksum = %current.checksum, "source board changed since last inventory");
        }
        Some(unchanged)
    }

    /// Snapshot `pins` as the new inventory, replacing any previous one.
    #[instrument(skip_all, fields(pins = pins.len()))]
    pub fn create_inventory(&self, pins: &[PinRef]) -> Result<Inventory, RecordError> {
        let inventory = Inventory {
            created_at: Utc::now(),
            total_count: pins.len(),
            pins: pins.to_vec(),
            checksum: checksum(pins),
        };
        write_json(&self.paths.inventory(), &inventory)?;
        info!(checksum = %inventory.checksum, "inventory written");
        Ok(inventory)
    }

    pub fn load_inventory(&self) -> Result<Inventory, RunError> {
        let path = self.paths.inventory();
        read_json::<Inventory>(&path)?.ok_or(RunError::MissingInventory(path))
    }

    /// How many times each pin was saved to this board, across all runs.
    /// Records without a board are legacy and always count.
    pub fn saved_counts(&self) -> Result<BTreeMap<PinRef, usize>, RecordError> {
        let mut counts = BTreeMap::new();
        for path in list_success_files(self.paths.dir())? {
            let file = match load_success_file(&path) {
                Ok(file) => file,
                Err(err) => {
                    warn!(path = %path.display(), ?err, "skipping unreadable success record");
                    continue;
                }
            };
            match file.target_board.as_deref() {
                Some(board) if board != self.target_board => continue,
                _ => {}
            }
            // A pin listed twice in one file was still saved once by that run.
            let unique: HashSet<PinRef> = file.successful_pins.into_iter().collect();
            for pin in unique {
                *counts.entry(pin).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Build the resume plan. When duplicates exist they are also written to
    /// `duplicates.json` for manual cleanup.
    #[instrument(skip(self), fields(board = %self.target_board))]
    pub fn detect_duplicates(&self) -> Result<DedupReport, RunError> {
        let inventory = self.load_inventory()?;
        let counts = self.saved_counts()?;
        let report = plan(&inventory, &counts);

        info!(
            total = report.total,
            already_saved = report.already_saved,
            remaining = report.remaining.len(),
            "inventory compared with saved records"
        );

        if let Some(dups) = &report.duplicates {
            let mut entries: Vec<DuplicateEntry> = dups
                .iter()
                .map(|(pin, n)| DuplicateEntry {
                    pin_url: pin.clone(),
                    pin_id: pin.id().to_string(),
                    saved_count: *n,
                    extra_saves: n - 1,
                })
                .collect();
            entries.sort_by(|a, b| b.saved_count.cmp(&a.saved_count).then(a.pin_url.cmp(&b.pin_url)));
            let file = DuplicatesReport {
                detected_at: Utc::now(),
                total_duplicates: entries.len(),
                duplicated_pins: entries,
                action_needed: "Remove the extra copies from the target board manually".into(),
            };
            write_json(&self.paths.duplicates(), &file)?;
            warn!(count = file.total_duplicates, path = %self.paths.duplicates().display(), "duplicate saves detected");
        }
        Ok(report)
    }

    pub fn acknowledged(&self) -> Result<BTreeMap<PinRef, usize>, RecordError> {
        Ok(read_json(&self.paths.acknowledged())?.unwrap_or_default())
    }

    /// Record that the operator has seen (or cleaned up) these duplicates.
    pub fn acknowledge_duplicates(&self, dups: &BTreeMap<PinRef, usize>) -> Result<(), RecordError> {
        let mut acked = self.acknowledged()?;
        for (pin, n) in dups {
            let entry = acked.entry(pin.clone()).or_insert(0);
            *entry = (*entry).max(*n);
        }
        write_json(&self.paths.acknowledged(), &acked)?;
        info!(count = dups.len(), "duplicates acknowledged");
        Ok(())
    }

    /// Duplicates whose save count grew past what the operator acknowledged.
    pub fn unacknowledged(
        &self,
        dups: &BTreeMap<PinRef, usize>,
    ) -> Result<BTreeMap<PinRef, usize>, RecordError> {
        let acked = self.acknowledged()?;
        Ok(dups
            .iter()
            .filter(|(pin, n)| acked.get(*pin).map_or(true, |a| **n > *a))
            .map(|(p, n)| (p.clone(), *n))
            .collect())
    }

    /// Tell the operator where the run will pick up, or what must be cleaned
    /// up first. Returns whether the run may proceed.
    pub fn log_resume_instructions(&self, report: &DedupReport, blocking: &BTreeMap<PinRef, usize>) -> bool {
        if !blocking.is_empty() {
            error!(count = blocking.len(), "duplicate saves must be cleaned up before resuming");
            for (pin, n) in blocking.iter().take(10) {
                error!(pin = %pin, saved = n, "duplicate");
            }
            error!(
                path = %self.paths.duplicates().display(),
                "remove the extra copies, then rerun with --acknowledge-duplicates"
            );
            return false;
        }
        match report.remaining.first() {
            None => info!("all pins already saved; nothing to resume"),
            Some(first) => info!(
                resume_at = report.resume_index + 1,
                total = report.total,
                remaining = report.remaining.len(),
                first = %first,
                "ready to resume"
            ),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pins(ids: &[&str]) -> Vec<PinRef> {
        ids.iter().map(|id| PinRef::parse(id).unwrap()).collect()
    }

    fn inventory(ids: &[&str]) -> Inventory {
        let pins = pins(ids);
        Inventory {
            created_at: Utc::now(),
            total_count: pins.len(),
            checksum: checksum(&pins),
            pins,
        }
    }

    #[test]
    fn checksum_ignores_order() {
        assert_eq!(checksum(&pins(&["1", "2", "3"])), checksum(&pins(&["3", "1", "2"])));
        assert_ne!(checksum(&pins(&["1", "2"])), checksum(&pins(&["1", "2", "3"])));
    }

    #[test]
    fn plan_partitions_inventory() {
        let inv = inventory(&["a", "b", "c", "d"]);
        let counts: BTreeMap<PinRef, usize> =
            [(PinRef::parse("a").unwrap(), 2), (PinRef::parse("c").unwrap(), 1), (PinRef::parse("z").unwrap(), 1)]
                .into_iter()
                .collect();
        let report = plan(&inv, &counts);
        assert_eq!(report.remaining, pins(&["b", "d"]));
        assert_eq!(report.resume_index, 1);
        assert_eq!(report.already_saved, 2);
        assert_eq!(report.remaining.len() + report.already_saved, inv.pins.len());
        let dups = report.duplicates.unwrap();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[&PinRef::parse("a").unwrap()], 2);
    }

    #[test]
    fn plan_when_everything_is_saved() {
        let inv = inventory(&["a", "b"]);
        let counts: BTreeMap<PinRef, usize> = pins(&["a", "b"]).into_iter().map(|p| (p, 1)).collect();
        let report = plan(&inv, &counts);
        assert!(report.remaining.is_empty());
        assert_eq!(report.resume_index, 2);
        assert!(report.duplicates.is_none());
    }
}
