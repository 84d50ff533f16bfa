//! Record shapes as stored on disk.
//!
//! Keep these structs focused on the persisted data. Diffing and resume
//! logic live in higher layers.

use crate::pin_ref::PinRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Current shape version for failure files. Files without a `version`
/// field are legacy lists and must be migrated before use.
pub const FAILURE_FILE_VERSION: u32 = 2;

/// One run's snapshot of every pin on the source board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inventory {
    pub created_at: DateTime<Utc>,
    #[serde(alias = "total_pins")]
    pub total_count: usize,
    pub pins: Vec<PinRef>,
    pub checksum: String,
}

/// Minimal view of a previous inventory, tolerant of older files whose
/// timestamps do not parse.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryHeader {
    #[serde(alias = "total_pins", default)]
    pub total_count: usize,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Pins confirmed saved by one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessFile {
    pub successful_pins: Vec<PinRef>,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub target_board: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureEntry {
    pub pin_url: PinRef,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Pins that failed in one run, with reasons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureFile {
    pub version: u32,
    pub failed_pins: Vec<FailureEntry>,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub target_board: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

/// In-progress record of pins handled by the current run. Failures are kept
/// so a resumed run can carry them into its own failure record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub processed: BTreeSet<PinRef>,
    pub timestamp: DateTime<Utc>,
    pub count: usize,
    #[serde(default)]
    pub target_board: Option<String>,
    #[serde(default)]
    pub failed: Vec<FailureEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateEntry {
    pub pin_url: PinRef,
    pub pin_id: String,
    pub saved_count: usize,
    pub extra_saves: usize,
}

/// Pins that appear in more than one historical success record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicatesReport {
    pub detected_at: DateTime<Utc>,
    pub total_duplicates: usize,
    pub duplicated_pins: Vec<DuplicateEntry>,
    pub action_needed: String,
}
