//! Interruption-safe progress marker.
//!
//! Saving is best effort: a failed write is logged and the run carries on,
//! since the success records are the real source of truth.
use crate::pin_ref::PinRef;
use crate::records::{read_json, remove_if_exists, write_json, Checkpoint, FailureEntry};
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub struct CheckpointStore {
    path: PathBuf,
    target_board: String,
}

impl CheckpointStore {
    pub fn new(path: PathBuf, target_board: impl Into<String>) -> Self {
        Self {
            path,
            target_board: target_board.into(),
        }
    }

    pub fn save(&self, processed: &BTreeSet<PinRef>, failed: &[FailureEntry]) -> bool {
        let checkpoint = Checkpoint {
            processed: processed.clone(),
            timestamp: Utc::now(),
            count: processed.len(),
            target_board: Some(self.target_board.clone()),
            failed: failed.to_vec(),
        };
        match write_json(&self.path, &checkpoint) {
            Ok(()) => {
                debug!(count = checkpoint.count, "checkpoint saved");
                true
            }
            Err(err) => {
                warn!(?err, path = %self.path.display(), "could not save checkpoint");
                false
            }
        }
    }

    /// The stored checkpoint, if it exists, is readable and belongs to the
    /// same target board.
    pub fn load(&self) -> Option<Checkpoint> {
        let checkpoint = match read_json::<Checkpoint>(&self.path) {
            Ok(found) => found?,
            Err(err) => {
                warn!(?err, path = %self.path.display(), "ignoring unreadable checkpoint");
                return None;
            }
        };
        match checkpoint.target_board.as_deref() {
            Some(board) if board != self.target_board => {
                warn!(
                    checkpoint_board = board,
                    "checkpoint belongs to a different target board; ignoring it"
                );
                None
            }
            _ => {
                info!(processed = checkpoint.count, at = %checkpoint.timestamp, "checkpoint found");
                Some(checkpoint)
            }
        }
    }

    pub fn clear(&self) -> bool {
        match remove_if_exists(&self.path) {
            Ok(removed) => removed,
            Err(err) => {
                warn!(?err, "could not remove checkpoint");
                false
            }
        }
    }
}
