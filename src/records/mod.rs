//! Run records: persisted JSON shapes and the file functions that read and
//! write them under the logs directory.
//!
//! This module is split into two submodules:
//! - `model`: typed record shapes exactly as they appear on disk.
//! - `repo`: file-only functions (paths, atomic writes, legacy migration).
//!
//! External modules should import from `pin_copier::records`; the repository
//! API and the commonly used models are re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{
    Checkpoint, DuplicateEntry, DuplicatesReport, FailureEntry, FailureFile, Inventory,
    SuccessFile, FAILURE_FILE_VERSION,
};
