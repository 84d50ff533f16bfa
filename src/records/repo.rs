use super::model::{FailureEntry, FailureFile, SuccessFile, FAILURE_FILE_VERSION};
use crate::pin_ref::PinRef;
use chrono::{DateTime, Local, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const INVENTORY_FILE: &str = "pins_inventory.json";
pub const SUCCESS_LATEST_FILE: &str = "success_pins_latest.json";
pub const DUPLICATES_FILE: &str = "duplicates.json";
pub const ACKNOWLEDGED_FILE: &str = "duplicates_acknowledged.json";
pub const CHECKPOINT_FILE: &str = "progress_checkpoint.json";

const SUCCESS_PREFIX: &str = "success_pins_";
const FAILURE_PREFIX: &str = "failed_pins_";
const MIGRATED_REASON: &str = "unknown (migrated from legacy record)";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported record format in {path}: {reason}")]
    Format { path: PathBuf, reason: String },
}

/// Identity of one run, used to name its record files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunId {
    started_at: DateTime<Local>,
    short: String,
}

impl RunId {
    pub fn new() -> Self {
        let short = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            started_at: Local::now(),
            short,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.short
    }

    /// `<YYYYmmdd_HHMMSS>_<short>`; sorts chronologically by name.
    pub fn file_tag(&self) -> String {
        format!("{}_{}", self.started_at.format("%Y%m%d_%H%M%S"), self.short)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// File layout under the logs directory.
#[derive(Debug, Clone)]
pub struct LogPaths {
    dir: PathBuf,
}

impl LogPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn inventory(&self) -> PathBuf {
        self.dir.join(INVENTORY_FILE)
    }

    pub fn success_latest(&self) -> PathBuf {
        self.dir.join(SUCCESS_LATEST_FILE)
    }

    pub fn duplicates(&self) -> PathBuf {
        self.dir.join(DUPLICATES_FILE)
    }

    pub fn acknowledged(&self) -> PathBuf {
        self.dir.join(ACKNOWLEDGED_FILE)
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    pub fn success_for_run(&self, run: &RunId) -> PathBuf {
        self.dir
            .join(format!("{}{}.json", SUCCESS_PREFIX, run.file_tag()))
    }

    pub fn failure_for_run(&self, run: &RunId) -> PathBuf {
        self.dir
            .join(format!("{}{}.json", FAILURE_PREFIX, run.file_tag()))
    }

    pub fn lost_pins(&self, day: &DateTime<Local>) -> PathBuf {
        self.dir
            .join(format!("lost_pins_{}.json", day.format("%Y%m%d")))
    }
}

/// Read and decode a JSON file. A missing file is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, RecordError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Write pretty JSON through a sibling temp file and rename, so a crash never
/// leaves a half-written record behind.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), RecordError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_string_pretty(value)?;
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Returns whether a file was actually removed.
pub fn remove_if_exists(path: &Path) -> Result<bool, RecordError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

fn list_with_prefix(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, RecordError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(prefix) && name.ends_with(".json") {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Per-run success files, oldest first. The rolling `success_pins_latest.json`
/// mirrors a per-run file and is left out so nothing is counted twice.
pub fn list_success_files(dir: &Path) -> Result<Vec<PathBuf>, RecordError> {
    let mut files = list_with_prefix(dir, SUCCESS_PREFIX)?;
    files.retain(|p| p.file_name().and_then(|n| n.to_str()) != Some(SUCCESS_LATEST_FILE));
    Ok(files)
}

pub fn list_failure_files(dir: &Path) -> Result<Vec<PathBuf>, RecordError> {
    list_with_prefix(dir, FAILURE_PREFIX)
}

/// Most recently modified failure file, ties broken by name.
pub fn latest_failure_file(dir: &Path) -> Result<Option<PathBuf>, RecordError> {
    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
    for path in list_failure_files(dir)? {
        let modified = fs::metadata(&path)?.modified()?;
        let replace = match &best {
            None => true,
            Some((m, p)) => (modified, &path) > (*m, p),
        };
        if replace {
            best = Some((modified, path));
        }
    }
    Ok(best.map(|(_, p)| p))
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_success_file(path: &Path) -> Result<SuccessFile, RecordError> {
    let raw: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    if raw.is_array() {
        let migrated = migrate_legacy_successes(&raw, path, Utc::now())?;
        write_json(path, &migrated)?;
        info!(pins = migrated.count, "migrated legacy success record");
        return Ok(migrated);
    }
    Ok(serde_json::from_value(raw)?)
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_failure_file(path: &Path) -> Result<FailureFile, RecordError> {
    let raw: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    if raw.is_array() {
        let migrated = migrate_legacy_failures(&raw, path, Utc::now())?;
        write_json(path, &migrated)?;
        info!(pins = migrated.count, "migrated legacy failure record");
        return Ok(migrated);
    }
    match raw.get("version").and_then(Value::as_u64) {
        Some(v) if v == u64::from(FAILURE_FILE_VERSION) => Ok(serde_json::from_value(raw)?),
        other => Err(RecordError::Format {
            path: path.to_path_buf(),
            reason: format!("unknown failure record version {:?}", other),
        }),
    }
}

fn legacy_link(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get("pin_url")
            .or_else(|| map.get("url"))
            .and_then(Value::as_str),
        _ => None,
    }
}

/// Convert the old bare-list success format (`[{"url", "timestamp"}]`).
pub fn migrate_legacy_successes(
    raw: &Value,
    path: &Path,
    migrated_at: DateTime<Utc>,
) -> Result<SuccessFile, RecordError> {
    let entries = raw.as_array().ok_or_else(|| RecordError::Format {
        path: path.to_path_buf(),
        reason: "expected a list of saved pins".into(),
    })?;
    let mut pins = Vec::with_capacity(entries.len());
    for entry in entries {
        match legacy_link(entry).map(PinRef::parse) {
            Some(Ok(pin)) => pins.push(pin),
            _ => warn!(?entry, "dropping unreadable legacy success entry"),
        }
    }
    Ok(SuccessFile {
        count: pins.len(),
        successful_pins: pins,
        timestamp: migrated_at,
        target_board: None,
        run_id: None,
    })
}

/// Convert the old bare-list failure format. Entries were either plain links
/// or `{"pin_url", "reason", "timestamp"}` objects.
pub fn migrate_legacy_failures(
    raw: &Value,
    path: &Path,
    migrated_at: DateTime<Utc>,
) -> Result<FailureFile, RecordError> {
    let entries = raw.as_array().ok_or_else(|| RecordError::Format {
        path: path.to_path_buf(),
        reason: "expected a list of failed pins".into(),
    })?;
    let mut failed = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(Ok(pin)) = legacy_link(entry).map(PinRef::parse) else {
            warn!(?entry, "dropping unreadable legacy failure entry");
            continue;
        };
        let reason = entry
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or(MIGRATED_REASON)
            .to_string();
        failed.push(FailureEntry {
            pin_url: pin,
            reason,
            timestamp: migrated_at,
        });
    }
    Ok(FailureFile {
        version: FAILURE_FILE_VERSION,
        count: failed.len(),
        failed_pins: failed,
        timestamp: migrated_at,
        target_board: None,
        run_id: None,
    })
}

/// Remember a pin whose page no longer exists, once per day file.
pub fn append_lost_pin(paths: &LogPaths, pin: &PinRef) -> Result<(), RecordError> {
    let path = paths.lost_pins(&Local::now());
    let mut pins: Vec<PinRef> = read_json(&path)?.unwrap_or_default();
    if !pins.contains(pin) {
        pins.push(pin.clone());
        write_json(&path, &pins)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn write_json_is_atomic_and_readable() {
        let td = tempdir().unwrap();
        let path = td.path().join("nested").join("x.json");
        write_json(&path, &vec![1, 2, 3]).unwrap();
        let back: Option<Vec<i32>> = read_json(&path).unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn read_json_missing_is_none() {
        let td = tempdir().unwrap();
        let back: Option<Vec<i32>> = read_json(&td.path().join("nope.json")).unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn success_listing_skips_latest_and_other_files() {
        let td = tempdir().unwrap();
        for name in [
            "success_pins_20240101_000000_aaaa.json",
            "success_pins_latest.json",
            "failed_pins_20240101_000000_aaaa.json",
            "success_pins_20240102_000000_bbbb.json",
        ] {
            fs::write(td.path().join(name), "{}").unwrap();
        }
        let files = list_success_files(td.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "success_pins_20240101_000000_aaaa.json",
                "success_pins_20240102_000000_bbbb.json"
            ]
        );
    }

    #[test]
    fn legacy_failure_list_is_migrated_and_rewritten() {
        let td = tempdir().unwrap();
        let path = td.path().join("failed_pins_20230101_120000.json");
        let legacy = json!([
            "https://tr.pinterest.com/pin/111/",
            {"pin_url": "https://tr.pinterest.com/pin/222/", "reason": "Save failed", "timestamp": "2023-01-01T12:00:00"},
            {"unexpected": true}
        ]);
        fs::write(&path, legacy.to_string()).unwrap();

        let file = load_failure_file(&path).unwrap();
        assert_eq!(file.version, FAILURE_FILE_VERSION);
        assert_eq!(file.count, 2);
        assert_eq!(file.failed_pins[0].pin_url.id(), "111");
        assert_eq!(file.failed_pins[0].reason, MIGRATED_REASON);
        assert_eq!(file.failed_pins[1].reason, "Save failed");

        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["version"], 2);
        assert_eq!(load_failure_file(&path).unwrap(), file);
    }

    #[test]
    fn unknown_failure_version_is_rejected() {
        let td = tempdir().unwrap();
        let path = td.path().join("failed_pins_x.json");
        fs::write(&path, json!({"version": 9, "failed_pins": []}).to_string()).unwrap();
        assert!(matches!(
            load_failure_file(&path),
            Err(RecordError::Format { .. })
        ));
    }

    #[test]
    fn legacy_success_list_is_migrated() {
        let td = tempdir().unwrap();
        let path = td.path().join("success_pins_20230101_120000.json");
        let legacy = json!([
            {"url": "https://tr.pinterest.com/pin/1/", "timestamp": "2023-01-01T12:00:00"},
            {"url": "https://tr.pinterest.com/pin/2/", "timestamp": "2023-01-01T12:00:05"}
        ]);
        fs::write(&path, legacy.to_string()).unwrap();
        let file = load_success_file(&path).unwrap();
        assert_eq!(file.count, 2);
        assert_eq!(file.successful_pins[1].url(), "https://www.pinterest.com/pin/2/");
        assert!(file.target_board.is_none());
    }

    #[test]
    fn lost_pins_are_recorded_once() {
        let td = tempdir().unwrap();
        let paths = LogPaths::new(td.path());
        let pin = PinRef::parse("9").unwrap();
        append_lost_pin(&paths, &pin).unwrap();
        append_lost_pin(&paths, &pin).unwrap();
        let stored: Vec<PinRef> = read_json(&paths.lost_pins(&Local::now())).unwrap().unwrap();
        assert_eq!(stored, vec![pin]);
    }

    #[test]
    fn run_file_names_carry_the_run_tag() {
        let paths = LogPaths::new("logs");
        let run = RunId::new();
        let name = paths.success_for_run(&run);
        let name = name.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("success_pins_"));
        assert!(name.ends_with(&format!("_{}.json", run.as_str())));
        assert_eq!(run.as_str().len(), 8);
    }
}
