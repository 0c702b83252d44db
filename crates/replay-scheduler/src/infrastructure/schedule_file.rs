//! Schedule File Store
//!
//! Reads and writes [`ScheduleLog`]s as pretty-printed JSON.
//!
//! Writes go to a sibling temporary file that is then renamed over the
//! target, so a crash mid-emit leaves either the old schedule or the new
//! one, never a truncated file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::error::SchedulerError;
use crate::domain::schedule::{ScheduleLog, SCHEDULE_FORMAT_VERSION};

/// Load a schedule written by [`store`]
///
/// Fails on I/O errors, malformed JSON, and unknown format versions.
pub fn load(path: &Path) -> Result<ScheduleLog, SchedulerError> {
    let bytes = fs::read(path).map_err(|e| SchedulerError::io(path, e))?;
    let log: ScheduleLog =
        serde_json::from_slice(&bytes).map_err(|e| SchedulerError::format(path, e))?;

    if log.version != SCHEDULE_FORMAT_VERSION {
        return Err(SchedulerError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: log.version,
            expected: SCHEDULE_FORMAT_VERSION,
        });
    }

    info!(
        path = %path.display(),
        callbacks = log.len(),
        policy = %log.policy,
        "📂 Loaded schedule"
    );
    Ok(log)
}

/// Write `log` to `path`, replacing any existing file
pub fn store(path: &Path, log: &ScheduleLog) -> Result<(), SchedulerError> {
    let bytes = serde_json::to_vec_pretty(log).map_err(|e| SchedulerError::format(path, e))?;
    let tmp = temp_path(path);

    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };

    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(SchedulerError::io(path, e));
    }

    debug!(path = %path.display(), bytes = bytes.len(), "Schedule written");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(format!(".tmp{}", std::process::id()));
    PathBuf::from(raw)
}
