//! Plain-text run logs.
//!
//! Both logs are append-only and use local time stamps formatted
//! `%Y-%m-%d %H:%M:%S`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};

use crate::error::{StoreError, StoreResult};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn append_line(path: &Path, line: &str) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| StoreError::io(path, e))
}

/// One line per successfully written scene.
#[derive(Debug, Clone)]
pub struct ExtractionLog {
    path: PathBuf,
}

impl ExtractionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, scene_id: &str, elapsed: Duration, database: &Path) -> StoreResult<()> {
        append_line(
            &self.path,
            &extraction_line(scene_id, now(), elapsed, database),
        )
    }
}

/// `ID <scene>. Date: <ts>. Process time: <s> s. Database: <path>.`
pub fn extraction_line(
    scene_id: &str,
    at: NaiveDateTime,
    elapsed: Duration,
    database: &Path,
) -> String {
    format!(
        "ID {}. Date: {}. Process time: {} s. Database: {}.\n",
        scene_id,
        at.format(TIMESTAMP_FORMAT),
        elapsed.as_secs_f64().round() as u64,
        database.display()
    )
}

/// One line per raw file removed by the integrity sweep.
#[derive(Debug, Clone)]
pub struct MaintenanceLog {
    path: PathBuf,
}

impl MaintenanceLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_deletion(&self, file: &Path) -> StoreResult<()> {
        append_line(&self.path, &deletion_line(file, now()))
    }
}

/// `File <path> deleted. Date: <ts>`
pub fn deletion_line(file: &Path, at: NaiveDateTime) -> String {
    format!(
        "File {} deleted. Date: {}\n",
        file.display(),
        at.format(TIMESTAMP_FORMAT)
    )
}
