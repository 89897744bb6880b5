//! Append-only CSV time-series stores.
//!
//! Layout:
//!
//! ```text
//! name_id,date,<catchment_1>,...,<catchment_N>
//! A2020100,2020-04-09,153,NA,...
//! ```
//!
//! Rows are only ever appended. The header fixes the catchment column order
//! for the lifetime of the file.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

pub const SCENE_COLUMN: &str = "name_id";
pub const DATE_COLUMN: &str = "date";

/// One persisted observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRow {
    pub scene_id: String,
    pub date: String,
    pub cells: Vec<Option<i64>>,
}

/// Record counts and coverage for one store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSummary {
    pub records: usize,
    pub first_scene: Option<String>,
    pub last_scene: Option<String>,
    /// Share of non-`NA` rows per catchment, in registry order.
    pub valid_share: Vec<(String, f64)>,
}

/// A loaded store file.
#[derive(Debug, Clone)]
pub struct TimeSeriesStore {
    path: PathBuf,
    catchment_ids: Vec<String>,
    rows: Vec<StoreRow>,
}

impl TimeSeriesStore {
    /// Load `path`, creating it header-only from `catchment_ids` when absent.
    ///
    /// An existing store keeps its own header; callers compare it with the
    /// registry through [`TimeSeriesStore::check_columns`].
    pub fn open_or_create(path: &Path, catchment_ids: &[String]) -> StoreResult<Self> {
        let exists = path.exists()
            && fs::metadata(path)
                .map_err(|e| StoreError::io(path, e))?
                .len()
                > 0;

        if exists {
            return Self::open(path);
        }

        if catchment_ids.is_empty() {
            return Err(StoreError::MissingCatchments(path.to_path_buf()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let header = header_line(catchment_ids);
        fs::write(path, header).map_err(|e| StoreError::io(path, e))?;
        info!(path = %path.display(), catchments = catchment_ids.len(), "Created store");

        Ok(Self {
            path: path.to_path_buf(),
            catchment_ids: catchment_ids.to_vec(),
            rows: Vec::new(),
        })
    }

    /// Load an existing store.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        let mut lines = text.lines().enumerate();

        let header = lines
            .next()
            .map(|(_, l)| l)
            .ok_or_else(|| StoreError::MalformedHeader {
                path: path.to_path_buf(),
                reason: "empty file".into(),
            })?;
        let catchment_ids = parse_header(path, header)?;

        let mut rows = Vec::new();
        for (index, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            // 1-based line numbers, header is line 1
            rows.push(parse_row(path, index + 1, line, catchment_ids.len())?);
        }

        debug!(path = %path.display(), rows = rows.len(), "Loaded store");
        Ok(Self {
            path: path.to_path_buf(),
            catchment_ids,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Catchment ids in column order.
    pub fn catchment_ids(&self) -> &[String] {
        &self.catchment_ids
    }

    pub fn rows(&self) -> &[StoreRow] {
        &self.rows
    }

    /// Scene ids in file order.
    pub fn scene_ids(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.scene_id.clone()).collect()
    }

    pub fn contains_scene(&self, scene_id: &str) -> bool {
        self.rows.iter().any(|r| r.scene_id == scene_id)
    }

    /// Fail unless `ids` equals the store's column order exactly.
    pub fn check_columns<S: AsRef<str>>(&self, ids: &[S]) -> StoreResult<()> {
        if let Some(detail) = column_mismatch(&self.catchment_ids, ids) {
            return Err(StoreError::ColumnOrder {
                path: self.path.clone(),
                detail,
            });
        }
        Ok(())
    }

    /// Open the file for appending. Used to acquire both handles of a pair
    /// before writing either row.
    pub(crate) fn appender(&self) -> StoreResult<File> {
        OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))
    }

    /// Append a row through an already-open handle and record it in memory.
    pub(crate) fn append_with(&mut self, file: &mut File, row: StoreRow) -> StoreResult<()> {
        let line = format_row(&row);
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| StoreError::io(&self.path, e))?;
        self.rows.push(row);
        Ok(())
    }

    /// Record count, first/last scene and per-catchment valid shares.
    pub fn summary(&self) -> StoreSummary {
        let n = self.rows.len();
        let valid_share = self
            .catchment_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let valid = self
                    .rows
                    .iter()
                    .filter(|r| r.cells.get(i).copied().flatten().is_some())
                    .count();
                let share = if n == 0 { 0.0 } else { valid as f64 / n as f64 };
                (id.clone(), share)
            })
            .collect();

        StoreSummary {
            records: n,
            first_scene: self.rows.first().map(|r| r.scene_id.clone()),
            last_scene: self.rows.last().map(|r| r.scene_id.clone()),
            valid_share,
        }
    }
}

/// Describe the first difference between two id sequences.
pub fn column_mismatch<A: AsRef<str>, B: AsRef<str>>(expected: &[A], actual: &[B]) -> Option<String> {
    if expected.len() != actual.len() {
        return Some(format!(
            "expected {} catchments, got {}",
            expected.len(),
            actual.len()
        ));
    }
    expected
        .iter()
        .zip(actual)
        .position(|(a, b)| a.as_ref() != b.as_ref())
        .map(|i| {
            format!(
                "column {} is '{}', extraction has '{}'",
                i + 3,
                expected[i].as_ref(),
                actual[i].as_ref()
            )
        })
}

/// Scene ids that appear more than once, for diagnostics.
pub fn duplicate_scenes(store: &TimeSeriesStore) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dups: Vec<String> = store
        .rows
        .iter()
        .filter(|r| !seen.insert(r.scene_id.as_str()))
        .map(|r| r.scene_id.clone())
        .collect();
    dups.dedup();
    dups
}

fn header_line(ids: &[String]) -> String {
    let mut cols = vec![SCENE_COLUMN.to_string(), DATE_COLUMN.to_string()];
    cols.extend(ids.iter().cloned());
    cols.join(",") + "\n"
}

fn format_row(row: &StoreRow) -> String {
    let mut cols = Vec::with_capacity(row.cells.len() + 2);
    cols.push(row.scene_id.clone());
    cols.push(row.date.clone());
    cols.extend(row.cells.iter().map(|c| zonal::format_cell(*c)));
    cols.join(",") + "\n"
}

fn parse_header(path: &Path, line: &str) -> StoreResult<Vec<String>> {
    let cols: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
    if cols.len() < 3 || cols[0] != SCENE_COLUMN || cols[1] != DATE_COLUMN {
        return Err(StoreError::MalformedHeader {
            path: path.to_path_buf(),
            reason: format!(
                "expected '{},{},<catchment ids>', got '{}'",
                SCENE_COLUMN, DATE_COLUMN, line
            ),
        });
    }
    Ok(cols[2..].iter().map(|s| s.to_string()).collect())
}

fn parse_row(path: &Path, line_no: usize, line: &str, width: usize) -> StoreResult<StoreRow> {
    let malformed = |reason: String| StoreError::MalformedRow {
        path: path.to_path_buf(),
        line: line_no,
        reason,
    };

    let cols: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
    if cols.len() != width + 2 {
        return Err(malformed(format!(
            "{} columns, header has {}",
            cols.len(),
            width + 2
        )));
    }

    let cells = cols[2..]
        .iter()
        .map(|c| parse_cell(c).ok_or_else(|| malformed(format!("invalid cell '{}'", c))))
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(StoreRow {
        scene_id: cols[0].to_string(),
        date: cols[1].to_string(),
        cells,
    })
}

/// Integer, `NA`/empty, or a legacy decimal rounded to the nearest integer.
fn parse_cell(cell: &str) -> Option<Option<i64>> {
    let cell = cell.trim();
    if cell.is_empty() || cell == "NA" {
        return Some(None);
    }
    if let Ok(v) = cell.parse::<i64>() {
        return Some(Some(v));
    }
    cell.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| Some(v.round() as i64))
}
