//! Incremental work-set resolution: complete scenes not yet recorded.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use ts_store::TimeSeriesStore;

use crate::error::ExtractionResult;
use crate::metadata::normalize_scene_id;

/// Scene ids already present in a variable's value store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedScenes {
    ids: BTreeSet<String>,
}

impl RecordedScenes {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Read the scene column of a store; a missing or empty file records
    /// nothing.
    pub fn load(store: &Path) -> ExtractionResult<Self> {
        if !has_content(store) {
            return Ok(Self::default());
        }
        let store = TimeSeriesStore::open(store)?;
        Ok(Self::new(store.scene_ids()))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `scene_id` is recorded, comparing padded forms.
    pub fn contains(&self, scene_id: &str, width: usize) -> bool {
        let wanted = normalize_scene_id(scene_id, width);
        self.ids
            .iter()
            .any(|id| normalize_scene_id(id, width) == wanted)
    }

    /// Ids with zero padding restored to `width`.
    pub fn normalized(&self, width: usize) -> BTreeSet<String> {
        self.ids
            .iter()
            .map(|id| normalize_scene_id(id, width))
            .collect()
    }
}

/// True for an existing, non-empty file.
pub(crate) fn has_content(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// `complete − recorded`, ascending.
pub fn work_set(complete: &[String], recorded: &RecordedScenes, id_width: usize) -> Vec<String> {
    let recorded = recorded.normalized(id_width);
    let mut out: Vec<String> = complete
        .iter()
        .filter(|id| !recorded.contains(normalize_scene_id(id, id_width).as_str()))
        .cloned()
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Union of the variables' work sets, ascending.
pub fn job_work_set(
    complete: &[String],
    recorded: &[RecordedScenes],
    id_width: usize,
) -> Vec<String> {
    let set: BTreeSet<String> = recorded
        .iter()
        .flat_map(|r| work_set(complete, r, id_width))
        .collect();
    set.into_iter().collect()
}
