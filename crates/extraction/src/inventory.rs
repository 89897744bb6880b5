//! Scene inventory: list a product directory and tag each raw file with its
//! scene id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{ExtractionError, ExtractionResult};
use crate::product::ProductSpec;

/// One raw file and the scene it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneFile {
    /// Path relative to the product directory.
    pub path: PathBuf,
    pub scene_id: String,
}

/// Snapshot of a product directory.
#[derive(Debug, Clone)]
pub struct Inventory {
    root: PathBuf,
    files: Vec<SceneFile>,
}

impl Inventory {
    /// List `dir` with the product's listing rule.
    ///
    /// `variable` is the file-name filter of variable-segmented products.
    /// Files that do not yield a scene id are skipped with a warning.
    pub fn scan(dir: &Path, spec: &ProductSpec, variable: Option<&str>) -> ExtractionResult<Self> {
        if spec.listing.matcher.needs_variable() && variable.is_none() {
            return Err(ExtractionError::Config(format!(
                "Product kind {} requires a variable filter",
                spec.kind
            )));
        }
        if !dir.is_dir() {
            return Err(ExtractionError::MissingDirectory(dir.to_path_buf()));
        }

        let mut walker = WalkDir::new(dir).min_depth(1).sort_by_file_name();
        if !spec.listing.recursive {
            walker = walker.max_depth(1);
        }

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                ExtractionError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if !spec.listing.matcher.matches(&name, variable) {
                continue;
            }

            let Some(scene_id) = spec.scene_id(&name) else {
                warn!(file = %entry.path().display(), product = %spec.kind, "No scene id in file name, skipping");
                continue;
            };

            let path = entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.push(SceneFile { path, scene_id });
        }

        debug!(dir = %dir.display(), product = %spec.kind, files = files.len(), "Scanned product directory");
        Ok(Self {
            root: dir.to_path_buf(),
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[SceneFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// One scene id per listed file, duplicates included.
    pub fn scene_ids(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.scene_id.as_str())
    }

    /// Absolute paths of a scene's files, sorted.
    pub fn files_for(&self, scene_id: &str) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|f| f.scene_id == scene_id)
            .map(|f| self.root.join(&f.path))
            .collect();
        paths.sort();
        paths
    }

    /// Files grouped by scene id, in scene order.
    pub fn by_scene(&self) -> BTreeMap<&str, Vec<&SceneFile>> {
        let mut map: BTreeMap<&str, Vec<&SceneFile>> = BTreeMap::new();
        for f in &self.files {
            map.entry(f.scene_id.as_str()).or_default().push(f);
        }
        map
    }
}
