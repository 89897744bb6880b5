//! Completeness classification of scenes by file count.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

/// Scenes partitioned by file count, each list sorted ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub complete: Vec<String>,
    pub incomplete: Vec<String>,
    pub overpopulated: Vec<String>,
}

impl Classification {
    /// Log incomplete and overpopulated scenes.
    pub fn report(&self, product: &str) {
        if !self.incomplete.is_empty() {
            warn!(
                product = %product,
                count = self.incomplete.len(),
                scenes = ?self.incomplete,
                "Incomplete scenes waiting for files"
            );
        }
        if !self.overpopulated.is_empty() {
            warn!(
                product = %product,
                count = self.overpopulated.len(),
                scenes = ?self.overpopulated,
                "Overpopulated scenes, check for duplicate downloads"
            );
        }
    }
}

/// Count occurrences of each scene id and compare with `expected`.
pub fn classify<'a, I>(scene_ids: I, expected: usize) -> Classification
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for id in scene_ids {
        *counts.entry(id).or_default() += 1;
    }

    let mut out = Classification::default();
    for (id, n) in counts {
        let bucket = match n.cmp(&expected) {
            std::cmp::Ordering::Equal => &mut out.complete,
            std::cmp::Ordering::Less => &mut out.incomplete,
            std::cmp::Ordering::Greater => &mut out.overpopulated,
        };
        bucket.push(id.to_string());
    }
    out
}
