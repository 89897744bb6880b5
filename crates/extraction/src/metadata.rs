//! Filename rules: which raw files belong to a product and which scene each
//! one belongs to.

/// Which `sep`-separated token of a file name holds the scene id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPosition {
    Nth(usize),
    Last,
}

/// Scene-id rule: pick a token of the file name, then optionally keep only the
/// text after `after` and before `before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneIdRule {
    pub sep: char,
    pub position: TokenPosition,
    pub after: Option<&'static str>,
    pub before: Option<char>,
}

impl SceneIdRule {
    pub const fn token(sep: char, index: usize) -> Self {
        Self {
            sep,
            position: TokenPosition::Nth(index),
            after: None,
            before: None,
        }
    }

    pub const fn last_token(sep: char) -> Self {
        Self {
            sep,
            position: TokenPosition::Last,
            after: None,
            before: None,
        }
    }

    pub const fn after(mut self, marker: &'static str) -> Self {
        self.after = Some(marker);
        self
    }

    pub const fn before(mut self, stop: char) -> Self {
        self.before = Some(stop);
        self
    }

    /// Apply the rule to a bare file name.
    ///
    /// Returns `None` when the token is absent or trims to nothing.
    pub fn scene_id(&self, file_name: &str) -> Option<String> {
        let token = match self.position {
            TokenPosition::Nth(i) => file_name.split(self.sep).nth(i)?,
            TokenPosition::Last => file_name.rsplit(self.sep).next()?,
        };
        let token = match self.after {
            Some(marker) => token.split_once(marker)?.1,
            None => token,
        };
        let token = match self.before {
            Some(stop) => token.split(stop).next().unwrap_or(token),
            None => token,
        };

        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }
}

/// File-name filter of a product listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatcher {
    /// Name ends with the suffix.
    Suffix(&'static str),
    /// Name contains every `required` fragment and no `excluded` one.
    Contains {
        required: &'static [&'static str],
        excluded: &'static [&'static str],
    },
    /// `*_<variable>_*.nc`; the variable comes from product configuration.
    VariableSegment { suffix: &'static str },
}

impl NameMatcher {
    pub fn matches(&self, file_name: &str, variable: Option<&str>) -> bool {
        match self {
            NameMatcher::Suffix(suffix) => file_name.ends_with(suffix),
            NameMatcher::Contains { required, excluded } => {
                required.iter().all(|r| file_name.contains(r))
                    && !excluded.iter().any(|e| file_name.contains(e))
            }
            NameMatcher::VariableSegment { suffix } => match variable {
                Some(var) => {
                    file_name.ends_with(suffix) && file_name.contains(&format!("_{}_", var))
                }
                None => false,
            },
        }
    }

    pub fn needs_variable(&self) -> bool {
        matches!(self, NameMatcher::VariableSegment { .. })
    }
}

/// Restore zero padding lost when an all-digit id was stored as a number.
///
/// `"365"` with width 5 becomes `"00365"`; ids with letters or already at
/// full width are returned unchanged.
pub fn normalize_scene_id(id: &str, width: usize) -> String {
    let id = id.trim();
    if !id.is_empty() && id.len() < width && id.bytes().all(|b| b.is_ascii_digit()) {
        format!("{:0>width$}", id, width = width)
    } else {
        id.to_string()
    }
}
