//! Run configuration for the extractor.
//!
//! Loaded from a YAML file with `${VAR}` and `${VAR:-default}` environment
//! substitution, then validated. Every path the pipeline touches comes from
//! one [`ExtractorConfig`].
//!
//! ```yaml
//! catchments:
//!   path: ${DATA_DIR}/catchments.geojson
//!   id_property: gauge_id
//! maintenance_log: logs/maintainer.txt
//! products:
//!   - name: modis_ndvi
//!     kind: modis
//!     dir: ${DATA_DIR}/raw/MOD13Q1
//!     variables:
//!       - name: ndvi
//!         value_store: db/ndvi_mean.csv
//!         fraction_store: db/ndvi_pc.csv
//!         log: logs/ndvi.txt
//!         transform: { type: mosaic, layer: "250m 16 days NDVI", rescale: { scale: 0.1 } }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use hydro_common::BoundingBox;
use zonal::Reducer;

use crate::error::{ExtractionError, ExtractionResult};
use crate::product::{ProductKind, ProductSpec};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub catchments: CatchmentSource,
    /// Root for per-batch scratch directories; system temp dir when unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    pub maintenance_log: PathBuf,
    /// Per-scene zonal tables are copied here as CSV when set.
    #[serde(default)]
    pub debug_dir: Option<PathBuf>,
    pub products: Vec<ProductConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchmentSource {
    pub path: PathBuf,
    #[serde(default = "default_id_property")]
    pub id_property: String,
}

fn default_id_property() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub name: String,
    pub kind: ProductKind,
    pub dir: PathBuf,
    /// Region of interest; decoded grids are cropped to it.
    #[serde(default)]
    pub region: Option<BoundingBox>,
    /// Raw value treated as missing on decode.
    #[serde(default)]
    pub nodata: Option<f32>,
    /// GFS variable segment of the file names (`gfs_<variable>_<run>.nc`).
    #[serde(default)]
    pub variable: Option<String>,
    pub variables: Vec<VariableConfig>,
}

impl ProductConfig {
    pub fn spec(&self) -> ProductSpec {
        self.kind.spec()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableConfig {
    pub name: String,
    pub value_store: PathBuf,
    pub fraction_store: PathBuf,
    /// Extraction log, one line per recorded scene.
    pub log: PathBuf,
    pub transform: TransformConfig,
    /// Zonal aggregate over each catchment's pixels.
    #[serde(default)]
    pub reducer: Reducer,
}

/// How a scene's rasters become the variable's analysis grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum TransformConfig {
    /// Spatial mosaic of every tile, first valid value wins.
    Mosaic {
        #[serde(default)]
        layer: Option<String>,
        #[serde(default)]
        steps: Option<StepSelection>,
        #[serde(default)]
        valid_range: Option<ValueRange>,
        /// Replaces pixels that are missing or outside `valid_range`.
        #[serde(default)]
        fill: Option<f32>,
        #[serde(default)]
        rescale: Rescale,
    },
    /// `1000 * (a - b) / (a + b)` per tile, then mosaic.
    NormalizedDifference { a: String, b: String },
    /// Per-pixel reduction over every time step of the scene.
    Accumulate {
        /// Each layer is reduced, then the layers are summed.
        #[serde(default)]
        layers: Vec<String>,
        #[serde(default)]
        steps: Option<StepSelection>,
        #[serde(default = "default_accumulate_reducer")]
        reducer: Reducer,
        #[serde(default)]
        rescale: Rescale,
    },
    /// Hours spent above a depth threshold.
    EventLength {
        #[serde(default)]
        layer: Option<String>,
        #[serde(default)]
        steps: Option<StepSelection>,
        /// Multiplier turning a raw value into a depth.
        depth_factor: f64,
        threshold: f64,
        /// Consecutive steps summed into one interval.
        #[serde(default = "default_group")]
        group: usize,
        interval_hours: f64,
        #[serde(default)]
        rescale: Rescale,
    },
    /// Share of a land-cover class.
    ClassFraction {
        #[serde(default)]
        layer: Option<String>,
        class: f32,
        #[serde(default = "default_class_scale")]
        scale: f64,
    },
}

fn default_accumulate_reducer() -> Reducer {
    Reducer::Sum
}

fn default_group() -> usize {
    1
}

fn default_class_scale() -> f64 {
    1000.0
}

impl TransformConfig {
    /// Layers decoded by this transform, `None` for a file's only layer.
    pub fn layers(&self) -> Vec<Option<String>> {
        match self {
            TransformConfig::Mosaic { layer, .. }
            | TransformConfig::EventLength { layer, .. }
            | TransformConfig::ClassFraction { layer, .. } => vec![layer.clone()],
            TransformConfig::NormalizedDifference { a, b } => {
                vec![Some(a.clone()), Some(b.clone())]
            }
            TransformConfig::Accumulate { layers, .. } if layers.is_empty() => vec![None],
            TransformConfig::Accumulate { layers, .. } => {
                layers.iter().cloned().map(Some).collect()
            }
        }
    }

    /// Step subset applied to each file's decode.
    pub fn steps(&self) -> Option<&StepSelection> {
        match self {
            TransformConfig::Mosaic { steps, .. }
            | TransformConfig::Accumulate { steps, .. }
            | TransformConfig::EventLength { steps, .. } => steps.as_ref(),
            TransformConfig::NormalizedDifference { .. } | TransformConfig::ClassFraction { .. } => {
                None
            }
        }
    }
}

/// Subset of the steps each file decodes to.
///
/// NetCDF variables flatten every leading dimension into steps, so a
/// `(time, level)` variable with two levels keeps level 2 with
/// `{ start: 1, stride: 2 }`, and lead day `d` of a 3-hourly GFS run
/// (first step at +3 h) is `{ start: 8 * d, count: 8 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSelection {
    #[serde(default)]
    pub start: usize,
    #[serde(default = "default_stride")]
    pub stride: usize,
    /// Upper bound on selected steps; all remaining when unset.
    #[serde(default)]
    pub count: Option<usize>,
}

fn default_stride() -> usize {
    1
}

impl StepSelection {
    /// Steps at `start, start + stride, ...`, at most `count` of them.
    pub fn select<T: Clone>(&self, steps: &[T]) -> Vec<T> {
        steps
            .iter()
            .skip(self.start)
            .step_by(self.stride.max(1))
            .take(self.count.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

/// Inclusive bounds of plausible raw values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueRange {
    #[serde(default)]
    pub min: Option<f32>,
    #[serde(default)]
    pub max: Option<f32>,
}

impl ValueRange {
    pub fn contains(&self, v: f32) -> bool {
        self.min.map_or(true, |m| v >= m) && self.max.map_or(true, |m| v <= m)
    }
}

/// Linear rescale `(v + offset) * scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rescale {
    #[serde(default)]
    pub offset: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for Rescale {
    fn default() -> Self {
        Self {
            offset: 0.0,
            scale: 1.0,
        }
    }
}

impl Rescale {
    pub fn is_identity(&self) -> bool {
        self.offset == 0.0 && self.scale == 1.0
    }

    pub fn apply(&self, v: f32) -> f32 {
        ((v as f64 + self.offset) * self.scale) as f32
    }
}

impl ExtractorConfig {
    /// Read, expand and validate a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> ExtractionResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ExtractionError::io(path, e))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ExtractionResult<Self> {
        let expanded = expand_env_vars(content)?;
        let config: ExtractorConfig = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ExtractionResult<()> {
        ensure(!self.products.is_empty(), || "No products configured".to_string())?;

        let mut product_names = HashSet::new();
        let mut stores = HashSet::new();

        for product in &self.products {
            ensure(product_names.insert(product.name.as_str()), || {
                format!("Duplicate product name '{}'", product.name)
            })?;
            ensure(product.region.map_or(true, |r| r.is_valid()), || {
                format!("Product '{}': region min exceeds max", product.name)
            })?;
            ensure(!product.variables.is_empty(), || {
                format!("Product '{}' has no variables", product.name)
            })?;
            ensure(
                !product.spec().listing.matcher.needs_variable() || product.variable.is_some(),
                || {
                    format!(
                        "Product '{}' of kind {} requires a 'variable' file filter",
                        product.name, product.kind
                    )
                },
            )?;

            let mut variable_names = HashSet::new();
            for var in &product.variables {
                ensure(variable_names.insert(var.name.as_str()), || {
                    format!("Duplicate variable '{}' in product '{}'", var.name, product.name)
                })?;
                ensure(var.value_store != var.fraction_store, || {
                    format!("Variable '{}' uses one file for both stores", var.name)
                })?;
                for store in [&var.value_store, &var.fraction_store] {
                    ensure(stores.insert(store.clone()), || {
                        format!("Store {} is bound to more than one variable", store.display())
                    })?;
                }
                validate_transform(&var.name, &var.transform)?;
            }
        }
        Ok(())
    }

    pub fn product(&self, name: &str) -> ExtractionResult<&ProductConfig> {
        self.products
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ExtractionError::Config(format!("Unknown product '{}'", name)))
    }

    /// One product by name, or all of them.
    pub fn select(&self, name: Option<&str>) -> ExtractionResult<Vec<&ProductConfig>> {
        match name {
            Some(name) => Ok(vec![self.product(name)?]),
            None => Ok(self.products.iter().collect()),
        }
    }
}

fn validate_transform(variable: &str, transform: &TransformConfig) -> ExtractionResult<()> {
    if let Some(sel) = transform.steps() {
        ensure(sel.stride > 0 && sel.count != Some(0), || {
            format!("Variable '{}': steps selects nothing", variable)
        })?;
    }
    match transform {
        TransformConfig::EventLength {
            group,
            interval_hours,
            ..
        } => {
            ensure(*group > 0, || format!("Variable '{}': group must be at least 1", variable))?;
            ensure(*interval_hours > 0.0, || {
                format!("Variable '{}': interval_hours must be positive", variable)
            })
        }
        TransformConfig::Mosaic {
            valid_range: Some(ValueRange { min: Some(lo), max: Some(hi) }),
            ..
        } => ensure(lo <= hi, || {
            format!("Variable '{}': valid_range min exceeds max", variable)
        }),
        _ => Ok(()),
    }
}

fn ensure(cond: bool, msg: impl FnOnce() -> String) -> ExtractionResult<()> {
    if cond {
        Ok(())
    } else {
        Err(ExtractionError::Config(msg()))
    }
}

/// Expand `${VAR}` and `${VAR:-default}` references.
///
/// Comment lines (first non-blank character `#`) are copied untouched.
pub fn expand_env_vars(content: &str) -> ExtractionResult<String> {
    let mut result = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
        } else {
            expand_line(line, &mut result)?;
        }
    }
    Ok(result)
}

fn expand_line(line: &str, result: &mut String) -> ExtractionResult<()> {
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_expr = String::new();
            let mut depth = 1;

            while depth > 0 {
                match chars.next() {
                    Some('{') => {
                        depth += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        depth -= 1;
                        if depth > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => {
                        return Err(ExtractionError::Config(format!(
                            "Unclosed variable substitution: ${{{}",
                            var_expr.trim_end()
                        )))
                    }
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(())
}

fn resolve_var_expr(expr: &str) -> ExtractionResult<String> {
    if let Some((name, default)) = expr.split_once(":-") {
        match std::env::var(name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).map_err(|_| {
            ExtractionError::Config(format!("Environment variable {} not set", expr.trim()))
        })
    }
}
