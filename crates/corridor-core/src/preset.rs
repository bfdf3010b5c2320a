//! Raster presets: schema validation and the preset registry.
//!
//! Presets arrive as JSON documents of the shape
//! `{general: {...}, criteria: {name: {group, weight_values, geometry_values?}}}`.
//! They are parsed into loosely typed raw structs first so that type errors
//! in weights can be reported per criterion, then validated into
//! [`RasterPreset`], which is immutable afterwards.

use crate::error::{AggregationError, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CELL_SIZE: f64 = 10.0;
pub const DEFAULT_TILE_SIZE: usize = 1024;
pub const DEFAULT_BLOCK_SIZE: usize = 256;
pub const DEFAULT_NO_DATA: i32 = -9999;

/// Aggregation semantics of a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Group {
    /// Best-of: cell-wise maximum.
    A,
    /// Additive: cell-wise sum.
    B,
    /// Hard exclusion.
    C,
}

impl FromStr for Group {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Group::A),
            "B" | "b" => Ok(Group::B),
            "C" | "c" => Ok(Group::C),
            other => Err(AggregationError::InvalidGroupValue(other.to_string())),
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Group::A => "A",
            Group::B => "B",
            Group::C => "C",
        };
        f.write_str(tag)
    }
}

/// Inclusive integer value range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: i32,
    pub upper: i32,
}

impl Bounds {
    pub const fn new(lower: i32, upper: i32) -> Self {
        Self { lower, upper }
    }

    pub fn clamp(&self, value: i64) -> i32 {
        value.clamp(self.lower as i64, self.upper as i64) as i32
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.lower as i64 && value <= self.upper as i64
    }
}

/// How raw feature attributes become suitability values.
///
/// Chosen once per criterion when the preset is loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum Reclassifier {
    /// Look the feature's category up in `weight_values`.
    WeightLookup(BTreeMap<String, i32>),
    /// The feature already carries its suitability value.
    PassThrough,
    /// Every feature gets the same value. Used for exclusion criteria
    /// without weights, where presence alone matters.
    Constant(i32),
}

impl Reclassifier {
    pub fn classify(&self, category: Option<&str>, value: Option<i64>) -> Option<i64> {
        match self {
            Reclassifier::WeightLookup(weights) => category
                .and_then(|c| weights.get(c))
                .map(|w| *w as i64)
                .or(value),
            Reclassifier::PassThrough => value,
            Reclassifier::Constant(v) => Some(*v as i64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriterionSpec {
    pub description: String,
    pub layers: Vec<String>,
    pub group: Group,
    pub weight_values: BTreeMap<String, i32>,
    /// Distance in map units around each geometry that is burned as well.
    pub buffer: f64,
    pub reclassifier: Reclassifier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneralSettings {
    pub project_area_geometry: Option<String>,
    pub prefix: String,
    pub final_raster_name: String,
    pub input_source: Option<String>,
    pub cell_size: f64,
    pub tile_size: usize,
    pub block_size: usize,
    pub intermediate_bounds: Bounds,
    pub final_bounds: Bounds,
    pub no_data_value: i32,
    pub fill_value: Option<i32>,
}

impl GeneralSettings {
    /// Base name of persisted outputs: `{prefix}_{final_raster_name}`.
    pub fn output_name(&self) -> String {
        if self.prefix.is_empty() {
            self.final_raster_name.clone()
        } else {
            format!("{}_{}", self.prefix, self.final_raster_name)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterPreset {
    pub general: GeneralSettings,
    pub criteria: BTreeMap<String, CriterionSpec>,
}

#[derive(Debug, Deserialize)]
struct RawPreset {
    general: RawGeneral,
    #[serde(default)]
    criteria: BTreeMap<String, RawCriterion>,
}

#[derive(Debug, Deserialize)]
struct RawGeneral {
    #[serde(default)]
    project_area_geometry: Option<String>,
    #[serde(default)]
    prefix: String,
    #[serde(default = "default_final_raster_name")]
    final_raster_name: String,
    #[serde(default)]
    input_source: Option<String>,
    #[serde(default)]
    cell_size: Option<f64>,
    #[serde(default)]
    tile_size: Option<usize>,
    #[serde(default)]
    block_size: Option<usize>,
    #[serde(default)]
    intermediate_bounds: Option<[i32; 2]>,
    #[serde(default)]
    final_bounds: Option<[i32; 2]>,
    #[serde(default)]
    no_data_value: Option<i32>,
    #[serde(default)]
    fill_value: Option<i32>,
}

fn default_final_raster_name() -> String {
    "suitability".to_string()
}

#[derive(Debug, Deserialize)]
struct RawCriterion {
    group: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    layers: Vec<String>,
    #[serde(default)]
    weight_values: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    geometry_values: BTreeMap<String, serde_json::Value>,
}

impl RasterPreset {
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, SchemaError> {
        let raw: RawPreset = serde_json::from_value(value)?;
        let general = validate_general(raw.general)?;
        let mut criteria = BTreeMap::new();
        for (name, criterion) in raw.criteria {
            let spec = validate_criterion(&name, criterion, &general)?;
            criteria.insert(name, spec);
        }
        Ok(Self { general, criteria })
    }

    pub fn criterion(&self, name: &str) -> Option<&CriterionSpec> {
        self.criteria.get(name)
    }
}

fn validate_general(raw: RawGeneral) -> Result<GeneralSettings, SchemaError> {
    let cell_size = raw.cell_size.unwrap_or(DEFAULT_CELL_SIZE);
    if !cell_size.is_finite() || cell_size <= 0.0 {
        return Err(SchemaError::General {
            name: "cell_size",
            reason: format!("must be a positive number, got {cell_size}"),
        });
    }
    let tile_size = raw.tile_size.unwrap_or(DEFAULT_TILE_SIZE);
    if tile_size == 0 {
        return Err(SchemaError::General {
            name: "tile_size",
            reason: "must be > 0".to_string(),
        });
    }
    let block_size = raw.block_size.unwrap_or(DEFAULT_BLOCK_SIZE).min(tile_size);
    if block_size == 0 {
        return Err(SchemaError::General {
            name: "block_size",
            reason: "must be > 0".to_string(),
        });
    }

    let [il, iu] = raw.intermediate_bounds.unwrap_or([-1000, 1000]);
    if il > iu {
        return Err(SchemaError::InvertedBounds {
            name: "intermediate",
            lower: il,
            upper: iu,
        });
    }
    let [fl, fu] = raw.final_bounds.unwrap_or([1, 100]);
    if fl > fu {
        return Err(SchemaError::InvertedBounds {
            name: "final",
            lower: fl,
            upper: fu,
        });
    }
    if fl < 0 {
        return Err(SchemaError::NegativeFinalBound(fl));
    }
    let final_bounds = Bounds::new(fl, fu);
    let no_data_value = raw.no_data_value.unwrap_or(DEFAULT_NO_DATA);
    if final_bounds.contains(no_data_value as i64) {
        return Err(SchemaError::NoDataCollision {
            value: no_data_value,
            lower: fl,
            upper: fu,
        });
    }
    if let Some(fill) = raw.fill_value {
        if !final_bounds.contains(fill as i64) {
            return Err(SchemaError::General {
                name: "fill_value",
                reason: format!("{fill} lies outside final bounds [{fl}, {fu}]"),
            });
        }
    }

    Ok(GeneralSettings {
        project_area_geometry: raw.project_area_geometry,
        prefix: raw.prefix,
        final_raster_name: raw.final_raster_name,
        input_source: raw.input_source,
        cell_size,
        tile_size,
        block_size,
        intermediate_bounds: Bounds::new(il, iu),
        final_bounds,
        no_data_value,
        fill_value: raw.fill_value,
    })
}

fn validate_criterion(
    name: &str,
    raw: RawCriterion,
    general: &GeneralSettings,
) -> Result<CriterionSpec, SchemaError> {
    let group: Group = raw.group.parse().map_err(|_| SchemaError::InvalidGroup {
        criterion: name.to_string(),
        tag: raw.group.clone(),
    })?;

    let bounds = general.intermediate_bounds;
    let mut weight_values = BTreeMap::new();
    for (category, value) in raw.weight_values {
        let Some(weight) = value.as_i64() else {
            return Err(SchemaError::WeightType {
                criterion: name.to_string(),
                category,
                value: value.to_string(),
            });
        };
        if !bounds.contains(weight) {
            return Err(SchemaError::WeightOutOfRange {
                criterion: name.to_string(),
                category,
                value: weight,
                lower: bounds.lower,
                upper: bounds.upper,
            });
        }
        weight_values.insert(category, weight as i32);
    }

    let mut buffer = 0.0;
    for (key, value) in raw.geometry_values {
        match key.as_str() {
            "buffer" => {
                let distance = value.as_f64().filter(|d| d.is_finite() && *d >= 0.0);
                let Some(distance) = distance else {
                    return Err(SchemaError::GeometryValue {
                        criterion: name.to_string(),
                        key,
                        reason: format!("expected a non-negative number, got {value}"),
                    });
                };
                buffer = distance;
            }
            _ => {
                return Err(SchemaError::GeometryValue {
                    criterion: name.to_string(),
                    key,
                    reason: "unknown adjustment".to_string(),
                });
            }
        }
    }

    let reclassifier = match (weight_values.is_empty(), group) {
        (false, _) => Reclassifier::WeightLookup(weight_values.clone()),
        (true, Group::C) => Reclassifier::Constant(1),
        (true, _) => Reclassifier::PassThrough,
    };

    let layers = if raw.layers.is_empty() {
        vec![name.to_string()]
    } else {
        raw.layers
    };

    Ok(CriterionSpec {
        description: raw.description,
        layers,
        group,
        weight_values,
        buffer,
        reclassifier,
    })
}

/// Named presets available to the engine, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct PresetRegistry {
    presets: BTreeMap<String, RasterPreset>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, preset: RasterPreset) {
        self.presets.insert(name.into(), preset);
    }

    /// Parse and register one JSON preset document.
    pub fn load_json(&mut self, name: impl Into<String>, text: &str) -> Result<(), SchemaError> {
        let preset = RasterPreset::from_json(text)?;
        self.insert(name, preset);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&RasterPreset, SchemaError> {
        self.presets
            .get(name)
            .ok_or_else(|| SchemaError::UnknownPreset(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

/// A preset named in the registry or supplied inline with a request.
#[derive(Debug, Clone)]
pub enum PresetRef {
    Named(String),
    Inline(Box<RasterPreset>),
}
