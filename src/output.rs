//! The assembled multi-layer grid.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;

use crate::crs::Crs;
use crate::dtype::DType;
use crate::geobox::{Affine, GridCoords, GridSpec};
use crate::model::ColumnData;

/// Name of the grid-mapping variable every layer refers to.
pub const GRID_MAPPING: &str = "spatial_ref";

/// One value of the group column.
#[derive(Debug, Clone)]
pub enum GroupLabel {
    Integer(i64),
    Real(f64),
    DateTime(DateTime<FixedOffset>),
    Text(String),
}

impl GroupLabel {
    /// Label of record `index` in `data`; `None` for nulls.
    pub fn from_column(data: &ColumnData, index: usize) -> Option<GroupLabel> {
        match data {
            ColumnData::Integer { values, .. } => values[index].map(GroupLabel::Integer),
            ColumnData::Real { values, .. } => values[index]
                .filter(|v| !v.is_nan())
                .map(GroupLabel::Real),
            ColumnData::DateTime(values) => values[index].map(GroupLabel::DateTime),
            ColumnData::Text(values) | ColumnData::Categorical { values, .. } => {
                values[index].clone().map(GroupLabel::Text)
            }
        }
    }

    fn rank(&self) -> u8 {
        match self {
            GroupLabel::Integer(_) | GroupLabel::Real(_) => 0,
            GroupLabel::DateTime(_) => 1,
            GroupLabel::Text(_) => 2,
        }
    }
}

impl Ord for GroupLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (GroupLabel::Integer(a), GroupLabel::Integer(b)) => a.cmp(b),
            (GroupLabel::Integer(a), GroupLabel::Real(b)) => (*a as f64).total_cmp(b),
            (GroupLabel::Real(a), GroupLabel::Integer(b)) => a.total_cmp(&(*b as f64)),
            (GroupLabel::Real(a), GroupLabel::Real(b)) => a.total_cmp(b),
            (GroupLabel::DateTime(a), GroupLabel::DateTime(b)) => a.cmp(b),
            (GroupLabel::Text(a), GroupLabel::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for GroupLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for GroupLabel {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupLabel {}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupLabel::Integer(v) => write!(f, "{}", v),
            GroupLabel::Real(v) => write!(f, "{}", v),
            GroupLabel::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            GroupLabel::Text(v) => f.write_str(v),
        }
    }
}

/// The stacking axis of a grouped cube.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAxis {
    pub name: String,
    pub labels: Vec<GroupLabel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableAttrs {
    pub name: String,
    pub long_name: String,
    pub fill_value: f64,
    pub grid_mapping: String,
    pub units: Option<String>,
    /// Name of the side table holding the category labels.
    pub categorical_mapping: Option<String>,
}

impl VariableAttrs {
    pub fn new(name: &str, fill_value: f64) -> Self {
        Self {
            name: name.to_string(),
            long_name: name.to_string(),
            fill_value,
            grid_mapping: GRID_MAPPING.to_string(),
            units: None,
            categorical_mapping: None,
        }
    }

    /// Whether `value` is this variable's no-data marker.
    pub fn is_nodata(&self, value: f64) -> bool {
        if self.fill_value.is_nan() {
            value.is_nan()
        } else {
            value == self.fill_value
        }
    }
}

/// One measurement on the grid, `[y, x]` or `[group, y, x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataVariable {
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
    pub dtype: DType,
    /// Row-major cells, one `height * width` slice per group.
    pub data: Vec<f64>,
    pub attrs: VariableAttrs,
}

impl DataVariable {
    pub fn slice_len(&self) -> usize {
        self.shape.iter().rev().take(2).product()
    }

    pub fn num_slices(&self) -> usize {
        if self.shape.len() > 2 {
            self.shape[0]
        } else {
            1
        }
    }

    pub fn slice(&self, index: usize) -> &[f64] {
        let len = self.slice_len();
        &self.data[index * len..(index + 1) * len]
    }

    pub fn slices(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.slice_len().max(1))
    }

    /// Cell at `(row, col)` of an ungrouped variable.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.get_grouped(0, row, col)
    }

    pub fn get_grouped(&self, group: usize, row: usize, col: usize) -> f64 {
        let width = self.shape[self.shape.len() - 1];
        self.slice(group)[row * width + col]
    }
}

/// A measurement that could not be rasterized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub measurement: String,
    pub message: String,
}

/// Geo-referenced layers sharing one grid.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputGrid {
    pub grid: GridSpec,
    pub coords: GridCoords,
    pub group_axis: Option<GroupAxis>,
    /// Layers in request order.
    pub variables: IndexMap<String, DataVariable>,
    /// `<name>_categories` side tables.
    pub categories: IndexMap<String, Vec<String>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl OutputGrid {
    pub fn crs(&self) -> &Crs {
        self.grid.crs()
    }

    pub fn transform(&self) -> &Affine {
        self.grid.transform()
    }

    pub fn variable(&self, name: &str) -> Option<&DataVariable> {
        self.variables.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Category labels of a categorical variable.
    pub fn categories_of(&self, name: &str) -> Option<&[String]> {
        let mapping = self.variables.get(name)?.attrs.categorical_mapping.as_ref()?;
        self.categories.get(mapping).map(Vec::as_slice)
    }
}
