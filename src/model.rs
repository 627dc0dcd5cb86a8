use chrono::{DateTime, FixedOffset};
use geo::{BoundingRect, Geometry, Rect};

use crate::crs::{Crs, Geodesy};
use crate::dtype::DType;
use crate::error::{GeocubeError, Result};

/// Label appended to every categorical enumeration for values outside it.
pub const NODATA_CATEGORY: &str = "nodata";

/// Values of one attribute column, one entry per feature.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Integers with the width the source declared (e.g. OGR Integer vs Integer64).
    Integer {
        dtype: DType,
        values: Vec<Option<i64>>,
    },
    Real {
        dtype: DType,
        values: Vec<Option<f64>>,
    },
    Text(Vec<Option<String>>),
    DateTime(Vec<Option<DateTime<FixedOffset>>>),
    /// Labels constrained to a fixed, ordered enumeration.
    Categorical {
        values: Vec<Option<String>>,
        categories: Vec<String>,
    },
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Integer { values, .. } => values.len(),
            ColumnData::Real { values, .. } => values.len(),
            ColumnData::Text(values) => values.len(),
            ColumnData::DateTime(values) => values.len(),
            ColumnData::Categorical { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Semantic kind implied by the column type alone.
    pub fn kind(&self) -> MeasurementKind {
        match self {
            ColumnData::Integer { .. } | ColumnData::Real { .. } => MeasurementKind::Numeric,
            ColumnData::Text(_) => MeasurementKind::Unsupported,
            ColumnData::DateTime(_) => MeasurementKind::Temporal,
            ColumnData::Categorical { .. } => MeasurementKind::Categorical,
        }
    }

    /// Value at `index` rendered as a label; `None` for nulls.
    pub fn label(&self, index: usize) -> Option<String> {
        match self {
            ColumnData::Integer { values, .. } => values[index].map(|v| v.to_string()),
            ColumnData::Real { values, .. } => values[index].map(|v| v.to_string()),
            ColumnData::Text(values) => values[index].clone(),
            ColumnData::DateTime(values) => values[index].map(|v| v.to_rfc3339()),
            ColumnData::Categorical { values, .. } => values[index].clone(),
        }
    }

    /// Re-type the column as categorical over `categories`.
    pub fn to_categorical(&self, categories: Vec<String>) -> ColumnData {
        let values = (0..self.len()).map(|i| self.label(i)).collect();
        ColumnData::Categorical { values, categories }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn real(name: impl Into<String>, values: Vec<f64>) -> Self {
        let values = values
            .into_iter()
            .map(|v| if v.is_nan() { None } else { Some(v) })
            .collect();
        Self::new(
            name,
            ColumnData::Real {
                dtype: DType::Float64,
                values,
            },
        )
    }

    pub fn integer(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self::new(
            name,
            ColumnData::Integer {
                dtype: DType::Int64,
                values: values.into_iter().map(Some).collect(),
            },
        )
    }

    pub fn text<S: Into<String>>(name: impl Into<String>, values: Vec<S>) -> Self {
        Self::new(
            name,
            ColumnData::Text(values.into_iter().map(|v| Some(v.into())).collect()),
        )
    }
}

/// Semantic kind of a measurement, fixed before rasterization starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementKind {
    Numeric,
    Categorical,
    Temporal,
    Unsupported,
}

/// An attribute selected for rasterization.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub name: String,
    pub kind: MeasurementKind,
    pub fill: f64,
    /// Enumeration for categorical measurements, `"nodata"` last.
    pub categories: Option<Vec<String>>,
}

/// Ordered features (geometry + attributes) in one CRS.
#[derive(Debug, Clone)]
pub struct FeatureCollection {
    crs: Crs,
    geometries: Vec<Geometry<f64>>,
    columns: Vec<Column>,
}

impl FeatureCollection {
    /// Build a collection, validating it the same way the file loader does.
    ///
    /// `geometries` is `None` when the source had no geometry column at all.
    /// A missing CRS falls back to EPSG:4326 with a warning.
    pub fn new(
        crs: Option<Crs>,
        geometries: Option<Vec<Geometry<f64>>>,
        columns: Vec<Column>,
    ) -> Result<Self> {
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let geometries = geometries.ok_or_else(|| {
            GeocubeError::vector_data(format!(
                "'geometry' column missing. Columns in data: {:?}",
                names
            ))
        })?;
        if geometries.is_empty() {
            return Err(GeocubeError::vector_data("Empty feature collection."));
        }
        for column in &columns {
            if column.data.len() != geometries.len() {
                return Err(GeocubeError::vector_data(format!(
                    "column '{}' has {} values for {} features",
                    column.name,
                    column.data.len(),
                    geometries.len()
                )));
            }
        }

        let crs = match crs {
            Some(crs) => crs,
            None => {
                tracing::warn!(
                    "Projection not defined in vector data. Setting to geographic (EPSG:4326)."
                );
                Crs::wgs84()
            }
        };

        Ok(Self {
            crs,
            geometries,
            columns,
        })
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn geometries(&self) -> &[Geometry<f64>] {
        &self.geometries
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Replace the data of an existing column.
    pub fn set_column_data(&mut self, name: &str, data: ColumnData) -> Result<()> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| GeocubeError::vector_data(format!("column '{}' not found", name)))?;
        column.data = data;
        Ok(())
    }

    /// Bounding rectangle of all geometries.
    pub fn total_bounds(&self) -> Option<Rect<f64>> {
        self.geometries
            .iter()
            .filter_map(|g| g.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                    geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
                )
            })
    }

    /// Copy of the collection with every geometry reprojected into `target`.
    pub fn to_crs(&self, target: &Crs, geodesy: &dyn Geodesy) -> Result<FeatureCollection> {
        if geodesy.is_same(&self.crs, target)? {
            return Ok(self.clone());
        }
        let geometries = geodesy.transform_all(&self.geometries, &self.crs, target)?;
        Ok(FeatureCollection {
            crs: target.clone(),
            geometries,
            columns: self.columns.clone(),
        })
    }
}
