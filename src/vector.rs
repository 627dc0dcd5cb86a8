//! Loading features from OGR vector sources.

use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDate};
use gdal::vector::{FieldValue, LayerAccess, OGRFieldType};
use gdal::Dataset;
use geo::{Geometry, GeometryCollection};
use tracing::{debug, info};

use crate::crs::Crs;
use crate::dtype::DType;
use crate::error::{GeocubeError, Result};
use crate::model::{Column, ColumnData, FeatureCollection};

/// Attribute column being filled while reading features.
enum Builder {
    Integer(DType, Vec<Option<i64>>),
    Real(Vec<Option<f64>>),
    DateTime(Vec<Option<DateTime<FixedOffset>>>),
    Text(Vec<Option<String>>),
}

impl Builder {
    fn for_field_type(field_type: OGRFieldType::Type) -> Self {
        match field_type {
            OGRFieldType::OFTInteger => Builder::Integer(DType::Int32, Vec::new()),
            OGRFieldType::OFTInteger64 => Builder::Integer(DType::Int64, Vec::new()),
            OGRFieldType::OFTReal => Builder::Real(Vec::new()),
            OGRFieldType::OFTDate | OGRFieldType::OFTDateTime => Builder::DateTime(Vec::new()),
            _ => Builder::Text(Vec::new()),
        }
    }

    fn push(&mut self, value: Option<FieldValue>) {
        match self {
            Builder::Integer(_, values) => values.push(match value {
                Some(FieldValue::IntegerValue(v)) => Some(v as i64),
                Some(FieldValue::Integer64Value(v)) => Some(v),
                _ => None,
            }),
            Builder::Real(values) => values.push(match value {
                Some(FieldValue::RealValue(v)) if !v.is_nan() => Some(v),
                Some(FieldValue::IntegerValue(v)) => Some(v as f64),
                Some(FieldValue::Integer64Value(v)) => Some(v as f64),
                _ => None,
            }),
            Builder::DateTime(values) => values.push(match value {
                Some(FieldValue::DateTimeValue(v)) => Some(v),
                Some(FieldValue::DateValue(d)) => midnight_utc(d),
                _ => None,
            }),
            Builder::Text(values) => values.push(value.map(field_text)),
        }
    }

    fn finish(self) -> ColumnData {
        match self {
            Builder::Integer(dtype, values) => ColumnData::Integer { dtype, values },
            Builder::Real(values) => ColumnData::Real {
                dtype: DType::Float64,
                values,
            },
            Builder::DateTime(values) => ColumnData::DateTime(values),
            Builder::Text(values) => ColumnData::Text(values),
        }
    }
}

fn midnight_utc(date: NaiveDate) -> Option<DateTime<FixedOffset>> {
    let utc = FixedOffset::east_opt(0)?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc().with_timezone(&utc))
}

fn field_text(value: FieldValue) -> String {
    match value {
        FieldValue::StringValue(s) => s,
        FieldValue::IntegerValue(v) => v.to_string(),
        FieldValue::Integer64Value(v) => v.to_string(),
        FieldValue::RealValue(v) => v.to_string(),
        FieldValue::DateValue(d) => d.to_string(),
        FieldValue::DateTimeValue(d) => d.to_rfc3339(),
        FieldValue::StringListValue(list) => list.join(","),
        FieldValue::IntegerListValue(list) => join(&list),
        FieldValue::Integer64ListValue(list) => join(&list),
        FieldValue::RealListValue(list) => join(&list),
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Read the first layer of an OGR data source.
///
/// `measurements` restricts which attribute fields are loaded; all are
/// loaded when it is `None`. Integer fields keep their declared width,
/// date fields become timestamps and other types are read as text.
pub fn load_vector_data(
    path: impl AsRef<Path>,
    measurements: Option<&[String]>,
) -> Result<FeatureCollection> {
    let path = path.as_ref();
    info!("Loading vector data: {:?}", path);
    let dataset = Dataset::open(path)?;
    if dataset.layer_count() == 0 {
        return Err(GeocubeError::vector_data(format!(
            "no layers in {}",
            path.display()
        )));
    }
    let mut layer = dataset.layer(0)?;

    let crs = match layer.spatial_ref() {
        Some(srs) => Some(Crs::new(srs.to_wkt()?)),
        None => None,
    };

    let field_names: Vec<String> = layer.defn().fields().map(|f| f.name()).collect();
    let mut builders: Vec<(String, Builder)> = layer
        .defn()
        .fields()
        .filter(|field| {
            measurements
                .map(|m| m.iter().any(|name| *name == field.name()))
                .unwrap_or(true)
        })
        .map(|field| (field.name(), Builder::for_field_type(field.field_type())))
        .collect();
    if let Some(measurements) = measurements {
        for name in measurements {
            if !field_names.contains(name) {
                return Err(GeocubeError::vector_data(format!(
                    "measurement '{}' not found. Columns in data: {:?}",
                    name, field_names
                )));
            }
        }
    }
    let has_geometry = layer.defn().geom_fields().count() > 0;

    let mut geometries = Vec::new();
    for feature in layer.features() {
        let geometry = match feature.geometry() {
            Some(geometry) => geometry.to_geo()?,
            None => Geometry::GeometryCollection(GeometryCollection::default()),
        };
        geometries.push(geometry);

        for (name, value) in feature.fields() {
            if let Some((_, builder)) = builders.iter_mut().find(|(n, _)| *n == name) {
                builder.push(value);
            }
        }
    }
    debug!("Read {} features from {:?}", geometries.len(), path);

    let columns = builders
        .into_iter()
        .map(|(name, builder)| Column::new(name, builder.finish()))
        .collect();
    if geometries.is_empty() {
        return Err(GeocubeError::vector_data(format!(
            "Empty feature collection. ({})",
            path.display()
        )));
    }
    FeatureCollection::new(crs, has_geometry.then_some(geometries), columns).map_err(|e| match e {
        GeocubeError::VectorData(msg) => {
            GeocubeError::VectorData(format!("{} ({})", msg, path.display()))
        }
        other => other,
    })
}
