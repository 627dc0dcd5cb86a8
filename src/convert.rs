//! Normalization of attribute columns into rasterizable numbers.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use geo::Geometry;

use crate::dtype::DType;
use crate::error::{GeocubeError, Result};
use crate::model::{ColumnData, MeasurementKind, NODATA_CATEGORY};

/// Units attached to layers built from timestamps.
pub const TIME_UNITS: &str = "seconds from 1970-01-01T00:00:00";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Attribute values as handed to a rasterization strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValues {
    /// Numbers with the dtype of the source column; nulls are `None`.
    Numeric {
        dtype: DType,
        values: Vec<Option<f64>>,
    },
    /// Values with no numeric encoding; strategies decline these.
    Text(Vec<Option<String>>),
}

impl AttributeValues {
    pub fn len(&self) -> usize {
        match self {
            AttributeValues::Numeric { values, .. } => values.len(),
            AttributeValues::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, AttributeValues::Numeric { .. })
    }

    /// Subset of the values at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> AttributeValues {
        match self {
            AttributeValues::Numeric { dtype, values } => AttributeValues::Numeric {
                dtype: *dtype,
                values: indices.iter().map(|&i| values[i]).collect(),
            },
            AttributeValues::Text(values) => {
                AttributeValues::Text(indices.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }
}

/// What the conversion did, for the layer metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionMeta {
    /// Values are epoch seconds converted from timestamps.
    pub temporal: bool,
    /// Enumeration the codes index into.
    pub categories: Option<Vec<String>>,
}

/// Sorted, de-duplicated labels with the `"nodata"` sentinel appended.
pub fn categorical_enumeration<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let mut categories: Vec<String> = labels
        .iter()
        .map(|s| s.as_ref().to_string())
        .filter(|s| s != NODATA_CATEGORY)
        .collect();
    categories.sort();
    categories.dedup();
    categories.push(NODATA_CATEGORY.to_string());
    categories
}

/// Code of `label` within `categories`.
///
/// Labels outside the enumeration map to the `"nodata"` entry when there
/// is one, otherwise to `-1` like a null.
pub fn encode_category(categories: &[String], label: &str) -> i64 {
    categories
        .iter()
        .position(|c| c == label)
        .or_else(|| categories.iter().position(|c| c == NODATA_CATEGORY))
        .map(|i| i as i64)
        .unwrap_or(-1)
}

/// Label for `code`; codes outside the enumeration decode to `"nodata"`.
pub fn decode_category(categories: &[String], code: i64) -> &str {
    usize::try_from(code)
        .ok()
        .and_then(|i| categories.get(i))
        .map(String::as_str)
        .unwrap_or(NODATA_CATEGORY)
}

/// Seconds since the Unix epoch, in UTC.
pub fn epoch_seconds(timestamp: &DateTime<FixedOffset>) -> f64 {
    timestamp.timestamp() as f64 + timestamp.timestamp_subsec_nanos() as f64 * 1e-9
}

/// Parse a timestamp; values without an offset are taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(epoch_seconds(&timestamp));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            let utc = naive.and_utc();
            return Some(utc.timestamp() as f64 + utc.timestamp_subsec_nanos() as f64 * 1e-9);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp() as f64)
}

fn categorical_code_dtype(categories: &[String]) -> DType {
    DType::smallest_integer(-1.0, categories.len() as f64, true).unwrap_or(DType::Int64)
}

/// Turn one column into numbers a strategy can burn or interpolate.
pub fn normalize(
    name: &str,
    column: &ColumnData,
    kind: MeasurementKind,
) -> Result<(AttributeValues, ConversionMeta)> {
    match kind {
        MeasurementKind::Temporal => {
            let values = temporal_values(name, column)?;
            tracing::warn!(
                "The attribute '{}' was converted from a date to a number ({}) to rasterize it.",
                name,
                TIME_UNITS
            );
            Ok((
                AttributeValues::Numeric {
                    dtype: DType::Float64,
                    values,
                },
                ConversionMeta {
                    temporal: true,
                    categories: None,
                },
            ))
        }
        MeasurementKind::Categorical => {
            let (values, categories) = match column {
                ColumnData::Categorical { values, categories } => (values, categories),
                other => {
                    return Ok((numeric_or_text(other), ConversionMeta::default()));
                }
            };
            let codes = values
                .iter()
                .map(|v| v.as_deref().map(|label| encode_category(categories, label) as f64))
                .collect();
            Ok((
                AttributeValues::Numeric {
                    dtype: categorical_code_dtype(categories),
                    values: codes,
                },
                ConversionMeta {
                    temporal: false,
                    categories: Some(categories.clone()),
                },
            ))
        }
        MeasurementKind::Numeric | MeasurementKind::Unsupported => {
            Ok((numeric_or_text(column), ConversionMeta::default()))
        }
    }
}

fn numeric_or_text(column: &ColumnData) -> AttributeValues {
    match column {
        ColumnData::Integer { dtype, values } => AttributeValues::Numeric {
            dtype: *dtype,
            values: values.iter().map(|v| v.map(|v| v as f64)).collect(),
        },
        ColumnData::Real { dtype, values } => AttributeValues::Numeric {
            dtype: *dtype,
            values: values.clone(),
        },
        ColumnData::DateTime(values) => AttributeValues::Numeric {
            dtype: DType::Float64,
            values: values.iter().map(|v| v.as_ref().map(epoch_seconds)).collect(),
        },
        ColumnData::Text(values) | ColumnData::Categorical { values, .. } => {
            AttributeValues::Text(values.clone())
        }
    }
}

fn temporal_values(name: &str, column: &ColumnData) -> Result<Vec<Option<f64>>> {
    match column {
        ColumnData::DateTime(values) => {
            Ok(values.iter().map(|v| v.as_ref().map(epoch_seconds)).collect())
        }
        ColumnData::Text(values) | ColumnData::Categorical { values, .. } => values
            .iter()
            .map(|v| match v {
                None => Ok(None),
                Some(text) => parse_timestamp(text).map(Some).ok_or_else(|| {
                    GeocubeError::Conversion {
                        measurement: name.to_string(),
                        reason: format!("'{}' is not a recognised timestamp", text),
                    }
                }),
            })
            .collect(),
        // numbers flagged as temporal are already epoch seconds
        ColumnData::Integer { values, .. } => {
            Ok(values.iter().map(|v| v.map(|v| v as f64)).collect())
        }
        ColumnData::Real { values, .. } => Ok(values.clone()),
    }
}

/// Records that survive null filtering, paired with their geometry.
///
/// With `filter_null` unset every record is kept and nulls stay `None`.
pub fn filter_null_records<'a>(
    geometries: &'a [Geometry<f64>],
    values: &'a [Option<f64>],
    filter_null: bool,
) -> Vec<(&'a Geometry<f64>, Option<f64>)> {
    geometries
        .iter()
        .zip(values.iter().copied())
        .filter(|(_, value)| !filter_null || value.is_some_and(|v| !v.is_nan()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo::point;

    fn labels(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn test_enumeration_is_sorted_with_sentinel() {
        let categories = categorical_enumeration(&["sand", "silt", "clay", "sand"]);
        assert_eq!(categories, vec!["clay", "sand", "silt", "nodata"]);
    }

    #[test]
    fn test_categorical_round_trip() {
        let categories = categorical_enumeration(&["sand", "silt", "clay"]);
        let column = ColumnData::Categorical {
            values: labels(&["sand", "silt", "clay", "frank"]),
            categories: categories.clone(),
        };
        let (values, meta) = normalize("soil", &column, MeasurementKind::Categorical).unwrap();
        let AttributeValues::Numeric { dtype, values } = values else {
            panic!("categorical codes must be numeric");
        };
        assert_eq!(dtype, DType::Int8);
        assert_eq!(values, vec![Some(1.0), Some(2.0), Some(0.0), Some(3.0)]);
        assert_eq!(meta.categories.as_deref(), Some(categories.as_slice()));

        let decoded: Vec<&str> = values
            .iter()
            .map(|v| decode_category(&categories, v.unwrap() as i64))
            .collect();
        assert_eq!(decoded, vec!["sand", "silt", "clay", "nodata"]);
        assert_eq!(decode_category(&categories, 42), "nodata");
    }

    #[test]
    fn test_categorical_null_stays_null() {
        let column = ColumnData::Categorical {
            values: vec![None, Some("a".into())],
            categories: categorical_enumeration(&["a"]),
        };
        let (values, _) = normalize("c", &column, MeasurementKind::Categorical).unwrap();
        assert_eq!(
            values,
            AttributeValues::Numeric {
                dtype: DType::Int8,
                values: vec![None, Some(0.0)],
            }
        );
    }

    #[test]
    fn test_temporal_conversion_to_epoch_seconds() {
        let offset = FixedOffset::east_opt(3600).unwrap();
        let column = ColumnData::DateTime(vec![
            Some(offset.with_ymd_and_hms(1970, 1, 1, 1, 0, 30).unwrap()),
            None,
        ]);
        let (values, meta) = normalize("t", &column, MeasurementKind::Temporal).unwrap();
        assert!(meta.temporal);
        assert_eq!(
            values,
            AttributeValues::Numeric {
                dtype: DType::Float64,
                values: vec![Some(30.0), None],
            }
        );
    }

    #[test]
    fn test_temporal_text_is_parsed() {
        let column = ColumnData::Text(labels(&[
            "2020-01-01T00:00:00Z",
            "2020-01-01 00:00:10",
            "2020-01-02",
        ]));
        let (values, _) = normalize("t", &column, MeasurementKind::Temporal).unwrap();
        let AttributeValues::Numeric { values, .. } = values else {
            panic!("expected numbers");
        };
        assert_eq!(
            values,
            vec![
                Some(1_577_836_800.0),
                Some(1_577_836_810.0),
                Some(1_577_923_200.0)
            ]
        );
    }

    #[test]
    fn test_temporal_garbage_is_an_error() {
        let column = ColumnData::Text(labels(&["yesterday"]));
        let err = normalize("t", &column, MeasurementKind::Temporal).unwrap_err();
        assert!(matches!(err, GeocubeError::Conversion { .. }));
    }

    #[test]
    fn test_text_is_not_numeric() {
        let column = ColumnData::Text(labels(&["a"]));
        let (values, _) = normalize("t", &column, MeasurementKind::Unsupported).unwrap();
        assert!(!values.is_numeric());
    }

    #[test]
    fn test_filter_null_records() {
        let geoms = vec![
            Geometry::Point(point!(x: 0.0, y: 0.0)),
            Geometry::Point(point!(x: 1.0, y: 0.0)),
            Geometry::Point(point!(x: 2.0, y: 0.0)),
        ];
        let values = vec![Some(1.0), None, Some(f64::NAN)];
        assert_eq!(filter_null_records(&geoms, &values, true).len(), 1);
        assert_eq!(filter_null_records(&geoms, &values, false).len(), 3);
    }
}
