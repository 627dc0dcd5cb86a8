//! Pluggable strategies turning (geometry, value) records into one layer.

mod burn;
mod griddata;
mod radial;

use geo::{Centroid, Coord, Geometry};

pub use burn::{DirectBurn, MergeAlg};
pub use griddata::{griddata, GridData, GridDataMethod, ScatteredPoint};
pub use radial::{RadialBasis, RbfFunction};

use crate::convert::{filter_null_records, AttributeValues};
use crate::dtype::DType;
use crate::error::Result;
use crate::geobox::{GridCoords, GridSpec};

/// Everything a strategy needs to produce one layer.
#[derive(Debug, Clone, Copy)]
pub struct RasterizeRequest<'a> {
    pub geometries: &'a [Geometry<f64>],
    pub values: &'a AttributeValues,
    pub grid: &'a GridSpec,
    pub fill: f64,
    pub coords: &'a GridCoords,
}

/// One 2D layer on a grid, row-major from the top-left pixel.
///
/// Cells are kept as `f64` already rounded to what `dtype` can store.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub dtype: DType,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f64>,
}

impl RasterLayer {
    pub fn new(dtype: DType, grid: &GridSpec, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), grid.len());
        Self {
            dtype,
            height: grid.height(),
            width: grid.width(),
            data,
        }
    }

    pub fn filled(dtype: DType, grid: &GridSpec, fill: f64) -> Self {
        Self::new(dtype, grid, vec![dtype.cast(fill); grid.len()])
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.width + col]
    }
}

/// A rasterization strategy.
///
/// `Ok(None)` means the values cannot be rasterized (they are not
/// numeric) and the measurement should be skipped. Closures with the
/// same signature are strategies too.
pub trait Rasterize: Send + Sync {
    fn rasterize(&self, request: &RasterizeRequest<'_>) -> Result<Option<RasterLayer>>;
}

impl<F> Rasterize for F
where
    F: Fn(&RasterizeRequest<'_>) -> Result<Option<RasterLayer>> + Send + Sync,
{
    fn rasterize(&self, request: &RasterizeRequest<'_>) -> Result<Option<RasterLayer>> {
        self(request)
    }
}

/// Representative location of a geometry for point interpolators.
fn representative_point(geometry: &Geometry<f64>) -> Option<Coord<f64>> {
    match geometry {
        Geometry::Point(point) => Some(point.0),
        other => other.centroid().map(|p| p.0),
    }
}

/// Records of a request as scattered points, or `None` for non-numeric values.
///
/// Unfiltered nulls become NaN samples.
fn scattered_points(
    request: &RasterizeRequest<'_>,
    filter_null: bool,
) -> Option<(DType, Vec<ScatteredPoint>)> {
    let AttributeValues::Numeric { dtype, values } = request.values else {
        return None;
    };
    let points = filter_null_records(request.geometries, values, filter_null)
        .into_iter()
        .filter_map(|(geometry, value)| {
            representative_point(geometry).map(|position| ScatteredPoint {
                position,
                value: value.unwrap_or(f64::NAN),
            })
        })
        .collect();
    Some((*dtype, points))
}
