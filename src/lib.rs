pub mod convert;
pub mod crs;
pub mod cube;
pub mod dtype;
pub mod error;
pub mod geobox;
pub mod model;
pub mod output;
pub mod rasterize;
pub mod vector;
pub mod vectorize;
pub mod writer;

pub use crs::{Crs, GdalGeodesy, Geodesy};
pub use cube::{GeoCube, GeocubeOptions};
pub use dtype::{DType, RasterEncoding};
pub use error::{GeocubeError, Result};
pub use geobox::{Align, BoundingGeometry, GridConfig, GridSpec, Resolution};
pub use model::{Column, ColumnData, FeatureCollection, MeasurementKind};
pub use output::{DataVariable, Diagnostic, OutputGrid};
pub use rasterize::{
    DirectBurn, GridData, GridDataMethod, MergeAlg, RadialBasis, RasterLayer, Rasterize,
    RasterizeRequest, RbfFunction,
};
pub use vector::load_vector_data;
pub use vectorize::vectorize;
pub use writer::GeoTiffWriter;

/// Rasterize `features` with the default GDAL reprojection and direct burn-in.
pub fn make_geocube(
    features: &FeatureCollection,
    grid: &GridConfig,
    options: &GeocubeOptions,
) -> Result<OutputGrid> {
    GeoCube::new().make_geocube(features, grid, options)
}
