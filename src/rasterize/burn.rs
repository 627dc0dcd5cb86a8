use gdal::raster::{rasterize, MergeAlgorithm, RasterizeOptions};
use gdal::vector::ToGdal;
use gdal::{Dataset, DriverManager};

use super::{RasterLayer, Rasterize, RasterizeRequest};
use crate::convert::{filter_null_records, AttributeValues};
use crate::dtype::{minimize_dtype, RasterEncoding};
use crate::error::Result;
use crate::geobox::GridSpec;

const VALUE_BAND: usize = 1;
const MASK_BAND: usize = 2;

/// How overlapping geometries combine in a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeAlg {
    /// The last geometry burned wins.
    #[default]
    Replace,
    /// Values of all geometries covering the cell are summed.
    ///
    /// The sum starts from the first value burned, not from the fill, so a
    /// cell covered once holds exactly that value. Cells no geometry touches
    /// keep the fill. rasterio instead adds onto the fill.
    Add,
}

impl From<MergeAlg> for MergeAlgorithm {
    fn from(merge: MergeAlg) -> Self {
        match merge {
            MergeAlg::Replace => MergeAlgorithm::Replace,
            MergeAlg::Add => MergeAlgorithm::Add,
        }
    }
}

/// Paints each geometry's value onto the pixels it covers.
///
/// Burning goes through GDAL's rasterizer on an in-memory dataset: band one
/// collects the values and band two marks which cells any geometry reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectBurn {
    pub merge: MergeAlg,
    /// Burn every pixel a geometry touches instead of centre-inside only.
    pub all_touched: bool,
    pub filter_null: bool,
    pub encoding: RasterEncoding,
}

impl DirectBurn {
    pub fn new() -> Self {
        Self::default()
    }

    fn options(&self, merge: MergeAlg) -> RasterizeOptions {
        RasterizeOptions {
            all_touched: self.all_touched,
            merge_algorithm: merge.into(),
            ..RasterizeOptions::default()
        }
    }

    /// Burn `values` and a coverage mask, returning both bands row-major.
    fn burn(
        &self,
        grid: &GridSpec,
        geometries: &[gdal::vector::Geometry],
        values: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let driver = DriverManager::get_driver_by_name("MEM")?;
        let mut dataset =
            driver.create_with_band_type::<f64, _>("", grid.width(), grid.height(), 2)?;
        dataset.set_geo_transform(&grid.geo_transform())?;

        rasterize(
            &mut dataset,
            &[VALUE_BAND],
            geometries,
            values,
            Some(self.options(self.merge)),
        )?;
        let ones = vec![1.0; geometries.len()];
        rasterize(
            &mut dataset,
            &[MASK_BAND],
            geometries,
            &ones,
            Some(self.options(MergeAlg::Replace)),
        )?;

        Ok((
            read_band(&dataset, grid, VALUE_BAND)?,
            read_band(&dataset, grid, MASK_BAND)?,
        ))
    }
}

fn read_band(dataset: &Dataset, grid: &GridSpec, index: usize) -> Result<Vec<f64>> {
    let size = (grid.width(), grid.height());
    let buffer = dataset
        .rasterband(index)?
        .read_as::<f64>((0, 0), size, size, None)?;
    Ok(buffer.data().to_vec())
}

impl Rasterize for DirectBurn {
    fn rasterize(&self, request: &RasterizeRequest<'_>) -> Result<Option<RasterLayer>> {
        let AttributeValues::Numeric { dtype, values } = request.values else {
            return Ok(None);
        };
        let grid = request.grid;
        let records = filter_null_records(request.geometries, values, self.filter_null);
        let dtype = minimize_dtype(
            *dtype,
            records.iter().filter_map(|(_, value)| *value),
            request.fill,
            self.encoding,
        );
        if records.is_empty() {
            return Ok(Some(RasterLayer::filled(dtype, grid, request.fill)));
        }
        let null_value = if dtype.is_float() {
            f64::NAN
        } else {
            request.fill
        };

        let mut geometries = Vec::with_capacity(records.len());
        let mut burn_values = Vec::with_capacity(records.len());
        for (geometry, value) in records {
            geometries.push(geometry.to_gdal()?);
            burn_values.push(dtype.cast(value.unwrap_or(null_value)));
        }

        let (burned, mask) = self.burn(grid, &geometries, &burn_values)?;
        let fill = dtype.cast(request.fill);
        let data = burned
            .into_iter()
            .zip(mask)
            .map(|(value, hit)| if hit == 0.0 { fill } else { dtype.cast(value) })
            .collect();
        Ok(Some(RasterLayer::new(dtype, grid, data)))
    }
}
