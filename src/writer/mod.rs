use anyhow::{bail, Context, Result};
use gdal::raster::{Buffer, GdalType};
use gdal::{Dataset, DriverManager, Metadata};
use std::path::{Path, PathBuf};

use crate::crs::Crs;
use crate::dtype::DType;
use crate::geobox::{Affine, GridSpec};
use crate::output::{DataVariable, OutputGrid};

/// Cell types a band can be written with.
trait BandValue: GdalType + Copy {
    fn from_cell(value: f64) -> Self;
}

macro_rules! band_value {
    ($($t:ty),*) => {
        $(impl BandValue for $t {
            fn from_cell(value: f64) -> Self {
                value as $t
            }
        })*
    };
}

band_value!(u8, u16, i16, u32, i32, f32, f64);

/// Writes each variable of an [`OutputGrid`] to `<name>.tif`.
#[derive(Default)]
pub struct GeoTiffWriter {}

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self {}
    }

    /// Write every variable into `output_dir`, returning the files created.
    pub fn write(&self, cube: &OutputGrid, output_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create {:?}", output_dir))?;
        let wkt = cube
            .crs()
            .to_wkt()
            .with_context(|| format!("Failed to convert {} to WKT", cube.crs()))?;

        let mut written = Vec::new();
        for (name, variable) in &cube.variables {
            if variable.num_slices() == 0 {
                tracing::warn!("Not writing '{}': no groups", name);
                continue;
            }
            let path = output_dir.join(format!("{}.tif", name));
            let dtype = storage_dtype(variable.dtype);
            match dtype {
                DType::UInt8 => self.write_variable::<u8>(cube, variable, dtype, &wkt, &path)?,
                DType::Int16 => self.write_variable::<i16>(cube, variable, dtype, &wkt, &path)?,
                DType::UInt16 => self.write_variable::<u16>(cube, variable, dtype, &wkt, &path)?,
                DType::UInt32 => self.write_variable::<u32>(cube, variable, dtype, &wkt, &path)?,
                DType::Int32 => self.write_variable::<i32>(cube, variable, dtype, &wkt, &path)?,
                DType::Float32 => self.write_variable::<f32>(cube, variable, dtype, &wkt, &path)?,
                _ => self.write_variable::<f64>(cube, variable, dtype, &wkt, &path)?,
            }
            tracing::info!("Written GeoTIFF: {:?}", path);
            written.push(path);
        }
        Ok(written)
    }

    fn write_variable<T: BandValue>(
        &self,
        cube: &OutputGrid,
        variable: &DataVariable,
        dtype: DType,
        wkt: &str,
        output_path: &Path,
    ) -> Result<()> {
        let driver =
            DriverManager::get_driver_by_name("GTiff").context("Failed to get GTiff driver")?;

        let (rows, cols) = cube.grid.shape();
        let bands = variable.num_slices();
        let mut dataset = driver
            .create_with_band_type::<T, _>(output_path, cols, rows, bands)
            .context("Failed to create dataset")?;

        dataset
            .set_geo_transform(&cube.grid.geo_transform())
            .context("Failed to set geo transform")?;
        dataset
            .set_projection(wkt)
            .context("Failed to set projection")?;

        let labels: Vec<String> = cube
            .group_axis
            .as_ref()
            .map(|axis| axis.labels.iter().map(|l| l.to_string()).collect())
            .unwrap_or_default();

        for (index, slice) in variable.slices().enumerate() {
            let mut band = dataset
                .rasterband(index + 1)
                .with_context(|| format!("Failed to get raster band {}", index + 1))?;
            band.set_no_data_value(Some(variable.attrs.fill_value))
                .context("Failed to set no data value")?;
            if let Some(label) = labels.get(index) {
                band.set_description(label)
                    .context("Failed to set band description")?;
            }
            let cells = slice.iter().map(|v| T::from_cell(*v)).collect();
            let mut buffer = Buffer::new((cols, rows), cells);
            band.write((0, 0), (cols, rows), &mut buffer)
                .context("Failed to write raster data")?;
        }

        let attrs = &variable.attrs;
        let mut items = vec![
            ("NAME", attrs.name.clone()),
            ("LONG_NAME", attrs.long_name.clone()),
            ("DTYPE", dtype.to_string()),
            ("GRID_MAPPING", attrs.grid_mapping.clone()),
        ];
        if let Some(units) = &attrs.units {
            items.push(("UNITS", units.clone()));
        }
        if let Some(mapping) = &attrs.categorical_mapping {
            items.push(("CATEGORICAL_MAPPING", mapping.clone()));
            if let Some(categories) = cube.categories.get(mapping) {
                items.push(("CATEGORIES", categories.join(",")));
            }
        }
        if let Some(axis) = &cube.group_axis {
            items.push(("GROUP_BY", axis.name.clone()));
            items.push(("GROUPS", labels.join(",")));
        }
        for (key, value) in items {
            dataset
                .set_metadata_item(key, &value, "")
                .with_context(|| format!("Failed to set {} metadata", key))?;
        }

        Ok(())
    }
}

/// Band type a layer of `dtype` is stored as.
///
/// int8 goes out as int16 and 64-bit integers as float64, the widths every
/// GDAL build can write.
pub fn storage_dtype(dtype: DType) -> DType {
    match dtype {
        DType::Int8 => DType::Int16,
        DType::UInt64 | DType::Int64 => DType::Float64,
        other => other,
    }
}

/// Read the grid of an existing raster, for use as a template.
pub fn read_grid_spec(path: &Path) -> Result<GridSpec> {
    let dataset = Dataset::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let transform = Affine::from_gdal(
        dataset
            .geo_transform()
            .context("Failed to read geo transform")?,
    );
    if !transform.is_rectilinear() {
        bail!("Rotated rasters cannot be used as a template: {:?}", path);
    }
    let projection = dataset.projection();
    let crs = if projection.is_empty() {
        tracing::warn!("{:?} has no projection, assuming EPSG:4326", path);
        Crs::wgs84()
    } else {
        Crs::new(projection)
    };
    let (cols, rows) = dataset.raster_size();
    if cols == 0 || rows == 0 {
        bail!("Template raster {:?} is empty ({}x{})", path, cols, rows);
    }
    Ok(GridSpec::new(crs, transform, cols, rows))
}
