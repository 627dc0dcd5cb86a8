//! Assembly of rasterized measurements into one [`OutputGrid`].

use std::collections::BTreeMap;

use geo::Geometry;
use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::convert::{self, AttributeValues, ConversionMeta, TIME_UNITS};
use crate::crs::{GdalGeodesy, Geodesy};
use crate::dtype::{DType, RasterEncoding};
use crate::error::{GeocubeError, Result};
use crate::geobox::{GridConfig, GridCoords, GridSpec};
use crate::model::{ColumnData, FeatureCollection, Measurement, MeasurementKind};
use crate::output::{DataVariable, Diagnostic, GroupAxis, GroupLabel, OutputGrid, VariableAttrs};
use crate::rasterize::{
    griddata, DirectBurn, GridDataMethod, RasterLayer, Rasterize, RasterizeRequest,
    ScatteredPoint,
};

/// Fill used for categorical layers, one below the first code.
pub const CATEGORICAL_FILL: f64 = -1.0;

/// Per-call options of [`GeoCube::make_geocube`].
#[derive(Debug, Clone)]
pub struct GeocubeOptions {
    /// Attributes to rasterize, in output order. All columns when `None`.
    pub measurements: Option<Vec<String>>,
    /// Attributes to treat as timestamps (only those also measured).
    pub datetime_measurements: Vec<String>,
    /// Fixed label sets re-typing the named columns as categorical.
    pub categorical_enums: IndexMap<String, Vec<String>>,
    /// Column whose distinct values stack layers along a group axis.
    pub group_by: Option<String>,
    pub fill: f64,
    /// Fill no-data cells from the valid ones after rasterizing.
    pub interpolate_na_method: Option<GridDataMethod>,
}

impl Default for GeocubeOptions {
    fn default() -> Self {
        Self {
            measurements: None,
            datetime_measurements: Vec::new(),
            categorical_enums: IndexMap::new(),
            group_by: None,
            fill: f64::NAN,
            interpolate_na_method: None,
        }
    }
}

/// Record indices of each group, keys sorted.
struct Groups {
    name: String,
    members: BTreeMap<GroupLabel, Vec<usize>>,
}

enum Outcome {
    Layer(DataVariable, Option<Vec<String>>),
    Skipped(Diagnostic),
}

/// Vector-to-raster engine.
///
/// Holds the reprojection backend and the rasterization strategy; both
/// are shared read-only across the measurements rasterized in parallel.
pub struct GeoCube {
    geodesy: Box<dyn Geodesy>,
    rasterizer: Box<dyn Rasterize>,
}

impl Default for GeoCube {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoCube {
    /// GDAL reprojection and direct burn-in, with integer widths matched
    /// to the linked GDAL release.
    pub fn new() -> Self {
        let burn = DirectBurn {
            encoding: RasterEncoding::from_gdal(),
            ..DirectBurn::new()
        };
        Self {
            geodesy: Box::new(GdalGeodesy::new()),
            rasterizer: Box::new(burn),
        }
    }

    pub fn with_geodesy(mut self, geodesy: impl Geodesy + 'static) -> Self {
        self.geodesy = Box::new(geodesy);
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: impl Rasterize + 'static) -> Self {
        self.rasterizer = Box::new(rasterizer);
        self
    }

    /// Rasterize `features` onto the grid described by `grid`.
    pub fn make_geocube(
        &self,
        features: &FeatureCollection,
        grid: &GridConfig,
        options: &GeocubeOptions,
    ) -> Result<OutputGrid> {
        let mut features = features.to_crs(&grid.target_crs(features), self.geodesy.as_ref())?;
        let grid = grid.resolve(&features, self.geodesy.as_ref())?;
        let coords = grid.coords();

        for (name, labels) in &options.categorical_enums {
            let column = features.column(name).ok_or_else(|| {
                GeocubeError::vector_data(format!(
                    "categorical column '{}' not found. Columns in data: {:?}",
                    name,
                    features.column_names()
                ))
            })?;
            let data = column
                .data
                .to_categorical(convert::categorical_enumeration(labels));
            features.set_column_data(name, data)?;
        }

        let mut names = match &options.measurements {
            Some(names) => {
                for name in names {
                    if features.column(name).is_none() {
                        return Err(GeocubeError::vector_data(format!(
                            "measurement '{}' not found. Columns in data: {:?}",
                            name,
                            features.column_names()
                        )));
                    }
                }
                names.clone()
            }
            None => features.column_names(),
        };

        let groups = match &options.group_by {
            Some(group_by) => {
                let groups = group_records(&features, group_by)?;
                names.retain(|name| name != group_by);
                Some(groups)
            }
            None => None,
        };

        let measurements: Vec<Measurement> = names
            .iter()
            .map(|name| measurement_for(&features, name, options))
            .collect::<Result<_>>()?;

        let job = Job {
            features: &features,
            grid: &grid,
            coords: &coords,
            groups: groups.as_ref(),
            rasterizer: self.rasterizer.as_ref(),
            interpolate_na: options.interpolate_na_method,
        };
        let outcomes: Vec<Outcome> = measurements
            .par_iter()
            .map(|measurement| job.run(measurement))
            .collect::<Result<_>>()?;

        let mut variables = IndexMap::new();
        let mut categories = IndexMap::new();
        let mut diagnostics = Vec::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Layer(variable, labels) => {
                    if let (Some(mapping), Some(labels)) =
                        (variable.attrs.categorical_mapping.clone(), labels)
                    {
                        categories.insert(mapping, labels);
                    }
                    variables.insert(variable.attrs.name.clone(), variable);
                }
                Outcome::Skipped(diagnostic) => diagnostics.push(diagnostic),
            }
        }

        info!(
            "Assembled {} of {} measurements on a {}x{} grid",
            variables.len(),
            measurements.len(),
            grid.width(),
            grid.height()
        );

        Ok(OutputGrid {
            group_axis: groups.map(|groups| GroupAxis {
                name: groups.name,
                labels: groups.members.into_keys().collect(),
            }),
            grid,
            coords,
            variables,
            categories,
            diagnostics,
        })
    }
}

fn measurement_for(
    features: &FeatureCollection,
    name: &str,
    options: &GeocubeOptions,
) -> Result<Measurement> {
    let column = features
        .column(name)
        .ok_or_else(|| GeocubeError::vector_data(format!("measurement '{}' not found", name)))?;
    let kind = if options.datetime_measurements.iter().any(|m| m == name) {
        MeasurementKind::Temporal
    } else {
        column.data.kind()
    };
    let (fill, categories) = match (&column.data, kind) {
        (ColumnData::Categorical { categories, .. }, MeasurementKind::Categorical) => {
            (CATEGORICAL_FILL, Some(categories.clone()))
        }
        _ => (options.fill, None),
    };
    Ok(Measurement {
        name: name.to_string(),
        kind,
        fill,
        categories,
    })
}

fn group_records(features: &FeatureCollection, group_by: &str) -> Result<Groups> {
    let column = features.column(group_by).ok_or_else(|| {
        GeocubeError::vector_data(format!(
            "group_by column '{}' not found. Columns in data: {:?}",
            group_by,
            features.column_names()
        ))
    })?;
    let mut members: BTreeMap<GroupLabel, Vec<usize>> = BTreeMap::new();
    for index in 0..features.len() {
        if let Some(label) = GroupLabel::from_column(&column.data, index) {
            members.entry(label).or_default().push(index);
        }
    }
    Ok(Groups {
        name: group_by.to_string(),
        members,
    })
}

/// Shared, read-only inputs of one assembly.
struct Job<'a> {
    features: &'a FeatureCollection,
    grid: &'a GridSpec,
    coords: &'a GridCoords,
    groups: Option<&'a Groups>,
    rasterizer: &'a dyn Rasterize,
    interpolate_na: Option<GridDataMethod>,
}

impl Job<'_> {
    fn run(&self, measurement: &Measurement) -> Result<Outcome> {
        debug!("Rasterizing '{}' ({:?})", measurement.name, measurement.kind);
        let column = self.features.column(&measurement.name).ok_or_else(|| {
            GeocubeError::vector_data(format!("measurement '{}' not found", measurement.name))
        })?;
        let (values, meta) = convert::normalize(&measurement.name, &column.data, measurement.kind)?;

        let stacked = match self.groups {
            None => self
                .rasterize(self.features.geometries(), &values, measurement.fill)?
                .map(|layer| {
                    let shape = vec![self.grid.height(), self.grid.width()];
                    (layer.dtype, layer.data, shape)
                }),
            Some(groups) => self.rasterize_groups(groups, &values, measurement.fill)?,
        };
        let Some((dtype, data, shape)) = stacked else {
            let diagnostic = Diagnostic {
                measurement: measurement.name.clone(),
                message: format!("Skipping attribute {} due to missing data...", measurement.name),
            };
            warn!("{}", diagnostic.message);
            return Ok(Outcome::Skipped(diagnostic));
        };

        let mut variable = self.assemble(measurement, &meta, dtype, data, shape);
        if let Some(method) = self.interpolate_na {
            fill_gaps(&mut variable, self.coords, method)?;
        }
        Ok(Outcome::Layer(variable, meta.categories))
    }

    fn rasterize(
        &self,
        geometries: &[Geometry<f64>],
        values: &AttributeValues,
        fill: f64,
    ) -> Result<Option<RasterLayer>> {
        self.rasterizer.rasterize(&RasterizeRequest {
            geometries,
            values,
            grid: self.grid,
            fill,
            coords: self.coords,
        })
    }

    /// One layer per group, or `None` as soon as any group is declined.
    fn rasterize_groups(
        &self,
        groups: &Groups,
        values: &AttributeValues,
        fill: f64,
    ) -> Result<Option<(DType, Vec<f64>, Vec<usize>)>> {
        let all = self.features.geometries();
        let mut layers = Vec::with_capacity(groups.members.len());
        for indices in groups.members.values() {
            let geometries: Vec<Geometry<f64>> = indices.iter().map(|&i| all[i].clone()).collect();
            let subset = values.select(indices);
            match self.rasterize(&geometries, &subset, fill)? {
                Some(layer) => layers.push(layer),
                None => return Ok(None),
            }
        }
        let Some(dtype) = layers.iter().map(|l| l.dtype).reduce(DType::promote) else {
            // no non-null group keys: an empty stack
            let dtype = if fill.is_nan() { DType::Float64 } else { DType::Int32 };
            let shape = vec![0, self.grid.height(), self.grid.width()];
            return Ok(Some((dtype, Vec::new(), shape)));
        };
        let shape = vec![layers.len(), self.grid.height(), self.grid.width()];
        let data = layers
            .into_iter()
            .flat_map(|layer| layer.data)
            .map(|v| dtype.cast(v))
            .collect();
        Ok(Some((dtype, data, shape)))
    }

    fn assemble(
        &self,
        measurement: &Measurement,
        meta: &ConversionMeta,
        dtype: DType,
        mut data: Vec<f64>,
        shape: Vec<usize>,
    ) -> DataVariable {
        let mut attrs = VariableAttrs::new(&measurement.name, measurement.fill);
        if meta.temporal {
            attrs.units = Some(TIME_UNITS.to_string());
            attrs.fill_value = 0.0;
            for cell in data.iter_mut() {
                if cell.is_nan() || *cell == measurement.fill {
                    *cell = 0.0;
                }
            }
        }
        if meta.categories.is_some() {
            attrs.categorical_mapping = Some(format!("{}_categories", measurement.name));
        }
        let dims = match self.groups {
            Some(groups) => vec![groups.name.clone(), "y".to_string(), "x".to_string()],
            None => vec!["y".to_string(), "x".to_string()],
        };
        DataVariable {
            dims,
            shape,
            dtype,
            data,
            attrs,
        }
    }
}

/// Interpolate every no-data cell of `variable` from its valid cells.
///
/// Works slice by slice; slices with no valid or no missing cell are
/// left as they are.
pub fn fill_gaps(
    variable: &mut DataVariable,
    coords: &GridCoords,
    method: GridDataMethod,
) -> Result<()> {
    let dtype = match method {
        GridDataMethod::Nearest => variable.dtype,
        GridDataMethod::Linear | GridDataMethod::Cubic => {
            if variable.dtype.is_integer() {
                DType::Float64
            } else {
                variable.dtype
            }
        }
    };
    let slice_len = variable.slice_len();
    if slice_len == 0 {
        return Ok(());
    }
    let width = coords.x.len();
    let nodata = variable.attrs.fill_value;
    let attrs = variable.attrs.clone();

    for slice in variable.data.chunks_mut(slice_len) {
        let missing = slice.iter().filter(|v| attrs.is_nodata(**v)).count();
        if missing == 0 || missing == slice.len() {
            continue;
        }
        let points: Vec<ScatteredPoint> = slice
            .iter()
            .enumerate()
            .filter(|(_, v)| !attrs.is_nodata(**v))
            .map(|(index, value)| ScatteredPoint {
                position: geo::Coord {
                    x: coords.x[index % width],
                    y: coords.y[index / width],
                },
                value: *value,
            })
            .collect();
        let filled = griddata(&points, coords, method, nodata, false)?;
        for (cell, value) in slice.iter_mut().zip(filled) {
            *cell = dtype.cast(value);
        }
    }
    variable.dtype = dtype;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::geobox::{Affine, Resolution};
    use crate::model::Column;
    use geo::{polygon, Coord, MapCoords};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Same-CRS geodesy so tests never touch PROJ.
    struct Planar;

    impl Geodesy for Planar {
        fn transform(&self, geometry: &Geometry<f64>, _: &Crs, _: &Crs) -> Result<Geometry<f64>> {
            Ok(geometry.map_coords(|c| Coord { x: c.x, y: c.y }))
        }
    }

    /// Identity transform that counts the geometries it reprojects.
    struct Counting(Arc<AtomicUsize>);

    impl Geodesy for Counting {
        fn transform(&self, geometry: &Geometry<f64>, _: &Crs, _: &Crs) -> Result<Geometry<f64>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(geometry.clone())
        }
    }

    fn square(x: f64, y: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x, y: y),
            (x: x + 1.0, y: y),
            (x: x + 1.0, y: y + 1.0),
            (x: x, y: y + 1.0),
        ])
    }

    fn cube() -> GeoCube {
        GeoCube::new().with_geodesy(Planar)
    }

    fn grid_config() -> GridConfig {
        GridConfig::new().with_resolution(Resolution::square(1.0))
    }

    fn features() -> FeatureCollection {
        FeatureCollection::new(
            Some(Crs::epsg(32615)),
            Some(vec![square(0.0, 0.0), square(1.0, 0.0), square(2.0, 1.0)]),
            vec![
                Column::integer("count", vec![3, 5, 7]),
                Column::text("soil", vec!["sand", "clay", "loam"]),
                Column::text("zone", vec!["a", "b", "a"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_all_columns_in_load_order_text_skipped() {
        let out = cube()
            .make_geocube(&features(), &grid_config(), &GeocubeOptions::default())
            .unwrap();
        assert_eq!(out.names().collect::<Vec<_>>(), vec!["count"]);
        let skipped: Vec<&str> = out.diagnostics.iter().map(|d| d.measurement.as_str()).collect();
        assert_eq!(skipped, vec!["soil", "zone"]);

        let count = out.variable("count").unwrap();
        assert_eq!(count.dims, vec!["y", "x"]);
        assert_eq!(count.shape, vec![2, 3]);
        assert_eq!(count.dtype, DType::Float32);
        assert_eq!(count.get(1, 0), 3.0);
        assert_eq!(count.get(1, 1), 5.0);
        assert_eq!(count.get(0, 2), 7.0);
        assert!(count.get(0, 0).is_nan());
        assert_eq!(count.attrs.grid_mapping, "spatial_ref");
    }

    #[test]
    fn test_requested_order_and_unknown_measurement() {
        let options = GeocubeOptions {
            measurements: Some(vec!["count".into(), "nope".into()]),
            ..GeocubeOptions::default()
        };
        let err = cube()
            .make_geocube(&features(), &grid_config(), &options)
            .unwrap_err();
        assert!(matches!(err, GeocubeError::VectorData(_)));
    }

    #[test]
    fn test_categorical_enums() {
        let mut enums = IndexMap::new();
        enums.insert("soil".to_string(), vec!["sand".to_string(), "clay".to_string()]);
        let options = GeocubeOptions {
            measurements: Some(vec!["soil".into()]),
            categorical_enums: enums,
            ..GeocubeOptions::default()
        };
        let out = cube()
            .make_geocube(&features(), &grid_config(), &options)
            .unwrap();
        let soil = out.variable("soil").unwrap();
        assert_eq!(soil.attrs.fill_value, -1.0);
        assert_eq!(soil.attrs.categorical_mapping.as_deref(), Some("soil_categories"));
        assert!(matches!(soil.dtype, DType::Int8 | DType::Int16));
        assert_eq!(
            out.categories_of("soil").unwrap(),
            &["clay".to_string(), "sand".to_string(), "nodata".to_string()]
        );
        // sand, clay, loam (outside the enumeration)
        assert_eq!(soil.get(1, 0), 1.0);
        assert_eq!(soil.get(1, 1), 0.0);
        assert_eq!(soil.get(0, 2), 2.0);
        assert_eq!(soil.get(0, 0), -1.0);
    }

    #[test]
    fn test_group_by() {
        let options = GeocubeOptions {
            group_by: Some("zone".into()),
            fill: -9999.0,
            ..GeocubeOptions::default()
        };
        let out = cube()
            .make_geocube(&features(), &grid_config(), &options)
            .unwrap();
        let axis = out.group_axis.as_ref().unwrap();
        assert_eq!(axis.name, "zone");
        assert_eq!(axis.labels, vec![GroupLabel::Text("a".into()), GroupLabel::Text("b".into())]);

        let count = out.variable("count").unwrap();
        assert_eq!(count.dims, vec!["zone", "y", "x"]);
        assert_eq!(count.shape, vec![2, 2, 3]);
        assert_eq!(count.get_grouped(0, 1, 0), 3.0);
        assert_eq!(count.get_grouped(0, 1, 1), -9999.0);
        assert_eq!(count.get_grouped(1, 1, 1), 5.0);
        assert_eq!(count.get_grouped(0, 0, 2), 7.0);
        assert!(out.variable("zone").is_none());
    }

    #[test]
    fn test_grouped_measurement_dropped_when_any_group_declines() {
        fn declines_b(request: &RasterizeRequest<'_>) -> Result<Option<RasterLayer>> {
            match request.values {
                AttributeValues::Numeric { values, .. } if values.contains(&Some(5.0)) => Ok(None),
                _ => DirectBurn::new().rasterize(request),
            }
        }
        let options = GeocubeOptions {
            measurements: Some(vec!["count".into()]),
            group_by: Some("zone".into()),
            ..GeocubeOptions::default()
        };
        let out = cube()
            .with_rasterizer(declines_b)
            .make_geocube(&features(), &grid_config(), &options)
            .unwrap();
        assert!(out.variables.is_empty());
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].measurement, "count");
    }

    #[test]
    fn test_unknown_group_column() {
        let options = GeocubeOptions {
            group_by: Some("missing".into()),
            ..GeocubeOptions::default()
        };
        assert!(matches!(
            cube().make_geocube(&features(), &grid_config(), &options),
            Err(GeocubeError::VectorData(_))
        ));
    }

    #[test]
    fn test_temporal_layers() {
        let fc = FeatureCollection::new(
            Some(Crs::epsg(32615)),
            Some(vec![square(0.0, 0.0), square(1.0, 1.0)]),
            vec![Column::text("when", vec!["1970-01-01T00:01:00Z", "1970-01-01"])],
        )
        .unwrap();
        let options = GeocubeOptions {
            datetime_measurements: vec!["when".into()],
            ..GeocubeOptions::default()
        };
        let out = cube().make_geocube(&fc, &grid_config(), &options).unwrap();
        let when = out.variable("when").unwrap();
        assert_eq!(when.attrs.units.as_deref(), Some(TIME_UNITS));
        assert_eq!(when.attrs.fill_value, 0.0);
        assert_eq!(when.get(1, 0), 60.0);
        assert_eq!(when.get(0, 1), 0.0);
        assert_eq!(when.get(0, 0), 0.0);
        assert!(when.data.iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_grouped_categorical() {
        let mut enums = IndexMap::new();
        enums.insert("soil".to_string(), vec!["sand".to_string(), "clay".to_string()]);
        let options = GeocubeOptions {
            measurements: Some(vec!["soil".into()]),
            categorical_enums: enums,
            group_by: Some("zone".into()),
            ..GeocubeOptions::default()
        };
        let out = cube()
            .make_geocube(&features(), &grid_config(), &options)
            .unwrap();
        let soil = out.variable("soil").unwrap();
        assert_eq!(soil.dims, vec!["zone", "y", "x"]);
        assert_eq!(soil.shape, vec![2, 2, 3]);
        assert_eq!(soil.attrs.fill_value, -1.0);
        assert_eq!(soil.attrs.categorical_mapping.as_deref(), Some("soil_categories"));
        // zone a: sand and loam; zone b: clay
        assert_eq!(soil.get_grouped(0, 1, 0), 1.0);
        assert_eq!(soil.get_grouped(0, 0, 2), 2.0);
        assert_eq!(soil.get_grouped(0, 1, 1), -1.0);
        assert_eq!(soil.get_grouped(1, 1, 1), 0.0);
        assert_eq!(soil.get_grouped(1, 1, 0), -1.0);
        assert_eq!(soil.get_grouped(1, 0, 2), -1.0);
    }

    #[test]
    fn test_grouped_temporal() {
        let fc = FeatureCollection::new(
            Some(Crs::epsg(32615)),
            Some(vec![square(0.0, 0.0), square(1.0, 1.0)]),
            vec![
                Column::text("when", vec!["1970-01-01T00:01:00Z", "1970-01-01T00:02:00Z"]),
                Column::text("zone", vec!["a", "b"]),
            ],
        )
        .unwrap();
        let options = GeocubeOptions {
            datetime_measurements: vec!["when".into()],
            group_by: Some("zone".into()),
            ..GeocubeOptions::default()
        };
        let out = cube().make_geocube(&fc, &grid_config(), &options).unwrap();
        let when = out.variable("when").unwrap();
        assert_eq!(when.dims, vec!["zone", "y", "x"]);
        assert_eq!(when.shape, vec![2, 2, 2]);
        assert_eq!(when.attrs.units.as_deref(), Some(TIME_UNITS));
        assert_eq!(when.attrs.fill_value, 0.0);
        assert!(when.data.iter().all(|v| !v.is_nan()));
        assert_eq!(when.get_grouped(0, 1, 0), 60.0);
        assert_eq!(when.get_grouped(0, 0, 1), 0.0);
        assert_eq!(when.get_grouped(1, 0, 1), 120.0);
        assert_eq!(when.get_grouped(1, 1, 0), 0.0);
    }

    #[test]
    fn test_features_are_reprojected_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = grid_config().with_output_crs(Crs::wgs84());
        let out = GeoCube::new()
            .with_geodesy(Counting(calls.clone()))
            .make_geocube(&features(), &config, &GeocubeOptions::default())
            .unwrap();
        assert_eq!(out.grid.crs(), &Crs::wgs84());
        assert_eq!(calls.load(Ordering::SeqCst), features().len());
    }

    #[test]
    fn test_interpolate_na_nearest_fills_every_cell() {
        let options = GeocubeOptions {
            measurements: Some(vec!["count".into()]),
            interpolate_na_method: Some(GridDataMethod::Nearest),
            ..GeocubeOptions::default()
        };
        let out = cube()
            .make_geocube(&features(), &grid_config(), &options)
            .unwrap();
        let count = out.variable("count").unwrap();
        assert!(count.data.iter().all(|v| !v.is_nan()));
        assert_eq!(count.get(0, 0), 3.0);
        assert_eq!(count.get(0, 2), 7.0);
    }

    #[test]
    fn test_fill_gaps_leaves_empty_slices() {
        let coords = GridCoords {
            x: vec![0.5, 1.5],
            y: vec![0.5],
        };
        let mut variable = DataVariable {
            dims: vec!["g".into(), "y".into(), "x".into()],
            shape: vec![2, 1, 2],
            dtype: DType::Int16,
            data: vec![-1.0, -1.0, 4.0, -1.0],
            attrs: VariableAttrs::new("v", -1.0),
        };
        fill_gaps(&mut variable, &coords, GridDataMethod::Nearest).unwrap();
        assert_eq!(variable.data, vec![-1.0, -1.0, 4.0, 4.0]);
        assert_eq!(variable.dtype, DType::Int16);

        fill_gaps(&mut variable, &coords, GridDataMethod::Linear).unwrap();
        assert_eq!(variable.dtype, DType::Float64);
    }

    #[test]
    fn test_template_grid_is_reused() {
        let like = GridSpec::new(Crs::epsg(32615), Affine::new(0.0, 0.5, 2.0, -0.5), 6, 4);
        let out = cube()
            .make_geocube(
                &features(),
                &GridConfig::new().with_like(like.clone()),
                &GeocubeOptions::default(),
            )
            .unwrap();
        assert_eq!(out.grid, like);
        assert_eq!(out.variable("count").unwrap().shape, vec![4, 6]);
    }

    #[test]
    fn test_categorical_column_type_detected() {
        let mut fc = features();
        let data = fc.column("zone").unwrap().data.to_categorical(vec![
            "a".to_string(),
            "b".to_string(),
            "nodata".to_string(),
        ]);
        fc.set_column_data("zone", data).unwrap();
        let out = cube()
            .make_geocube(
                &fc,
                &grid_config(),
                &GeocubeOptions {
                    measurements: Some(vec!["zone".into()]),
                    ..GeocubeOptions::default()
                },
            )
            .unwrap();
        let zone = out.variable("zone").unwrap();
        assert_eq!(zone.get(1, 1), 1.0);
        assert!(matches!(
            fc.column("zone").unwrap().data,
            ColumnData::Categorical { .. }
        ));
    }
}
