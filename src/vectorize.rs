//! Polygons back from a rasterized layer.

use geo::{BooleanOps, Coord, Geometry, MultiPolygon, Polygon, Rect};
use tracing::info;

use crate::error::{GeocubeError, Result};
use crate::geobox::GridSpec;
use crate::model::{Column, ColumnData, FeatureCollection};
use crate::output::DataVariable;

/// Trace the 4-connected regions of equal valid cells of a 2-D `variable`
/// into polygons, one feature per polygon.
///
/// No-data and NaN cells are left out. The single attribute column is named
/// after the variable and is integer when the layer is. A layer without any
/// valid cell gives a [`GeocubeError::VectorData`] error.
pub fn vectorize(variable: &DataVariable, grid: &GridSpec) -> Result<FeatureCollection> {
    let (height, width) = grid.shape();
    if variable.shape != [height, width] || variable.data.len() != grid.len() {
        return Err(GeocubeError::configuration(format!(
            "can only vectorize a 2-D layer on the {}x{} grid, '{}' has shape {:?}",
            width, height, variable.attrs.name, variable.shape
        )));
    }

    let data = &variable.data;
    let mut visited = vec![false; data.len()];
    let mut stack = Vec::new();
    let mut geometries = Vec::new();
    let mut values = Vec::new();

    for start in 0..data.len() {
        let value = data[start];
        if visited[start] || value.is_nan() || variable.attrs.is_nodata(value) {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        let mut cells = Vec::new();
        while let Some(index) = stack.pop() {
            cells.push(index);
            let (row, col) = (index / width, index % width);
            let neighbours = [
                (row > 0).then(|| index - width),
                (row + 1 < height).then(|| index + width),
                (col > 0).then(|| index - 1),
                (col + 1 < width).then(|| index + 1),
            ];
            for next in neighbours.into_iter().flatten() {
                if !visited[next] && data[next] == value {
                    visited[next] = true;
                    stack.push(next);
                }
            }
        }
        for polygon in region_polygons(grid, &mut cells) {
            geometries.push(Geometry::Polygon(polygon));
            values.push(value);
        }
    }

    let column = if variable.dtype.is_integer() {
        ColumnData::Integer {
            dtype: variable.dtype,
            values: values.iter().map(|v| Some(*v as i64)).collect(),
        }
    } else {
        ColumnData::Real {
            dtype: variable.dtype,
            values: values.into_iter().map(Some).collect(),
        }
    };
    info!(
        "Vectorized '{}' into {} polygons",
        variable.attrs.name,
        geometries.len()
    );
    FeatureCollection::new(
        Some(grid.crs().clone()),
        Some(geometries),
        vec![Column::new(variable.attrs.name.clone(), column)],
    )
}

/// Union of the row runs of one region.
fn region_polygons(grid: &GridSpec, cells: &mut [usize]) -> Vec<Polygon<f64>> {
    let width = grid.width();
    cells.sort_unstable();
    let mut region = MultiPolygon::new(Vec::new());
    for run in cells.chunk_by(|a, b| *b == *a + 1 && *b % width != 0) {
        let (Some(first), Some(last)) = (run.first(), run.last()) else {
            continue;
        };
        let row = first / width;
        let a = grid.pixel_rect(row, first % width);
        let b = grid.pixel_rect(row, last % width);
        let rect = Rect::new(
            Coord {
                x: a.min().x.min(b.min().x),
                y: a.min().y,
            },
            Coord {
                x: a.max().x.max(b.max().x),
                y: a.max().y,
            },
        );
        region = region.union(&MultiPolygon::new(vec![rect.to_polygon()]));
    }
    region.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::dtype::DType;
    use crate::geobox::Affine;
    use crate::output::VariableAttrs;
    use geo::{Area, BoundingRect};

    fn layer(dtype: DType, fill: f64, shape: Vec<usize>, data: Vec<f64>) -> DataVariable {
        let dims = if shape.len() == 3 {
            vec!["g".into(), "y".into(), "x".into()]
        } else {
            vec!["y".into(), "x".into()]
        };
        DataVariable {
            dims,
            shape,
            dtype,
            data,
            attrs: VariableAttrs::new("v", fill),
        }
    }

    fn grid(width: usize, height: usize) -> GridSpec {
        let top = height as f64;
        GridSpec::new(Crs::epsg(32615), Affine::new(0.0, 1.0, top, -1.0), width, height)
    }

    fn assert_areas(fc: &FeatureCollection, expected: &[f64]) {
        let areas: Vec<f64> = fc.geometries().iter().map(|g| g.unsigned_area()).collect();
        assert_eq!(areas.len(), expected.len());
        for (area, want) in areas.iter().zip(expected) {
            assert!((area - want).abs() < 1e-9, "area {} != {}", area, want);
        }
    }

    #[test]
    fn test_regions_become_polygons() {
        let n = f64::NAN;
        let variable = layer(
            DType::Float32,
            f64::NAN,
            vec![3, 3],
            vec![
                1.0, 1.0, 2.0, //
                1.0, n, 2.0, //
                3.0, 3.0, 3.0,
            ],
        );
        let fc = vectorize(&variable, &grid(3, 3)).unwrap();
        assert_eq!(fc.len(), 3);
        assert_eq!(fc.crs(), &Crs::epsg(32615));
        assert_areas(&fc, &[3.0, 2.0, 3.0]);
        assert_eq!(
            fc.column("v").unwrap().data,
            ColumnData::Real {
                dtype: DType::Float32,
                values: vec![Some(1.0), Some(2.0), Some(3.0)],
            }
        );
        // the L of ones lies in the top-left corner
        let rect = fc.geometries()[0].bounding_rect().unwrap();
        assert_eq!(rect.min(), Coord { x: 0.0, y: 1.0 });
        assert_eq!(rect.max(), Coord { x: 2.0, y: 3.0 });
    }

    #[test]
    fn test_diagonal_cells_are_separate() {
        let variable = layer(DType::Int16, -1.0, vec![2, 2], vec![1.0, -1.0, -1.0, 1.0]);
        let fc = vectorize(&variable, &grid(2, 2)).unwrap();
        assert_eq!(fc.len(), 2);
        assert_areas(&fc, &[1.0, 1.0]);
        assert!(matches!(
            fc.column("v").unwrap().data,
            ColumnData::Integer { dtype: DType::Int16, .. }
        ));
    }

    #[test]
    fn test_grouped_layer_is_rejected() {
        let variable = layer(DType::Int16, -1.0, vec![1, 2, 2], vec![1.0; 4]);
        assert!(matches!(
            vectorize(&variable, &grid(2, 2)),
            Err(GeocubeError::Configuration(_))
        ));
    }

    #[test]
    fn test_all_nodata_is_an_error() {
        let variable = layer(DType::Int16, -1.0, vec![2, 2], vec![-1.0; 4]);
        assert!(matches!(
            vectorize(&variable, &grid(2, 2)),
            Err(GeocubeError::VectorData(_))
        ));
    }
}
