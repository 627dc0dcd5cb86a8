use std::fmt;
use std::str::FromStr;

use geo::Coord;
use spade::{DelaunayTriangulation, FloatTriangulation, HasPosition, Point2, Triangulation};

use super::{scattered_points, RasterLayer, Rasterize, RasterizeRequest};
use crate::dtype::DType;
use crate::error::{GeocubeError, Result};
use crate::geobox::GridCoords;

/// A sample for point interpolation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatteredPoint {
    pub position: Coord<f64>,
    pub value: f64,
}

impl HasPosition for ScatteredPoint {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        Point2::new(self.position.x, self.position.y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GridDataMethod {
    /// Value of the closest sample; covers every cell.
    #[default]
    Nearest,
    /// Barycentric interpolation inside the Delaunay triangle.
    Linear,
    /// Sibson's C1 natural-neighbour interpolation with estimated vertex
    /// gradients. Smooth like a Clough-Tocher cubic but not identical to it.
    Cubic,
}

impl GridDataMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridDataMethod::Nearest => "nearest",
            GridDataMethod::Linear => "linear",
            GridDataMethod::Cubic => "cubic",
        }
    }
}

impl fmt::Display for GridDataMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GridDataMethod {
    type Err = GeocubeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(GridDataMethod::Nearest),
            "linear" => Ok(GridDataMethod::Linear),
            "cubic" => Ok(GridDataMethod::Cubic),
            other => Err(GeocubeError::configuration(format!(
                "unknown interpolation method '{}', expected nearest, linear or cubic",
                other
            ))),
        }
    }
}

/// Interpolates scattered points onto every cell centre.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridData {
    pub method: GridDataMethod,
    /// Scale both axes to the unit square before interpolating.
    pub rescale: bool,
    pub filter_null: bool,
}

impl GridData {
    pub fn new(method: GridDataMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }
}

impl Rasterize for GridData {
    fn rasterize(&self, request: &RasterizeRequest<'_>) -> Result<Option<RasterLayer>> {
        let Some((source, points)) = scattered_points(request, self.filter_null) else {
            return Ok(None);
        };
        let keeps_source_dtype = self.method == GridDataMethod::Nearest
            && !points.is_empty()
            && points.iter().all(|p| p.value.is_finite());
        let dtype = if keeps_source_dtype {
            source
        } else {
            DType::Float64
        };
        let data = griddata(&points, request.coords, self.method, request.fill, self.rescale)?
            .into_iter()
            .map(|v| dtype.cast(v))
            .collect();
        Ok(Some(RasterLayer::new(dtype, request.grid, data)))
    }
}

/// Per-axis affine map onto the unit square.
struct Rescale {
    offset: Coord<f64>,
    scale: Coord<f64>,
}

impl Rescale {
    fn identity() -> Self {
        Self {
            offset: Coord { x: 0.0, y: 0.0 },
            scale: Coord { x: 1.0, y: 1.0 },
        }
    }

    fn fit(points: &[ScatteredPoint]) -> Self {
        let mut min = Coord {
            x: f64::INFINITY,
            y: f64::INFINITY,
        };
        let mut max = Coord {
            x: f64::NEG_INFINITY,
            y: f64::NEG_INFINITY,
        };
        for p in points {
            min.x = min.x.min(p.position.x);
            min.y = min.y.min(p.position.y);
            max.x = max.x.max(p.position.x);
            max.y = max.y.max(p.position.y);
        }
        if points.is_empty() {
            return Self::identity();
        }
        let span = |lo: f64, hi: f64| if hi - lo > 0.0 { hi - lo } else { 1.0 };
        Self {
            offset: min,
            scale: Coord {
                x: span(min.x, max.x),
                y: span(min.y, max.y),
            },
        }
    }

    fn apply(&self, c: Coord<f64>) -> Point2<f64> {
        Point2::new(
            (c.x - self.offset.x) / self.scale.x,
            (c.y - self.offset.y) / self.scale.y,
        )
    }
}

/// Interpolate `points` at the cell centres of `coords`.
///
/// Returns row-major values, `y` outer and `x` inner. Cells the method
/// cannot reach (outside the convex hull for linear and cubic) get `fill`.
pub fn griddata(
    points: &[ScatteredPoint],
    coords: &GridCoords,
    method: GridDataMethod,
    fill: f64,
    rescale: bool,
) -> Result<Vec<f64>> {
    let cells = coords.y.len() * coords.x.len();
    let transform = if rescale {
        Rescale::fit(points)
    } else {
        Rescale::identity()
    };

    let mut triangulation: DelaunayTriangulation<ScatteredPoint> = DelaunayTriangulation::new();
    for point in points {
        let projected = transform.apply(point.position);
        if !projected.x.is_finite() || !projected.y.is_finite() {
            continue;
        }
        triangulation
            .insert(ScatteredPoint {
                position: Coord {
                    x: projected.x,
                    y: projected.y,
                },
                value: point.value,
            })
            .map_err(|e| GeocubeError::interpolation(format!("{:?}", e)))?;
    }
    if triangulation.num_vertices() == 0 {
        return Ok(vec![fill; cells]);
    }

    let mut out = Vec::with_capacity(cells);
    match method {
        GridDataMethod::Nearest => {
            for &y in &coords.y {
                for &x in &coords.x {
                    let target = transform.apply(Coord { x, y });
                    let value = triangulation
                        .nearest_neighbor(target)
                        .map(|v| v.data().value)
                        .unwrap_or(fill);
                    out.push(value);
                }
            }
        }
        GridDataMethod::Linear => {
            let barycentric = triangulation.barycentric();
            for &y in &coords.y {
                for &x in &coords.x {
                    let target = transform.apply(Coord { x, y });
                    let value = barycentric
                        .interpolate(|v| v.data().value, target)
                        .unwrap_or(fill);
                    out.push(value);
                }
            }
        }
        GridDataMethod::Cubic => {
            let natural = triangulation.natural_neighbor();
            let gradients = natural.estimate_gradients(|v| v.data().value);
            for &y in &coords.y {
                for &x in &coords.x {
                    let target = transform.apply(Coord { x, y });
                    let value = natural
                        .interpolate_gradient(|v| v.data().value, &gradients, 1.0, target)
                        .unwrap_or(fill);
                    out.push(value);
                }
            }
        }
    }
    Ok(out)
}
