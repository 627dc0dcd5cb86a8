use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};

use super::{scattered_points, RasterLayer, Rasterize, RasterizeRequest, ScatteredPoint};
use crate::dtype::DType;
use crate::error::{GeocubeError, Result};

/// Radial kernel `phi(r)`; `epsilon` scales the shape-parameter kernels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RbfFunction {
    Multiquadric,
    Inverse,
    Gaussian,
    #[default]
    Linear,
    Cubic,
    Quintic,
    ThinPlate,
}

impl RbfFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RbfFunction::Multiquadric => "multiquadric",
            RbfFunction::Inverse => "inverse",
            RbfFunction::Gaussian => "gaussian",
            RbfFunction::Linear => "linear",
            RbfFunction::Cubic => "cubic",
            RbfFunction::Quintic => "quintic",
            RbfFunction::ThinPlate => "thin_plate",
        }
    }

    fn eval(&self, r: f64, epsilon: f64) -> f64 {
        let scaled = r / epsilon;
        match self {
            RbfFunction::Multiquadric => (scaled * scaled + 1.0).sqrt(),
            RbfFunction::Inverse => 1.0 / (scaled * scaled + 1.0).sqrt(),
            RbfFunction::Gaussian => (-(scaled * scaled)).exp(),
            RbfFunction::Linear => r,
            RbfFunction::Cubic => r.powi(3),
            RbfFunction::Quintic => r.powi(5),
            RbfFunction::ThinPlate => {
                if r == 0.0 {
                    0.0
                } else {
                    r * r * r.ln()
                }
            }
        }
    }
}

impl fmt::Display for RbfFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RbfFunction {
    type Err = GeocubeError;

    fn from_str(s: &str) -> Result<Self> {
        let function = match s.to_ascii_lowercase().as_str() {
            "multiquadric" => RbfFunction::Multiquadric,
            "inverse" | "inverse_multiquadric" => RbfFunction::Inverse,
            "gaussian" => RbfFunction::Gaussian,
            "linear" => RbfFunction::Linear,
            "cubic" => RbfFunction::Cubic,
            "quintic" => RbfFunction::Quintic,
            "thin_plate" | "thin-plate" => RbfFunction::ThinPlate,
            other => {
                return Err(GeocubeError::configuration(format!(
                    "unknown radial basis function '{}'",
                    other
                )))
            }
        };
        Ok(function)
    }
}

/// Radial basis function interpolation of point samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RadialBasis {
    pub function: RbfFunction,
    pub filter_null: bool,
    /// Kernel shape parameter; the mean node spacing when unset.
    pub epsilon: Option<f64>,
    /// Subtracted from the diagonal; zero interpolates exactly.
    pub smooth: f64,
}

impl RadialBasis {
    pub fn new(function: RbfFunction) -> Self {
        Self {
            function,
            ..Self::default()
        }
    }
}

/// Average node spacing over the bounding box of `points`.
fn default_epsilon(points: &[ScatteredPoint]) -> f64 {
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p.position.x);
        max_x = max_x.max(p.position.x);
        min_y = min_y.min(p.position.y);
        max_y = max_y.max(p.position.y);
    }
    let edges: Vec<f64> = [max_x - min_x, max_y - min_y]
        .into_iter()
        .filter(|edge| *edge > 0.0)
        .collect();
    if edges.is_empty() {
        return 1.0;
    }
    let volume: f64 = edges.iter().product();
    (volume / points.len() as f64).powf(1.0 / edges.len() as f64)
}

fn distance(a: &ScatteredPoint, x: f64, y: f64) -> f64 {
    (a.position.x - x).hypot(a.position.y - y)
}

impl RadialBasis {
    /// Weights `w` solving `A w = d`.
    fn solve(&self, points: &[ScatteredPoint], epsilon: f64) -> Result<DVector<f64>> {
        let n = points.len();
        let a = DMatrix::from_fn(n, n, |i, j| {
            let r = distance(&points[i], points[j].position.x, points[j].position.y);
            let phi = self.function.eval(r, epsilon);
            if i == j {
                phi - self.smooth
            } else {
                phi
            }
        });
        let d = DVector::from_iterator(n, points.iter().map(|p| p.value));
        a.lu()
            .solve(&d)
            .filter(|w| w.iter().all(|v| v.is_finite()))
            .ok_or_else(|| {
                GeocubeError::interpolation(format!(
                    "singular {} system for {} points (duplicate locations?)",
                    self.function, n
                ))
            })
    }
}

impl Rasterize for RadialBasis {
    fn rasterize(&self, request: &RasterizeRequest<'_>) -> Result<Option<RasterLayer>> {
        let Some((_, points)) = scattered_points(request, self.filter_null) else {
            return Ok(None);
        };
        if points.is_empty() {
            return Ok(Some(RasterLayer::filled(DType::Float64, request.grid, request.fill)));
        }
        let epsilon = self.epsilon.unwrap_or_else(|| default_epsilon(&points));
        let weights = self.solve(&points, epsilon)?;

        let coords = request.coords;
        let mut data = Vec::with_capacity(coords.x.len() * coords.y.len());
        for &y in &coords.y {
            for &x in &coords.x {
                let value = points
                    .iter()
                    .zip(weights.iter())
                    .map(|(p, w)| w * self.function.eval(distance(p, x, y), epsilon))
                    .sum::<f64>();
                data.push(value);
            }
        }
        Ok(Some(RasterLayer::new(DType::Float64, request.grid, data)))
    }
}
