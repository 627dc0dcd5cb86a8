//! Target grid resolution.
//!
//! [`GridConfig`] collects the partial grid parameters a caller may give
//! (CRS, resolution, alignment, bounding geometry or a template grid) and
//! [`GridConfig::resolve`] turns them into one concrete [`GridSpec`].

pub mod geojson;

use geo::{BoundingRect, Coord, Densify, Euclidean, Geometry, Rect};
use tracing::info;

use crate::crs::{Crs, Geodesy};
use crate::error::{GeocubeError, Result};
use crate::model::FeatureCollection;

pub use geojson::BoundingGeometry;

/// Rotation-free affine transform from pixel `(col, row)` to map `(x, y)`.
///
/// `x = a * col + b * row + c`, `y = d * col + e * row + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    /// Origin at `(x0, y0)` with pixel size `(res_x, res_y)`.
    pub fn new(x0: f64, res_x: f64, y0: f64, res_y: f64) -> Self {
        Self {
            a: res_x,
            b: 0.0,
            c: x0,
            d: 0.0,
            e: res_y,
            f: y0,
        }
    }

    /// GDAL geo-transform array `[c, a, b, f, d, e]`.
    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            a: gt[1],
            b: gt[2],
            c: gt[0],
            d: gt[4],
            e: gt[5],
            f: gt[3],
        }
    }

    pub fn is_rectilinear(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }
}

/// Signed pixel size as `(y, x)`; `y` is normally negative (north-up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub y: f64,
    pub x: f64,
}

impl Resolution {
    pub fn new(y: f64, x: f64) -> Self {
        Self { y, x }
    }

    /// Square pixels of size `r`, north-up: `(-|r|, |r|)`.
    pub fn square(r: f64) -> Self {
        Self {
            y: -r.abs(),
            x: r.abs(),
        }
    }

    fn validate(&self) -> Result<()> {
        for (axis, value) in [("y", self.y), ("x", self.x)] {
            if !value.is_finite() || value == 0.0 {
                return Err(GeocubeError::configuration(format!(
                    "resolution {} must be finite and non-zero, got {}",
                    axis, value
                )));
            }
        }
        Ok(())
    }
}

/// Offset of the pixel lattice from the CRS origin, as `(y, x)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Align {
    pub y: f64,
    pub x: f64,
}

impl Align {
    pub fn new(y: f64, x: f64) -> Self {
        Self { y, x }
    }
}

/// Cell-centre coordinate axes of a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCoords {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// A fully resolved raster grid: CRS, transform and pixel shape.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    crs: Crs,
    transform: Affine,
    width: usize,
    height: usize,
}

impl GridSpec {
    pub fn new(crs: Crs, transform: Affine, width: usize, height: usize) -> Self {
        Self {
            crs,
            transform,
            width,
            height,
        }
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn transform(&self) -> &Affine {
        &self.transform
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// `(height, width)`, the order layers are stored in.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn len(&self) -> usize {
        self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.transform.e, self.transform.a)
    }

    /// Lattice offset recovered from the origin.
    pub fn align(&self) -> Align {
        Align::new(
            self.transform.f.rem_euclid(self.transform.e.abs()),
            self.transform.c.rem_euclid(self.transform.a.abs()),
        )
    }

    pub fn geo_transform(&self) -> [f64; 6] {
        self.transform.to_gdal()
    }

    pub fn coords(&self) -> GridCoords {
        GridCoords {
            x: (0..self.width).map(|col| self.pixel_center(0, col).x).collect(),
            y: (0..self.height).map(|row| self.pixel_center(row, 0).y).collect(),
        }
    }

    /// Map-space centre of pixel `(row, col)`.
    pub fn pixel_center(&self, row: usize, col: usize) -> Coord<f64> {
        let t = &self.transform;
        Coord {
            x: t.c + (col as f64 + 0.5) * t.a,
            y: t.f + (row as f64 + 0.5) * t.e,
        }
    }

    /// Map-space rectangle covered by pixel `(row, col)`.
    pub fn pixel_rect(&self, row: usize, col: usize) -> Rect<f64> {
        let t = &self.transform;
        let x0 = t.c + col as f64 * t.a;
        let y0 = t.f + row as f64 * t.e;
        Rect::new(
            Coord { x: x0, y: y0 },
            Coord {
                x: x0 + t.a,
                y: y0 + t.e,
            },
        )
    }

    /// Fractional pixel position `(row, col)` of a map coordinate.
    pub fn fractional_pixel(&self, coord: Coord<f64>) -> (f64, f64) {
        let t = &self.transform;
        ((coord.y - t.f) / t.e, (coord.x - t.c) / t.a)
    }

    /// Pixel `(row, col)` containing `coord`, if it lies on the grid.
    pub fn pixel_of(&self, coord: Coord<f64>) -> Option<(usize, usize)> {
        let (row, col) = self.fractional_pixel(coord);
        let (row, col) = (row.floor(), col.floor());
        if row < 0.0 || col < 0.0 || row >= self.height as f64 || col >= self.width as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }

    /// Map-space extent of the whole grid.
    pub fn bounds(&self) -> Rect<f64> {
        let t = &self.transform;
        Rect::new(
            Coord { x: t.c, y: t.f },
            Coord {
                x: t.c + self.width as f64 * t.a,
                y: t.f + self.height as f64 * t.e,
            },
        )
    }
}

/// Snap `[min, max]` outward onto a lattice of step `res` offset by `off`.
///
/// Returns the origin along the axis and the number of pixels. For a
/// negative step the origin is the upper edge.
pub fn align_pixels(min: f64, max: f64, res: f64, off: f64) -> (f64, usize) {
    if res < 0.0 {
        let res = -res;
        let origin = ((max - off) / res).ceil() * res + off;
        let size = ((origin - min - 0.1 * res) / res).ceil().max(1.0);
        (origin, size as usize)
    } else {
        let origin = ((min - off) / res).floor() * res + off;
        let size = ((max - origin - 0.1 * res) / res).ceil().max(1.0);
        (origin, size as usize)
    }
}

/// Number of pieces the longest side of a bounding geometry is cut into
/// before it is reprojected.
const DENSIFY_STEPS: f64 = 100.0;

/// Insert vertices so no edge is longer than `max_len`.
///
/// Straight edges bend under most projections; without the extra vertices
/// the reprojected extent only covers the original corners.
fn densify(geometry: &Geometry<f64>, max_len: f64) -> Geometry<f64> {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => geometry.clone(),
        Geometry::Line(g) => g.densify::<Euclidean>(max_len).into(),
        Geometry::LineString(g) => g.densify::<Euclidean>(max_len).into(),
        Geometry::MultiLineString(g) => g.densify::<Euclidean>(max_len).into(),
        Geometry::Polygon(g) => g.densify::<Euclidean>(max_len).into(),
        Geometry::MultiPolygon(g) => g.densify::<Euclidean>(max_len).into(),
        Geometry::Rect(g) => g.densify::<Euclidean>(max_len).into(),
        Geometry::Triangle(g) => g.densify::<Euclidean>(max_len).into(),
        Geometry::GeometryCollection(collection) => Geometry::GeometryCollection(
            collection.iter().map(|g| densify(g, max_len)).collect(),
        ),
    }
}

/// Partial grid parameters.
///
/// Either `like` alone, or `resolution` plus any of the other fields.
/// Nothing is checked until [`GridConfig::resolve`].
#[derive(Debug, Clone, Default)]
pub struct GridConfig {
    pub output_crs: Option<Crs>,
    pub resolution: Option<Resolution>,
    pub align: Option<Align>,
    pub geom: Option<BoundingGeometry>,
    pub like: Option<GridSpec>,
}

impl GridConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_output_crs(mut self, crs: Crs) -> Self {
        self.output_crs = Some(crs);
        self
    }

    pub fn with_align(mut self, align: Align) -> Self {
        self.align = Some(align);
        self
    }

    pub fn with_geom(mut self, geom: BoundingGeometry) -> Self {
        self.geom = Some(geom);
        self
    }

    pub fn with_like(mut self, like: GridSpec) -> Self {
        self.like = Some(like);
        self
    }

    /// CRS the resolved grid will use: the template's, else `output_crs`,
    /// else the CRS of `features`.
    pub fn target_crs(&self, features: &FeatureCollection) -> Crs {
        match (&self.like, &self.output_crs) {
            (Some(like), _) => like.crs().clone(),
            (None, Some(crs)) => crs.clone(),
            (None, None) => features.crs().clone(),
        }
    }

    /// Resolve the grid for `features`.
    ///
    /// Features already in the target CRS are used as they are; otherwise
    /// their extent is reprojected first.
    pub fn resolve(
        &self,
        features: &FeatureCollection,
        geodesy: &dyn Geodesy,
    ) -> Result<GridSpec> {
        if let Some(like) = &self.like {
            if self.output_crs.is_some() || self.resolution.is_some() || self.align.is_some() {
                return Err(GeocubeError::configuration(
                    "'like' cannot be combined with 'output_crs', 'resolution' or 'align'",
                ));
            }
            info!(
                "Using template grid {}x{} in {}",
                like.width(),
                like.height(),
                like.crs()
            );
            return Ok(like.clone());
        }

        let resolution = self.resolution.ok_or_else(|| {
            GeocubeError::configuration("Must specify 'resolution' if 'like' not specified.")
        })?;
        resolution.validate()?;
        let align = self.align.unwrap_or_default();
        if !align.x.is_finite() || !align.y.is_finite() {
            return Err(GeocubeError::configuration("align must be finite"));
        }

        let crs = self.target_crs(features);

        let extent = match &self.geom {
            Some(geom) if geodesy.is_same(&geom.crs, &crs)? => geom.geometry.bounding_rect(),
            Some(geom) => {
                let max_len = geom
                    .geometry
                    .bounding_rect()
                    .map(|rect| rect.width().hypot(rect.height()) / DENSIFY_STEPS)
                    .unwrap_or_default();
                let dense = if max_len > 0.0 {
                    densify(&geom.geometry, max_len)
                } else {
                    geom.geometry.clone()
                };
                geodesy
                    .transform(&dense, &geom.crs, &crs)?
                    .bounding_rect()
            }
            None => {
                if geodesy.is_same(features.crs(), &crs)? {
                    features.total_bounds()
                } else {
                    features.to_crs(&crs, geodesy)?.total_bounds()
                }
            }
        }
        .ok_or_else(|| GeocubeError::configuration("cannot determine the extent of the grid"))?;

        let (x0, width) = align_pixels(extent.min().x, extent.max().x, resolution.x, align.x);
        let (y0, height) = align_pixels(extent.min().y, extent.max().y, resolution.y, align.y);
        let grid = GridSpec::new(
            crs,
            Affine::new(x0, resolution.x, y0, resolution.y),
            width,
            height,
        );
        info!(
            "Resolved grid {}x{} at ({}, {}) in {}",
            grid.width(),
            grid.height(),
            x0,
            y0,
            grid.crs()
        );
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;
    use geo::{polygon, Geometry, MapCoords};

    struct Offset(f64);

    impl Geodesy for Offset {
        fn transform(&self, geometry: &Geometry<f64>, _: &Crs, _: &Crs) -> Result<Geometry<f64>> {
            Ok(geometry.map_coords(|c| Coord {
                x: c.x + self.0,
                y: c.y + self.0,
            }))
        }
    }

    fn features(crs: Crs) -> FeatureCollection {
        let square = Geometry::Polygon(polygon![
            (x: 0.5, y: 0.5),
            (x: 9.5, y: 0.5),
            (x: 9.5, y: 4.5),
            (x: 0.5, y: 4.5),
        ]);
        FeatureCollection::new(Some(crs), Some(vec![square]), vec![Column::real("v", vec![1.0])])
            .unwrap()
    }

    #[test]
    fn test_align_pixels_negative_resolution() {
        let (origin, size) = align_pixels(0.5, 4.5, -1.0, 0.0);
        assert_eq!(origin, 5.0);
        assert_eq!(size, 5);
    }

    #[test]
    fn test_align_pixels_positive_resolution_with_offset() {
        let (origin, size) = align_pixels(0.5, 9.5, 2.0, 1.0);
        assert_eq!(origin, -1.0);
        assert_eq!(size, 6);
    }

    #[test]
    fn test_align_pixels_degenerate_extent() {
        assert_eq!(align_pixels(3.0, 3.0, 1.0, 0.0), (3.0, 1));
    }

    #[test]
    fn test_resolve_from_features() {
        let fc = features(Crs::epsg(32615));
        let grid = GridConfig::new()
            .with_resolution(Resolution::new(-1.0, 1.0))
            .resolve(&fc, &Offset(0.0))
            .unwrap();
        assert_eq!(grid.crs(), &Crs::epsg(32615));
        assert_eq!(grid.shape(), (5, 10));
        assert_eq!(grid.geo_transform(), [0.0, 1.0, 0.0, 5.0, 0.0, -1.0]);

        let coords = grid.coords();
        assert_eq!(coords.x[0], 0.5);
        assert_eq!(coords.y[0], 4.5);
        assert_eq!(coords.y[4], 0.5);
    }

    #[test]
    fn test_resolution_is_required_without_like() {
        let err = GridConfig::new()
            .resolve(&features(Crs::wgs84()), &Offset(0.0))
            .unwrap_err();
        assert!(matches!(err, GeocubeError::Configuration(_)));
    }

    #[test]
    fn test_like_conflicts() {
        let like = GridSpec::new(Crs::wgs84(), Affine::new(0.0, 1.0, 5.0, -1.0), 3, 3);
        for config in [
            GridConfig::new().with_like(like.clone()).with_resolution(Resolution::square(1.0)),
            GridConfig::new().with_like(like.clone()).with_output_crs(Crs::epsg(3857)),
            GridConfig::new().with_like(like.clone()).with_align(Align::new(0.5, 0.5)),
        ] {
            let err = config.resolve(&features(Crs::wgs84()), &Offset(0.0)).unwrap_err();
            assert!(matches!(err, GeocubeError::Configuration(_)));
        }

        let grid = GridConfig::new()
            .with_like(like.clone())
            .resolve(&features(Crs::epsg(32615)), &Offset(0.0))
            .unwrap();
        assert_eq!(grid, like);
    }

    #[test]
    fn test_zero_resolution_is_rejected() {
        let err = GridConfig::new()
            .with_resolution(Resolution::new(0.0, 1.0))
            .resolve(&features(Crs::wgs84()), &Offset(0.0))
            .unwrap_err();
        assert!(matches!(err, GeocubeError::Configuration(_)));
    }

    #[test]
    fn test_geom_overrides_feature_bounds() {
        let geom = BoundingGeometry::from_bbox(0.0, 0.0, 2.0, 2.0, Crs::epsg(32615));
        let grid = GridConfig::new()
            .with_resolution(Resolution::square(1.0))
            .with_geom(geom)
            .resolve(&features(Crs::epsg(32615)), &Offset(0.0))
            .unwrap();
        assert_eq!(grid.shape(), (2, 2));
    }

    #[test]
    fn test_output_crs_reprojects_extent() {
        let grid = GridConfig::new()
            .with_resolution(Resolution::square(1.0))
            .with_output_crs(Crs::epsg(3857))
            .resolve(&features(Crs::wgs84()), &Offset(100.0))
            .unwrap();
        assert_eq!(grid.crs(), &Crs::epsg(3857));
        assert_eq!(grid.geo_transform()[0], 100.0);
        assert_eq!(grid.geo_transform()[3], 105.0);
    }

    /// Keeps x and bends horizontal edges down by `x * (2 - x)`.
    struct Bow;

    impl Geodesy for Bow {
        fn transform(&self, geometry: &Geometry<f64>, _: &Crs, _: &Crs) -> Result<Geometry<f64>> {
            Ok(geometry.map_coords(|c| Coord {
                x: c.x,
                y: c.y - c.x * (2.0 - c.x),
            }))
        }
    }

    #[test]
    fn test_geom_edges_are_densified_before_reprojection() {
        let geom = BoundingGeometry::from_bbox(0.0, 0.0, 2.0, 1.0, Crs::wgs84());
        let grid = GridConfig::new()
            .with_resolution(Resolution::new(-0.5, 0.5))
            .with_geom(geom)
            .resolve(&features(Crs::epsg(32615)), &Bow)
            .unwrap();
        // corners alone stay within y >= 0; the bent bottom edge reaches -1
        assert!(grid.bounds().min().y <= -1.0 + 1e-9);
        assert_eq!(grid.bounds().max().y, 1.0);
    }

    #[test]
    fn test_target_crs_precedence() {
        let fc = features(Crs::epsg(32615));
        assert_eq!(GridConfig::new().target_crs(&fc), Crs::epsg(32615));
        assert_eq!(
            GridConfig::new().with_output_crs(Crs::wgs84()).target_crs(&fc),
            Crs::wgs84()
        );
        let like = GridSpec::new(Crs::epsg(3857), Affine::new(0.0, 1.0, 5.0, -1.0), 3, 3);
        assert_eq!(GridConfig::new().with_like(like).target_crs(&fc), Crs::epsg(3857));
    }

    #[test]
    fn test_pixel_mapping() {
        let grid = GridSpec::new(Crs::wgs84(), Affine::new(10.0, 2.0, 20.0, -2.0), 4, 3);
        assert_eq!(grid.pixel_of(Coord { x: 11.0, y: 19.0 }), Some((0, 0)));
        assert_eq!(grid.pixel_of(Coord { x: 17.9, y: 14.1 }), Some((2, 3)));
        assert_eq!(grid.pixel_of(Coord { x: 9.0, y: 19.0 }), None);
        assert_eq!(grid.pixel_center(1, 1), Coord { x: 13.0, y: 17.0 });
        assert_eq!(grid.align(), Align::new(0.0, 0.0));

        assert_eq!(
            grid.pixel_rect(2, 3),
            Rect::new(Coord { x: 16.0, y: 14.0 }, Coord { x: 18.0, y: 16.0 })
        );
    }

    #[test]
    fn test_empty_grid_maps_nothing() {
        let grid = GridSpec::new(Crs::wgs84(), Affine::new(10.0, 2.0, 20.0, -2.0), 0, 0);
        assert!(grid.is_empty());
        assert_eq!(grid.pixel_of(Coord { x: 10.0, y: 20.0 }), None);
        assert!(grid.coords().x.is_empty());
    }

    #[test]
    fn test_gdal_round_trip() {
        let t = Affine::new(1.0, 0.5, 2.0, -0.5);
        assert_eq!(Affine::from_gdal(t.to_gdal()), t);
        assert!(t.is_rectilinear());
    }
}
