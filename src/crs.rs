use std::fmt;

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use geo::{Coord, Geometry, MapCoords};

use crate::error::{GeocubeError, Result};

/// A coordinate reference system as given by the user or a data source.
///
/// Holds any definition GDAL's `SetFromUserInput` understands
/// (`EPSG:32615`, WKT, PROJ strings, ...). Two `Crs` values that differ
/// textually may still describe the same system; use [`Geodesy::is_same`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Crs(String);

impl Crs {
    pub fn new(definition: impl Into<String>) -> Self {
        Self(definition.into().trim().to_string())
    }

    pub fn epsg(code: u32) -> Self {
        Self(format!("EPSG:{}", code))
    }

    /// Geographic WGS 84, the fallback for data without a CRS.
    pub fn wgs84() -> Self {
        Self::epsg(4326)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_spatial_ref(&self) -> Result<SpatialRef> {
        let mut srs = SpatialRef::from_definition(&self.0)
            .map_err(|e| GeocubeError::crs(format!("cannot parse '{}': {}", self.0, e)))?;
        srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        Ok(srs)
    }

    /// Well-known text of this CRS, as stored in raster files.
    pub fn to_wkt(&self) -> Result<String> {
        Ok(self.to_spatial_ref()?.to_wkt()?)
    }

    fn normalized(&self) -> String {
        self.0.to_ascii_uppercase()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Crs {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Crs {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// CRS comparison and geometry reprojection.
///
/// The grid assembler never does projection math itself; it asks an
/// implementation of this trait. [`GdalGeodesy`] is the default.
pub trait Geodesy: Send + Sync {
    /// Whether `a` and `b` describe the same coordinate system.
    fn is_same(&self, a: &Crs, b: &Crs) -> Result<bool> {
        Ok(a.normalized() == b.normalized())
    }

    fn transform(&self, geometry: &Geometry<f64>, from: &Crs, to: &Crs) -> Result<Geometry<f64>>;

    fn transform_all(
        &self,
        geometries: &[Geometry<f64>],
        from: &Crs,
        to: &Crs,
    ) -> Result<Vec<Geometry<f64>>> {
        if self.is_same(from, to)? {
            return Ok(geometries.to_vec());
        }
        geometries
            .iter()
            .map(|geometry| self.transform(geometry, from, to))
            .collect()
    }
}

/// Reprojection through GDAL/OSR (and therefore PROJ).
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalGeodesy;

impl GdalGeodesy {
    pub fn new() -> Self {
        Self
    }

    fn transformer(from: &Crs, to: &Crs) -> Result<CoordTransform> {
        let source = from.to_spatial_ref()?;
        let target = to.to_spatial_ref()?;
        CoordTransform::new(&source, &target)
            .map_err(|e| GeocubeError::crs(format!("no transform {} -> {}: {}", from, to, e)))
    }

    fn apply(transform: &CoordTransform, geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
        geometry.try_map_coords(|coord: Coord<f64>| -> Result<Coord<f64>> {
            let mut xs = [coord.x];
            let mut ys = [coord.y];
            transform
                .transform_coords(&mut xs, &mut ys, &mut [])
                .map_err(|e| GeocubeError::crs(e.to_string()))?;
            Ok(Coord { x: xs[0], y: ys[0] })
        })
    }
}

impl Geodesy for GdalGeodesy {
    fn is_same(&self, a: &Crs, b: &Crs) -> Result<bool> {
        if a.normalized() == b.normalized() {
            return Ok(true);
        }
        Ok(a.to_spatial_ref()? == b.to_spatial_ref()?)
    }

    fn transform(&self, geometry: &Geometry<f64>, from: &Crs, to: &Crs) -> Result<Geometry<f64>> {
        let transform = Self::transformer(from, to)?;
        Self::apply(&transform, geometry)
    }

    fn transform_all(
        &self,
        geometries: &[Geometry<f64>],
        from: &Crs,
        to: &Crs,
    ) -> Result<Vec<Geometry<f64>>> {
        if self.is_same(from, to)? {
            return Ok(geometries.to_vec());
        }
        let transform = Self::transformer(from, to)?;
        geometries
            .iter()
            .map(|geometry| Self::apply(&transform, geometry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    struct Shift;

    impl Geodesy for Shift {
        fn transform(&self, geometry: &Geometry<f64>, _: &Crs, _: &Crs) -> Result<Geometry<f64>> {
            Ok(geometry.map_coords(|c| Coord {
                x: c.x + 10.0,
                y: c.y,
            }))
        }
    }

    #[test]
    fn test_crs_constructors() {
        assert_eq!(Crs::epsg(32615).as_str(), "EPSG:32615");
        assert_eq!(Crs::wgs84(), Crs::new("  EPSG:4326 "));
        assert_eq!(Crs::from("epsg:3857").to_string(), "epsg:3857");
    }

    #[test]
    fn test_default_is_same_ignores_case() {
        let geodesy = Shift;
        assert!(geodesy
            .is_same(&Crs::new("epsg:4326"), &Crs::new("EPSG:4326"))
            .unwrap());
        assert!(!geodesy
            .is_same(&Crs::new("EPSG:4326"), &Crs::new("EPSG:3857"))
            .unwrap());
    }

    #[test]
    fn test_transform_all_skips_identical_crs() {
        let geodesy = Shift;
        let geoms = vec![Geometry::Point(point!(x: 1.0, y: 2.0))];

        let same = geodesy
            .transform_all(&geoms, &Crs::wgs84(), &Crs::wgs84())
            .unwrap();
        assert_eq!(same, geoms);

        let moved = geodesy
            .transform_all(&geoms, &Crs::wgs84(), &Crs::epsg(3857))
            .unwrap();
        assert_eq!(moved, vec![Geometry::Point(point!(x: 11.0, y: 2.0))]);
    }
}
