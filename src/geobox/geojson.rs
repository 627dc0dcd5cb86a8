//! Bounding geometries given as GeoJSON.

use std::str::FromStr;

use geo::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon, Rect,
};
use serde::Deserialize;
use serde_json::Value;

use crate::crs::Crs;
use crate::error::{GeocubeError, Result};

/// A geometry limiting the extent of the output grid, with its CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingGeometry {
    pub geometry: Geometry<f64>,
    pub crs: Crs,
}

impl BoundingGeometry {
    pub fn new(geometry: Geometry<f64>, crs: Crs) -> Self {
        Self { geometry, crs }
    }

    /// Rectangle `(minx, miny, maxx, maxy)` in `crs`.
    pub fn from_bbox(minx: f64, miny: f64, maxx: f64, maxy: f64, crs: Crs) -> Self {
        let rect = Rect::new(Coord { x: minx, y: miny }, Coord { x: maxx, y: maxy });
        Self::new(Geometry::Polygon(rect.to_polygon()), crs)
    }

    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| GeocubeError::GeoJson(format!("not valid JSON: {}", e)))?;
        Self::from_geojson_value(&value)
    }

    /// Parse a GeoJSON geometry, Feature or FeatureCollection.
    ///
    /// The CRS is read from a `{"crs": {"properties": {"name": ...}}}`
    /// member and defaults to EPSG:4326.
    pub fn from_geojson_value(value: &Value) -> Result<Self> {
        let crs = value
            .pointer("/crs/properties/name")
            .and_then(Value::as_str)
            .map(Crs::new)
            .unwrap_or_else(Crs::wgs84);
        let object: GeoJson = GeoJson::deserialize(value)
            .map_err(|e| GeocubeError::GeoJson(e.to_string()))?;
        Ok(Self::new(object.into_geometry()?, crs))
    }
}

impl FromStr for BoundingGeometry {
    type Err = GeocubeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_geojson_str(s)
    }
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct Position(Vec<f64>);

impl Position {
    fn coord(&self) -> Result<Coord<f64>> {
        match self.0.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(GeocubeError::GeoJson(format!(
                "position needs at least two numbers, got {:?}",
                self.0
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJson {
    Point {
        coordinates: Position,
    },
    MultiPoint {
        coordinates: Vec<Position>,
    },
    LineString {
        coordinates: Vec<Position>,
    },
    MultiLineString {
        coordinates: Vec<Vec<Position>>,
    },
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<GeoJson>,
    },
    Feature {
        geometry: Option<Box<GeoJson>>,
    },
    FeatureCollection {
        features: Vec<GeoJson>,
    },
}

fn line(positions: &[Position]) -> Result<LineString<f64>> {
    positions
        .iter()
        .map(Position::coord)
        .collect::<Result<Vec<_>>>()
        .map(LineString::new)
}

fn polygon(rings: &[Vec<Position>]) -> Result<Polygon<f64>> {
    let (exterior, interiors) = rings
        .split_first()
        .ok_or_else(|| GeocubeError::GeoJson("polygon without rings".into()))?;
    Ok(Polygon::new(
        line(exterior)?,
        interiors.iter().map(|r| line(r)).collect::<Result<_>>()?,
    ))
}

impl GeoJson {
    fn into_geometry(self) -> Result<Geometry<f64>> {
        let geometry = match self {
            GeoJson::Point { coordinates } => Geometry::Point(Point(coordinates.coord()?)),
            GeoJson::MultiPoint { coordinates } => Geometry::MultiPoint(MultiPoint::new(
                coordinates
                    .iter()
                    .map(|p| p.coord().map(Point))
                    .collect::<Result<_>>()?,
            )),
            GeoJson::LineString { coordinates } => Geometry::LineString(line(&coordinates)?),
            GeoJson::MultiLineString { coordinates } => Geometry::MultiLineString(
                MultiLineString::new(coordinates.iter().map(|l| line(l)).collect::<Result<_>>()?),
            ),
            GeoJson::Polygon { coordinates } => Geometry::Polygon(polygon(&coordinates)?),
            GeoJson::MultiPolygon { coordinates } => Geometry::MultiPolygon(MultiPolygon::new(
                coordinates
                    .iter()
                    .map(|p| polygon(p))
                    .collect::<Result<_>>()?,
            )),
            GeoJson::GeometryCollection { geometries } => collection(geometries)?,
            GeoJson::Feature { geometry } => geometry
                .ok_or_else(|| GeocubeError::GeoJson("feature without geometry".into()))?
                .into_geometry()?,
            GeoJson::FeatureCollection { features } => collection(features)?,
        };
        Ok(geometry)
    }
}

fn collection(items: Vec<GeoJson>) -> Result<Geometry<f64>> {
    if items.is_empty() {
        return Err(GeocubeError::GeoJson("empty geometry collection".into()));
    }
    let geometries = items
        .into_iter()
        .map(GeoJson::into_geometry)
        .collect::<Result<Vec<_>>>()?;
    Ok(Geometry::GeometryCollection(geometries.into_iter().collect()))
}
