use geo::{Area, Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;
use crate::geometric::projection::UtmProjector;

/// Ordered (longitude, latitude) vertices of one boundary, in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRing(pub Vec<Coord<f64>>);

/// Exterior ring plus holes. Holes are assumed to sit inside the exterior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPolygon {
    pub exterior: GeoRing,
    pub interiors: Vec<GeoRing>,
}

impl GeoRing {
    /// Wrap vertices as given, open or closed
    pub fn new(coords: Vec<Coord<f64>>) -> Self {
        GeoRing(coords)
    }

    /// Build a ring from (lon, lat) pairs
    pub fn from_lonlat(points: &[(f64, f64)]) -> Self {
        GeoRing(points.iter().map(|&(x, y)| Coord { x, y }).collect())
    }

    /// Vertices as stored, including a closing duplicate if present
    pub fn coords(&self) -> &[Coord<f64>] {
        &self.0
    }

    /// First and last vertices are equal (and there are at least two)
    pub fn is_closed(&self) -> bool {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) => self.0.len() > 1 && first == last,
            _ => false,
        }
    }

    /// Append the first vertex when the ring is open. Idempotent.
    pub fn close(&mut self) {
        if let Some(&first) = self.0.first() {
            if !self.is_closed() {
                self.0.push(first);
            }
        }
    }

    /// Closed copy of this ring
    pub fn closed(&self) -> GeoRing {
        let mut ring = self.clone();
        ring.close();
        ring
    }

    /// Number of distinct vertices, ignoring the closing duplicate
    pub fn distinct_vertices(&self) -> usize {
        let open = if self.is_closed() {
            &self.0[..self.0.len() - 1]
        } else {
            &self.0[..]
        };
        let mut seen: Vec<Coord<f64>> = Vec::with_capacity(open.len());
        for c in open {
            if !seen.contains(c) {
                seen.push(*c);
            }
        }
        seen.len()
    }

    /// A usable ring has at least 3 distinct vertices.
    ///
    /// Returns `InvalidGeometry` otherwise, empty rings included.
    pub fn validate(&self) -> Result<(), DatasetError> {
        let n = self.distinct_vertices();
        if n < 3 {
            return Err(DatasetError::invalid_geometry(format!(
                "ring needs at least 3 distinct vertices, got {}",
                n
            )));
        }
        Ok(())
    }

    /// Closed ring with every vertex in its own UTM zone (easting, northing)
    pub fn project(&self) -> Result<LineString<f64>, DatasetError> {
        self.project_with(&mut UtmProjector::new()?)
    }

    /// Same as [`GeoRing::project`], reusing the zone definitions of `projector`
    pub fn project_with(
        &self,
        projector: &mut UtmProjector,
    ) -> Result<LineString<f64>, DatasetError> {
        self.validate()?;
        let projected = self
            .closed()
            .0
            .iter()
            .map(|c| {
                projector.project(c.x, c.y).map(|utm| Coord {
                    x: utm.easting,
                    y: utm.northing,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LineString::new(projected))
    }

    /// Ground area enclosed by this ring in square meters
    pub fn area_m2(&self) -> Result<f64, DatasetError> {
        self.area_m2_with(&mut UtmProjector::new()?)
    }

    fn area_m2_with(&self, projector: &mut UtmProjector) -> Result<f64, DatasetError> {
        let projected = self.project_with(projector)?;
        Ok(shoelace(&projected).abs())
    }

    pub fn to_line_string(&self) -> LineString<f64> {
        LineString::new(self.closed().0)
    }
}

impl From<&LineString<f64>> for GeoRing {
    fn from(line: &LineString<f64>) -> Self {
        GeoRing(line.0.clone())
    }
}

impl GeoPolygon {
    pub fn new(exterior: GeoRing, interiors: Vec<GeoRing>) -> Self {
        GeoPolygon {
            exterior,
            interiors,
        }
    }

    /// Polygon without holes
    pub fn simple(exterior: GeoRing) -> Self {
        Self::new(exterior, Vec::new())
    }

    /// Ground area in square meters: exterior minus holes
    pub fn area_m2(&self) -> Result<f64, DatasetError> {
        area_m2(self)
    }

    /// Same polygon as a `geo::Polygon` in degrees
    pub fn to_geo(&self) -> Polygon<f64> {
        Polygon::new(
            self.exterior.to_line_string(),
            self.interiors.iter().map(GeoRing::to_line_string).collect(),
        )
    }
}

impl From<&Polygon<f64>> for GeoPolygon {
    fn from(polygon: &Polygon<f64>) -> Self {
        GeoPolygon::new(
            GeoRing::from(polygon.exterior()),
            polygon.interiors().iter().map(GeoRing::from).collect(),
        )
    }
}

/// Signed planar area of a ring via the shoelace formula.
/// Counter-clockwise rings are positive.
pub fn shoelace(ring: &LineString<f64>) -> f64 {
    Polygon::new(ring.clone(), Vec::new()).signed_area()
}

/// Ground area of a polygon in square meters.
///
/// Each ring is closed and projected vertex by vertex into UTM, its planar area
/// taken, and hole areas are subtracted from the exterior. A footprint whose
/// vertices fall in two zones mixes two planar frames and its area is wrong.
pub fn area_m2(polygon: &GeoPolygon) -> Result<f64, DatasetError> {
    let mut projector = UtmProjector::new()?;
    let mut area = polygon.exterior.area_m2_with(&mut projector)?;
    for hole in &polygon.interiors {
        area -= hole.area_m2_with(&mut projector)?;
    }
    Ok(area)
}
