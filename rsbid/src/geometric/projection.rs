//! Coordinate transforms used by the area engine and the pitch solver.
//!
//! Both transforms take geographic WGS84 degrees in (longitude, latitude) order.
//! UTM projection goes through proj4rs, one `+proj=utm` definition per zone and
//! hemisphere, built on first use and kept by the projector.

use crate::error::DatasetError;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use std::collections::hash_map::{Entry, HashMap};

/// WGS84 semi-major axis (meters)
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

const WGS84_LONGLAT: &str = "+proj=longlat +datum=WGS84 +no_defs +type=crs";

const ZONE_LETTERS: &[u8] = b"CDEFGHJKLMNPQRSTUVWXX";

/// Planar coordinate in a UTM zone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtmCoord {
    pub easting: f64,
    pub northing: f64,
    pub zone_number: u8,
    pub zone_letter: char,
}

/// UTM zone number for a position, including the Norway and Svalbard exceptions.
pub fn zone_number(lon: f64, lat: f64) -> u8 {
    // Normalize longitude into [-180, 180)
    let lon = (lon.rem_euclid(360.0) + 540.0).rem_euclid(360.0) - 180.0;

    if (56.0..64.0).contains(&lat) && (3.0..12.0).contains(&lon) {
        return 32;
    }

    if (72.0..=84.0).contains(&lat) && lon >= 0.0 {
        if lon < 9.0 {
            return 31;
        } else if lon < 21.0 {
            return 33;
        } else if lon < 33.0 {
            return 35;
        } else if lon < 42.0 {
            return 37;
        }
    }

    (((lon + 180.0) / 6.0) as u8 % 60) + 1
}

/// Latitude band letter, `None` outside [-80, 84]
pub fn zone_letter(lat: f64) -> Option<char> {
    if !(-80.0..=84.0).contains(&lat) {
        return None;
    }
    let index = ((lat + 80.0) as usize) >> 3;
    ZONE_LETTERS.get(index).map(|&b| b as char)
}

fn proj_error(err: proj4rs::errors::Error) -> DatasetError {
    DatasetError::invalid_geometry(format!("projection failed: {:?}", err))
}

fn utm_definition(zone_number: u8, south: bool) -> String {
    format!(
        "+proj=utm +zone={}{} +datum=WGS84 +units=m +no_defs +type=crs",
        zone_number,
        if south { " +south" } else { "" }
    )
}

/// WGS84 to UTM projector with a zone-keyed cache of target definitions.
///
/// Every vertex still picks its own zone, so two vertices of one ring can land
/// in different zones near a zone boundary.
pub struct UtmProjector {
    geographic: Proj,
    zones: HashMap<(u8, bool), Proj>,
}

impl UtmProjector {
    /// Projector with the geographic source CRS and no zones yet
    pub fn new() -> Result<Self, DatasetError> {
        Ok(UtmProjector {
            geographic: Proj::from_proj_string(WGS84_LONGLAT).map_err(proj_error)?,
            zones: HashMap::new(),
        })
    }

    /// Number of zone definitions built so far
    pub fn cached_zones(&self) -> usize {
        self.zones.len()
    }

    fn zone(
        zones: &mut HashMap<(u8, bool), Proj>,
        zone_number: u8,
        south: bool,
    ) -> Result<&Proj, DatasetError> {
        match zones.entry((zone_number, south)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let proj = Proj::from_proj_string(&utm_definition(zone_number, south))
                    .map_err(proj_error)?;
                Ok(entry.insert(proj))
            }
        }
    }

    /// Project a geographic position into the UTM zone that contains it.
    pub fn project(&mut self, lon: f64, lat: f64) -> Result<UtmCoord, DatasetError> {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(DatasetError::invalid_geometry(format!(
                "non-finite coordinate ({}, {})",
                lon, lat
            )));
        }
        let zone_letter = zone_letter(lat).ok_or_else(|| {
            DatasetError::invalid_geometry(format!(
                "latitude {} outside the UTM range [-80, 84]",
                lat
            ))
        })?;
        let zone_number = zone_number(lon, lat);

        let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
        let target = Self::zone(&mut self.zones, zone_number, lat < 0.0)?;
        transform(&self.geographic, target, &mut point).map_err(proj_error)?;

        Ok(UtmCoord {
            easting: point.0,
            northing: point.1,
            zone_number,
            zone_letter,
        })
    }
}

/// One-off projection of a single position, see [`UtmProjector::project`].
pub fn to_utm(lon: f64, lat: f64) -> Result<UtmCoord, DatasetError> {
    UtmProjector::new()?.project(lon, lat)
}

/// Geographic (lon, lat, height above ellipsoid) to geocentric X, Y, Z in meters.
///
/// Same result as an EPSG:4326 to EPSG:4978 transform.
pub fn to_geocentric(lon: f64, lat: f64, height: f64) -> [f64; 3] {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();
    let (sin_lat, cos_lat) = lat_rad.sin_cos();
    let (sin_lon, cos_lon) = lon_rad.sin_cos();

    // Prime vertical radius of curvature
    let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();

    [
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - e2) + height) * sin_lat,
    ]
}
