use anyhow::{Context, Result};
#[cfg(feature = "proj")]
use proj::Proj;

pub const WGS84_EPSG: i32 = 4326;

/// CRS handling for user-supplied coordinates.
/// The pipeline itself works in WGS84; other CRSs are only accepted at the edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCore {
    pub epsg: i32,
}

impl Default for GeoCore {
    fn default() -> Self {
        GeoCore::new(WGS84_EPSG)
    }
}

impl GeoCore {
    pub fn new(epsg: i32) -> Self {
        GeoCore { epsg }
    }

    pub fn get_epsg(&self) -> i32 {
        self.epsg
    }

    /// Transform coordinates from one CRS to another
    #[cfg(feature = "proj")]
    pub fn transform_coords(from_epsg: i32, to_epsg: i32, x: f64, y: f64) -> Result<(f64, f64)> {
        if from_epsg == to_epsg {
            return Ok((x, y));
        }
        let from_crs = format!("EPSG:{}", from_epsg);
        let to_crs = format!("EPSG:{}", to_epsg);

        let proj = Proj::new_known_crs(&from_crs, &to_crs, None)
            .context("Failed to create Proj transformation")?;

        let result = proj
            .convert((x, y))
            .context("Failed to transform coordinates")?;

        Ok(result)
    }

    /// Without libproj only the identity transform is available
    #[cfg(not(feature = "proj"))]
    pub fn transform_coords(from_epsg: i32, to_epsg: i32, x: f64, y: f64) -> Result<(f64, f64)> {
        if from_epsg == to_epsg {
            return Ok((x, y));
        }
        anyhow::bail!(
            "Transforming EPSG:{} to EPSG:{} requires the `proj` feature",
            from_epsg,
            to_epsg
        )
    }

    /// Bring a bounding box expressed in this CRS into WGS84
    pub fn bbox_to_wgs84(&self, bbox: &BoundingBox) -> Result<BoundingBox> {
        bbox.transform(self.epsg, WGS84_EPSG)
            .with_context(|| format!("Failed to reproject bounding box from EPSG:{}", self.epsg))
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude (west)
    pub min_y: f64, // min latitude (south)
    pub max_x: f64, // max longitude (east)
    pub max_y: f64, // max latitude (north)
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Parse Overpass order `south,west,north,east`
    pub fn from_overpass_str(value: &str) -> Result<Self> {
        let parts = value
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Invalid bounding box '{}'", value))?;
        if parts.len() != 4 {
            anyhow::bail!(
                "Bounding box '{}' must have 4 values: south,west,north,east",
                value
            );
        }
        let bbox = BoundingBox::new(parts[1], parts[0], parts[3], parts[2]);
        if bbox.min_x >= bbox.max_x || bbox.min_y >= bbox.max_y {
            anyhow::bail!("Bounding box '{}' is empty or inverted", value);
        }
        Ok(bbox)
    }

    /// Overpass filter `(south,west,north,east)`
    pub fn to_overpass(&self) -> String {
        format!(
            "({},{},{},{})",
            self.min_y, self.min_x, self.max_y, self.max_x
        )
    }

    /// Transform bounding box to another CRS
    pub fn transform(&self, from_epsg: i32, to_epsg: i32) -> Result<Self> {
        let (min_x, min_y) = GeoCore::transform_coords(from_epsg, to_epsg, self.min_x, self.min_y)?;
        let (max_x, max_y) = GeoCore::transform_coords(from_epsg, to_epsg, self.max_x, self.max_y)?;

        Ok(BoundingBox::new(min_x, min_y, max_x, max_y))
    }
}
