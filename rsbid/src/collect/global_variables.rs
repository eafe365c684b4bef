use anyhow::{Context, Result};
use std::fs::create_dir_all;
use std::path::PathBuf;

pub const DATA_PATH: &str = "./data";

pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
/// Server-side query timeout in seconds, also used for the client timeout
pub const OVERPASS_TIMEOUT_SECS: u64 = 500;

/// Great Britain: England, Wales and most of Scotland (west, south, east, north)
pub const DEFAULT_BBOX: (f64, f64, f64, f64) = (-5.8, 49.8, 1.8, 58.7);

pub const DEFAULT_BUILDING_TYPES: &[&str] = &[
    "commercial",
    "retail",
    "office",
    "apartments",
    "residential",
    "house",
    "detached",
    "terrace",
    "semidetached_house",
];

pub const DEFAULT_REQUIRED_TAGS: &[&str] = &["height", "building:levels", "building:material"];

pub const STATIC_MAPS_URL: &str = "https://maps.googleapis.com/maps/api/staticmap";
pub const STREETVIEW_URL: &str = "https://maps.googleapis.com/maps/api/streetview";
pub const STREETVIEW_METADATA_URL: &str = "https://maps.googleapis.com/maps/api/streetview/metadata";

/// Environment variables checked for the Google Maps key, in order
pub const API_KEY_VARS: &[&str] = &["GOOGLE_MAPS_KEY", "GOOGLE_MAPS_API_KEY"];

pub const DEFAULT_PITCH_ANGLE: f64 = 30.0;
pub const STREETVIEW_SIZE: &str = "350x350";
pub const STREETVIEW_FOV: u32 = 70;
/// Street View answers with a small grey placeholder when it has no photo
pub const BLANK_IMAGE_THRESHOLD: usize = 5000;

pub fn get_data_path() -> PathBuf {
    PathBuf::from(DATA_PATH)
}

/// Every file the pipeline reads or writes, derived from one data root
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetPaths {
    root: PathBuf,
}

impl Default for DatasetPaths {
    fn default() -> Self {
        DatasetPaths::new(get_data_path())
    }
}

impl DatasetPaths {
    /// Layout rooted at `root`; nothing is created until `setup_directory_structure`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        DatasetPaths { root: root.into() }
    }

    pub fn osm_dir(&self) -> PathBuf {
        self.root.join("osm")
    }

    pub fn raw_json(&self) -> PathBuf {
        self.osm_dir().join("raw.json")
    }

    pub fn processed_json(&self) -> PathBuf {
        self.osm_dir().join("processed.json")
    }

    pub fn processed_geojson(&self) -> PathBuf {
        self.osm_dir().join("processed.geojson")
    }

    pub fn processed_with_images_json(&self) -> PathBuf {
        self.osm_dir().join("processed_with_images.json")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    /// Directory for one image variant, e.g. `images/fixed_pitch`
    pub fn image_variant_dir(&self, variant: &str) -> PathBuf {
        self.images_dir().join(variant)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn streetview_log(&self) -> PathBuf {
        self.logs_dir().join("streetview.log")
    }

    /// Create the data tree if it does not exist yet
    pub fn setup_directory_structure(&self) -> Result<()> {
        let directories = [
            self.osm_dir(),
            self.image_variant_dir("fixed_pitch"),
            self.image_variant_dir("height_pitch"),
            self.image_variant_dir("aerial"),
            self.logs_dir(),
        ];
        for directory in &directories {
            create_dir_all(directory)
                .with_context(|| format!("Failed to create directory: {:?}", directory))?;
        }
        Ok(())
    }
}
