use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use url::Url;

use crate::collect::global_variables::{
    DEFAULT_PITCH_ANGLE, STREETVIEW_FOV, STREETVIEW_METADATA_URL, STREETVIEW_SIZE, STREETVIEW_URL,
};
use crate::geometric::building::BuildingRecord;
use crate::geometric::pitch::pitch_degrees;
use crate::imagery::client::ImageryClient;

/// Metadata request for the panorama nearest to a point.
/// Metadata lookups are not billed.
pub fn metadata_url(lon: f64, lat: f64, api_key: &str) -> Result<Url> {
    let location = format!("{},{}", lat, lon);
    Url::parse_with_params(
        STREETVIEW_METADATA_URL,
        &[
            ("location", location.as_str()),
            ("source", "outdoor"),
            ("key", api_key),
        ],
    )
    .context("Failed to build Street View metadata URL")
}

/// Image request looking at `(lon, lat)` with the given camera pitch
pub fn image_url(lon: f64, lat: f64, pitch: f64, api_key: &str) -> Result<Url> {
    let location = format!("{},{}", lat, lon);
    let fov = STREETVIEW_FOV.to_string();
    let pitch = pitch.to_string();
    Url::parse_with_params(
        STREETVIEW_URL,
        &[
            ("size", STREETVIEW_SIZE),
            ("location", location.as_str()),
            ("fov", fov.as_str()),
            ("pitch", pitch.as_str()),
            ("source", "outdoor"),
            ("key", api_key),
        ],
    )
    .context("Failed to build Street View image URL")
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    status: String,
    location: Option<MetadataLocation>,
}

#[derive(Debug, Deserialize)]
struct MetadataLocation {
    lat: f64,
    lng: f64,
}

/// Camera `(lon, lat)` from a metadata response, `None` unless the status is `OK`
pub fn parse_camera_position(body: &[u8]) -> Result<Option<(f64, f64)>> {
    let metadata: MetadataResponse =
        serde_json::from_slice(body).context("Failed to parse Street View metadata")?;
    if metadata.status != "OK" {
        return Ok(None);
    }
    Ok(metadata.location.map(|location| (location.lng, location.lat)))
}

/// How the camera pitch of a Street View image is chosen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PitchStrategy {
    /// Same pitch for every building
    Fixed(f64),
    /// Pitch from the building height and the camera position, `default_pitch` when either is missing
    HeightDerived { default_pitch: f64 },
}

impl Default for PitchStrategy {
    fn default() -> Self {
        PitchStrategy::Fixed(DEFAULT_PITCH_ANGLE)
    }
}

impl PitchStrategy {
    /// Image directory under `images/`
    pub fn variant(&self) -> &'static str {
        match self {
            PitchStrategy::Fixed(_) => "fixed_pitch",
            PitchStrategy::HeightDerived { .. } => "height_pitch",
        }
    }
}

/// Pitch for one building. Only the height-derived strategy asks for metadata,
/// and only when the building has a usable height. A failed metadata lookup
/// falls back to the default pitch.
pub fn resolve_pitch<C: ImageryClient + ?Sized>(
    client: &C,
    building: &BuildingRecord,
    strategy: PitchStrategy,
) -> Result<f64> {
    match strategy {
        PitchStrategy::Fixed(pitch) => Ok(pitch),
        PitchStrategy::HeightDerived { default_pitch } => {
            let target = (building.longitude, building.latitude);
            let height = building
                .building_height
                .filter(|h| *h != 0.0 && h.is_finite());
            let observer = match height {
                Some(_) => match client.camera_position(target.0, target.1) {
                    Ok(position) => position,
                    Err(e) => {
                        warn!(
                            "Street View metadata lookup failed for building {}, using pitch {}: {:#}",
                            building.osm_id, default_pitch, e
                        );
                        None
                    }
                },
                None => None,
            };
            let pitch = pitch_degrees(observer, target, height, default_pitch)
                .with_context(|| format!("Failed to derive pitch for building {}", building.osm_id))?;
            Ok(pitch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imagery::aerial::AerialRequest;
    use approx::assert_abs_diff_eq;
    use std::cell::Cell;
    use std::collections::HashMap;

    struct CameraOnly {
        position: Option<(f64, f64)>,
        lookups: Cell<usize>,
    }

    impl ImageryClient for CameraOnly {
        fn camera_position(&self, _lon: f64, _lat: f64) -> Result<Option<(f64, f64)>> {
            self.lookups.set(self.lookups.get() + 1);
            Ok(self.position)
        }

        fn streetview_image(&self, _lon: f64, _lat: f64, _pitch: f64) -> Result<Vec<u8>> {
            unreachable!()
        }

        fn aerial_image(&self, _request: &AerialRequest) -> Result<Vec<u8>> {
            unreachable!()
        }
    }

    fn building(height: Option<f64>) -> BuildingRecord {
        BuildingRecord {
            osm_id: 42,
            longitude: -0.1276,
            latitude: 51.5072,
            building_height: height,
            levels: None,
            building_type: "house".to_string(),
            building_material: String::new(),
            roof_material: String::new(),
            roof_shape: String::new(),
            name: String::new(),
            street: String::new(),
            housenumber: String::new(),
            postcode: String::new(),
            city: String::new(),
            footprint_wkt: String::new(),
            footprint_area: 0.0,
        }
    }

    #[test]
    fn test_image_url_parameters() {
        let url = image_url(-0.1276, 51.5072, 22.5, "secret").unwrap();
        assert!(url.as_str().starts_with(STREETVIEW_URL));
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["size"], "350x350");
        assert_eq!(params["location"], "51.5072,-0.1276");
        assert_eq!(params["fov"], "70");
        assert_eq!(params["pitch"], "22.5");
        assert_eq!(params["source"], "outdoor");
        assert_eq!(params["key"], "secret");
    }

    #[test]
    fn test_metadata_url_parameters() {
        let url = metadata_url(2.2945, 48.8584, "secret").unwrap();
        assert!(url.as_str().starts_with(STREETVIEW_METADATA_URL));
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["location"], "48.8584,2.2945");
        assert!(!params.contains_key("pitch"));
    }

    #[test]
    fn test_parse_camera_position() {
        let ok = br#"{"status":"OK","location":{"lat":51.5,"lng":-0.12},"pano_id":"x"}"#;
        assert_eq!(parse_camera_position(ok).unwrap(), Some((-0.12, 51.5)));

        let zero = br#"{"status":"ZERO_RESULTS"}"#;
        assert_eq!(parse_camera_position(zero).unwrap(), None);

        assert!(parse_camera_position(b"<html>").is_err());
    }

    #[test]
    fn test_variant_directories() {
        assert_eq!(PitchStrategy::Fixed(30.0).variant(), "fixed_pitch");
        assert_eq!(
            PitchStrategy::HeightDerived { default_pitch: 30.0 }.variant(),
            "height_pitch"
        );
    }

    #[test]
    fn test_fixed_pitch_skips_metadata() {
        let client = CameraOnly {
            position: Some((-0.1280, 51.5072)),
            lookups: Cell::new(0),
        };
        let pitch = resolve_pitch(&client, &building(Some(30.0)), PitchStrategy::Fixed(12.0)).unwrap();
        assert_eq!(pitch, 12.0);
        assert_eq!(client.lookups.get(), 0);
    }

    #[test]
    fn test_height_pitch_without_height_skips_metadata() {
        let client = CameraOnly {
            position: Some((-0.1280, 51.5072)),
            lookups: Cell::new(0),
        };
        let strategy = PitchStrategy::HeightDerived { default_pitch: 30.0 };
        assert_eq!(resolve_pitch(&client, &building(None), strategy).unwrap(), 30.0);
        assert_eq!(resolve_pitch(&client, &building(Some(0.0)), strategy).unwrap(), 30.0);
        assert_eq!(client.lookups.get(), 0);
    }

    #[test]
    fn test_height_pitch_uses_camera() {
        // About 28 m west of the target
        let client = CameraOnly {
            position: Some((-0.1280, 51.5072)),
            lookups: Cell::new(0),
        };
        let strategy = PitchStrategy::HeightDerived { default_pitch: 30.0 };
        let pitch = resolve_pitch(&client, &building(Some(30.0)), strategy).unwrap();
        assert_eq!(client.lookups.get(), 1);
        assert!(pitch > 20.0 && pitch < 30.0, "pitch was {}", pitch);
    }

    #[test]
    fn test_height_pitch_without_camera_falls_back() {
        let client = CameraOnly {
            position: None,
            lookups: Cell::new(0),
        };
        let strategy = PitchStrategy::HeightDerived { default_pitch: 30.0 };
        let pitch = resolve_pitch(&client, &building(Some(30.0)), strategy).unwrap();
        assert_abs_diff_eq!(pitch, 30.0);
    }

    struct BrokenMetadata;

    impl ImageryClient for BrokenMetadata {
        fn camera_position(&self, _lon: f64, _lat: f64) -> Result<Option<(f64, f64)>> {
            anyhow::bail!("Failed to parse Street View metadata")
        }

        fn streetview_image(&self, _lon: f64, _lat: f64, _pitch: f64) -> Result<Vec<u8>> {
            unreachable!()
        }

        fn aerial_image(&self, _request: &AerialRequest) -> Result<Vec<u8>> {
            unreachable!()
        }
    }

    #[test]
    fn test_height_pitch_metadata_error_falls_back() {
        let strategy = PitchStrategy::HeightDerived { default_pitch: 30.0 };
        let pitch = resolve_pitch(&BrokenMetadata, &building(Some(30.0)), strategy).unwrap();
        assert_abs_diff_eq!(pitch, 30.0);
    }
}
