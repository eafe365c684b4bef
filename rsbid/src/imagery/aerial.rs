use anyhow::{Context, Result};
use clap::ValueEnum;
use url::Url;

use crate::collect::global_variables::STATIC_MAPS_URL;

const EARTH_CIRCUMFERENCE: f64 = 40_075_016.686;

/// Estimated ground resolution of a static map tile in meters per pixel
pub fn meters_per_pixel(lat_deg: f64, zoom: u8, scale: u8) -> f64 {
    (lat_deg.to_radians().cos() * EARTH_CIRCUMFERENCE)
        / (256.0 * 2f64.powi(zoom as i32) * scale as f64)
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpg,
    Webp,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }
}

/// North-up satellite image centered on a point
#[derive(Debug, Clone, PartialEq)]
pub struct AerialRequest {
    pub lat: f64,
    pub lon: f64,
    /// 0 is the whole world, about 21 is street level
    pub zoom: u8,
    /// `WIDTHxHEIGHT`, at most 640x640
    pub size: String,
    /// 1 standard, 2 doubles the pixel density
    pub scale: u8,
    pub format: ImageFormat,
    /// e.g. `color:red|40.6892,-74.0445`
    pub marker: Option<String>,
}

impl AerialRequest {
    pub fn new(lat: f64, lon: f64) -> Self {
        AerialRequest {
            lat,
            lon,
            zoom: 19,
            size: "640x640".to_string(),
            scale: 2,
            format: ImageFormat::Png,
            marker: None,
        }
    }

    /// Same settings, different center
    pub fn centered_on(&self, lat: f64, lon: f64) -> Self {
        AerialRequest {
            lat,
            lon,
            ..self.clone()
        }
    }

    pub fn meters_per_pixel(&self) -> f64 {
        meters_per_pixel(self.lat, self.zoom, self.scale)
    }

    pub fn url(&self, api_key: &str) -> Result<Url> {
        let center = format!("{},{}", self.lat, self.lon);
        let zoom = self.zoom.to_string();
        let scale = self.scale.to_string();
        let mut params = vec![
            ("center", center.as_str()),
            ("zoom", zoom.as_str()),
            ("size", self.size.as_str()),
            ("scale", scale.as_str()),
            ("maptype", "satellite"),
            ("format", self.format.as_str()),
            ("key", api_key),
        ];
        if let Some(ref marker) = self.marker {
            params.push(("markers", marker.as_str()));
        }
        Url::parse_with_params(STATIC_MAPS_URL, &params).context("Failed to build static map URL")
    }
}
