use anyhow::{Context, Result};
use log::debug;
use reqwest::blocking::{Client, Response};
use std::time::Duration;

use crate::collect::global_variables::{API_KEY_VARS, BLANK_IMAGE_THRESHOLD};
use crate::error::DatasetError;
use crate::imagery::aerial::AerialRequest;
use crate::imagery::streetview::{image_url, metadata_url, parse_camera_position};

/// Remote imagery source. Positions are `(lon, lat)`.
pub trait ImageryClient {
    /// Location of the Street View camera nearest to a point, if any
    fn camera_position(&self, lon: f64, lat: f64) -> Result<Option<(f64, f64)>>;

    /// JPEG bytes of a Street View image looking at a point
    fn streetview_image(&self, lon: f64, lat: f64, pitch: f64) -> Result<Vec<u8>>;

    /// Encoded satellite image
    fn aerial_image(&self, request: &AerialRequest) -> Result<Vec<u8>>;
}

/// Pick the API key: explicit value first, then each variable of `API_KEY_VARS` through `lookup`
pub fn resolve_api_key_with<F>(explicit: Option<&str>, lookup: F) -> Result<String, DatasetError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    API_KEY_VARS
        .iter()
        .filter_map(|var| lookup(var))
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
        .ok_or_else(|| DatasetError::MissingCredential {
            hint: format!("pass --api-key or set {}", API_KEY_VARS.join(" or ")),
        })
}

/// [`resolve_api_key_with`] reading the process environment
pub fn resolve_api_key(explicit: Option<&str>) -> Result<String, DatasetError> {
    resolve_api_key_with(explicit, |var| std::env::var(var).ok())
}

/// Street View answers "no imagery" with a small placeholder instead of an error status
pub fn check_streetview_image(bytes: Vec<u8>) -> Result<Vec<u8>, DatasetError> {
    if bytes.len() < BLANK_IMAGE_THRESHOLD {
        return Err(DatasetError::not_available(format!(
            "image of {} bytes is a placeholder",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Google Maps Platform over blocking HTTP
pub struct GoogleMapsClient {
    api_key: String,
    client: Client,
}

impl GoogleMapsClient {
    /// Blocking client with the crate's request timeout.
    ///
    /// The key is sent as a query parameter on every request and never logged.
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(GoogleMapsClient { api_key, client })
    }

    /// Build a client from `--api-key` or the environment
    pub fn from_env(explicit: Option<&str>) -> Result<Self> {
        let api_key = resolve_api_key(explicit)?;
        Self::new(api_key)
    }

    fn get(&self, url: url::Url) -> Result<Response> {
        debug!("GET {}", url.path());
        let response = self
            .client
            .get(url)
            .send()
            .context("Failed to send request to Google Maps")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(DatasetError::UpstreamFailure {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            }
            .into());
        }
        Ok(response)
    }
}

impl ImageryClient for GoogleMapsClient {
    fn camera_position(&self, lon: f64, lat: f64) -> Result<Option<(f64, f64)>> {
        let url = metadata_url(lon, lat, &self.api_key)?;
        let response = match self.get(url) {
            Ok(response) => response,
            Err(e) => {
                debug!("Street View metadata unavailable: {:#}", e);
                return Ok(None);
            }
        };
        let parsed = response
            .bytes()
            .context("Failed to read Street View metadata")
            .and_then(|body| parse_camera_position(&body));
        match parsed {
            Ok(position) => Ok(position),
            Err(e) => {
                debug!("Street View metadata unusable near ({}, {}): {:#}", lon, lat, e);
                Ok(None)
            }
        }
    }

    fn streetview_image(&self, lon: f64, lat: f64, pitch: f64) -> Result<Vec<u8>> {
        let url = image_url(lon, lat, pitch, &self.api_key)?;
        let bytes = self
            .get(url)?
            .bytes()
            .context("Failed to read Street View image")?
            .to_vec();
        Ok(check_streetview_image(bytes)?)
    }

    fn aerial_image(&self, request: &AerialRequest) -> Result<Vec<u8>> {
        let response = self.get(request.url(&self.api_key)?)?;

        // Errors such as an invalid key come back as text with a 200 status
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if content_type.starts_with("text/") {
            let body = response.text().unwrap_or_default();
            return Err(DatasetError::UpstreamFailure {
                status: 200,
                message: body.chars().take(200).collect(),
            }
            .into());
        }

        Ok(response
            .bytes()
            .context("Failed to read static map image")?
            .to_vec())
    }
}
