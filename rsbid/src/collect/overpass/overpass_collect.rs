use anyhow::{Context, Result};
use log::{debug, info};
use reqwest::blocking::Client;
use std::fs::{create_dir_all, write};
use std::path::Path;
use std::time::Duration;

use crate::collect::global_variables::{
    DEFAULT_BBOX, DEFAULT_BUILDING_TYPES, DEFAULT_REQUIRED_TAGS, OVERPASS_TIMEOUT_SECS,
    OVERPASS_URL,
};
use crate::error::DatasetError;
use crate::geo_core::BoundingBox;
use crate::geometric::building::OsmResponse;

/// Overpass QL query for building ways with inline geometry
#[derive(Debug, Clone, PartialEq)]
pub struct OverpassQuery {
    pub bbox: BoundingBox,
    /// Accepted values of the `building` tag
    pub building_types: Vec<String>,
    /// Tags every returned way must carry
    pub required_tags: Vec<String>,
    /// Maximum number of elements, all matches when `None`
    pub limit: Option<usize>,
    pub timeout_secs: u64,
}

impl Default for OverpassQuery {
    fn default() -> Self {
        let (min_x, min_y, max_x, max_y) = DEFAULT_BBOX;
        OverpassQuery {
            bbox: BoundingBox::new(min_x, min_y, max_x, max_y),
            building_types: DEFAULT_BUILDING_TYPES.iter().map(|s| s.to_string()).collect(),
            required_tags: DEFAULT_REQUIRED_TAGS.iter().map(|s| s.to_string()).collect(),
            limit: None,
            timeout_secs: OVERPASS_TIMEOUT_SECS,
        }
    }
}

impl OverpassQuery {
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_building_types<S: AsRef<str>>(mut self, types: &[S]) -> Self {
        self.building_types = types.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_required_tags<S: AsRef<str>>(mut self, tags: &[S]) -> Self {
        self.required_tags = tags.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Render the query text sent as the `data` form field
    pub fn build(&self) -> String {
        let mut query = format!("[out:json][timeout:{}];\n", self.timeout_secs);
        query.push_str("way\n");
        if !self.building_types.is_empty() {
            query.push_str(&format!(
                "  [\"building\"~\"^({})$\"]\n",
                self.building_types.join("|")
            ));
        } else {
            query.push_str("  [\"building\"]\n");
        }
        for tag in &self.required_tags {
            query.push_str(&format!("  [\"{}\"]\n", tag));
        }
        query.push_str(&format!("  {};\n", self.bbox.to_overpass()));

        match self.limit {
            Some(n) => query.push_str(&format!("out body geom {};", n)),
            None => query.push_str("out body geom;"),
        }
        query
    }
}

/// Fetches building footprints from an Overpass endpoint
pub struct OverpassCollect {
    pub url: String,
    pub content: Option<Vec<u8>>,
    client: Client,
}

impl OverpassCollect {
    pub fn new() -> Result<Self> {
        Self::with_url(OVERPASS_URL)
    }

    pub fn with_url(url: &str) -> Result<Self> {
        // Leave headroom over the server-side timeout
        let client = Client::builder()
            .timeout(Duration::from_secs(OVERPASS_TIMEOUT_SECS + 60))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(OverpassCollect {
            url: url.to_string(),
            content: None,
            client,
        })
    }

    /// POST the query and keep the raw response body.
    /// A non-success status is an `UpstreamFailure`; the bulk fetch has no partial result.
    pub fn execute(&mut self, query: &OverpassQuery) -> Result<()> {
        let query_text = query.build();
        info!("Querying Overpass at {}", self.url);
        debug!("Overpass query:\n{}", query_text);

        let response = self
            .client
            .post(&self.url)
            .form(&[("data", query_text.as_str())])
            .send()
            .context("Failed to send request to Overpass API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(DatasetError::UpstreamFailure {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            })
            .context("Overpass API returned an error");
        }

        let content_bytes = response
            .bytes()
            .context("Failed to read Overpass response body")?
            .to_vec();

        self.content = Some(content_bytes);
        Ok(())
    }

    /// Parsed view of the last response
    pub fn response(&self) -> Result<OsmResponse> {
        let content = self.content.as_ref().context("No content available")?;
        OsmResponse::from_slice(content)
    }

    pub fn element_count(&self) -> Result<usize> {
        Ok(self.response()?.elements.len())
    }

    /// Save the last response as pretty-printed JSON
    pub fn save_raw<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = self.content.as_ref().context("No content available")?;
        let value: serde_json::Value =
            serde_json::from_slice(content).context("Overpass response is not valid JSON")?;

        if let Some(parent) = path.parent() {
            create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let pretty = serde_json::to_string_pretty(&value).context("Failed to serialize OSM data")?;
        write(path, pretty).with_context(|| format!("Failed to write OSM data to {:?}", path))?;
        Ok(())
    }
}
