use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

#[cfg(feature = "indicatif")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::collect::global_variables::DatasetPaths;
use crate::error::{dataset_error, DatasetError};
use crate::geometric::building::BuildingRecord;
use crate::imagery::aerial::AerialRequest;
use crate::imagery::client::ImageryClient;
use crate::imagery::streetview::{resolve_pitch, PitchStrategy};

pub const AERIAL_VARIANT: &str = "aerial";

#[cfg(feature = "indicatif")]
fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {percent} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Result of one image request
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    /// Fetched and written
    Downloaded(PathBuf),
    /// Already on disk, nothing fetched
    Skipped(PathBuf),
    /// The service has no imagery for this location
    NotAvailable(String),
    Failed(String),
}

impl DownloadOutcome {
    /// Image file backing this outcome
    pub fn path(&self) -> Option<&Path> {
        match self {
            DownloadOutcome::Downloaded(path) | DownloadOutcome::Skipped(path) => Some(path.as_path()),
            _ => None,
        }
    }
}

/// Per-variant tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub downloaded: usize,
    pub skipped: usize,
    pub not_available: usize,
    pub failed: usize,
}

impl DownloadStats {
    /// Count one outcome
    pub fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded(_) => self.downloaded += 1,
            DownloadOutcome::Skipped(_) => self.skipped += 1,
            DownloadOutcome::NotAvailable(_) => self.not_available += 1,
            DownloadOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// Images present on disk after the run
    pub fn available(&self) -> usize {
        self.downloaded + self.skipped
    }
}

impl fmt::Display for DownloadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} skipped, {} not available, {} failed",
            self.downloaded, self.skipped, self.not_available, self.failed
        )
    }
}

/// Reuse `target` when it exists, otherwise run `fetch` and write the bytes there.
///
/// Only fatal taxonomy errors come back as `Err`; everything else becomes an outcome.
pub fn fetch_or_reuse<F>(target: &Path, fetch: F) -> Result<DownloadOutcome>
where
    F: FnOnce() -> Result<Vec<u8>>,
{
    if target.exists() {
        return Ok(DownloadOutcome::Skipped(target.to_path_buf()));
    }

    let bytes = match fetch() {
        Ok(bytes) => bytes,
        Err(e) => {
            return match dataset_error(&e) {
                Some(err) if err.is_fatal() => Err(e),
                Some(DatasetError::NotAvailable { reason }) => {
                    Ok(DownloadOutcome::NotAvailable(reason.clone()))
                }
                _ => Ok(DownloadOutcome::Failed(format!("{:#}", e))),
            };
        }
    };

    let written = target
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::write(target, &bytes));
    match written {
        Ok(()) => Ok(DownloadOutcome::Downloaded(target.to_path_buf())),
        Err(e) => Ok(DownloadOutcome::Failed(format!(
            "Failed to write {:?}: {}",
            target, e
        ))),
    }
}

/// Building record plus the image files collected for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingWithImages {
    #[serde(flatten)]
    pub building: BuildingRecord,
    pub fixed_pitch_image: Option<String>,
    pub height_pitch_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aerial_image: Option<String>,
}

impl BuildingWithImages {
    pub fn new(building: BuildingRecord) -> Self {
        BuildingWithImages {
            building,
            fixed_pitch_image: None,
            height_pitch_image: None,
            aerial_image: None,
        }
    }

    pub fn has_any_image(&self) -> bool {
        self.fixed_pitch_image.is_some()
            || self.height_pitch_image.is_some()
            || self.aerial_image.is_some()
    }

    /// Take images from `other` where this record has none
    pub fn merge_images(&mut self, other: &BuildingWithImages) {
        if self.fixed_pitch_image.is_none() {
            self.fixed_pitch_image = other.fixed_pitch_image.clone();
        }
        if self.height_pitch_image.is_none() {
            self.height_pitch_image = other.height_pitch_image.clone();
        }
        if self.aerial_image.is_none() {
            self.aerial_image = other.aerial_image.clone();
        }
    }
}

/// Previous `processed_with_images.json`, empty when the file does not exist
pub fn load_buildings_with_images<P: AsRef<Path>>(path: P) -> Result<Vec<BuildingWithImages>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_slice(&content).with_context(|| format!("Failed to parse {:?}", path))
}

/// Write the merged records as pretty JSON, creating parent directories
pub fn save_buildings_with_images<P: AsRef<Path>>(
    path: P,
    buildings: &[BuildingWithImages],
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(buildings)
        .context("Failed to serialize buildings with images")?;
    fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

/// Merge new results into the previous ones by `osm_id`, keeping only buildings with an image.
/// Output is ordered by `osm_id`.
pub fn merge_by_osm_id(
    existing: Vec<BuildingWithImages>,
    updates: Vec<BuildingWithImages>,
) -> Vec<BuildingWithImages> {
    let mut merged: BTreeMap<i64, BuildingWithImages> = existing
        .into_iter()
        .map(|b| (b.building.osm_id, b))
        .collect();
    for mut update in updates {
        if let Some(previous) = merged.get(&update.building.osm_id) {
            update.merge_images(previous);
        }
        merged.insert(update.building.osm_id, update);
    }
    merged.into_values().filter(|b| b.has_any_image()).collect()
}

/// Which images to collect for each building
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOptions {
    pub pitch_strategies: Vec<PitchStrategy>,
    /// Aerial settings, centered on each building in turn
    pub aerial: Option<AerialRequest>,
    /// Pause between buildings
    pub sleep: Duration,
    pub limit: Option<usize>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        DownloadOptions {
            pitch_strategies: vec![PitchStrategy::default()],
            aerial: None,
            sleep: Duration::from_millis(100),
            limit: None,
        }
    }
}

/// Summary of a batch run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub processed: usize,
    pub with_images: usize,
    pub stats: BTreeMap<&'static str, DownloadStats>,
}

/// Drives the image requests for a list of buildings
pub struct ImageDownloader<'a, C: ImageryClient + ?Sized> {
    client: &'a C,
    paths: DatasetPaths,
    options: DownloadOptions,
    stats: BTreeMap<&'static str, DownloadStats>,
}

impl<'a, C: ImageryClient + ?Sized> ImageDownloader<'a, C> {
    /// Stats start empty, one entry per variant appears on first use
    pub fn new(client: &'a C, paths: DatasetPaths, options: DownloadOptions) -> Self {
        ImageDownloader {
            client,
            paths,
            options,
            stats: BTreeMap::new(),
        }
    }

    pub fn stats(&self) -> &BTreeMap<&'static str, DownloadStats> {
        &self.stats
    }

    fn image_path(&self, variant: &str, osm_id: i64, extension: &str) -> PathBuf {
        self.paths
            .image_variant_dir(variant)
            .join(format!("{}.{}", osm_id, extension))
    }

    fn record(&mut self, variant: &'static str, osm_id: i64, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded(path) => {
                info!("Downloaded {} image for {}: {:?}", variant, osm_id, path)
            }
            DownloadOutcome::Skipped(_) => {
                info!("Skipped download - {} image for {} already exists", variant, osm_id)
            }
            DownloadOutcome::NotAvailable(reason) => {
                info!("No {} image for {}: {}", variant, osm_id, reason)
            }
            DownloadOutcome::Failed(reason) => {
                warn!("Failed to download {} image for {}: {}", variant, osm_id, reason)
            }
        }
        self.stats.entry(variant).or_default().record(outcome);
    }

    fn streetview(
        &mut self,
        building: &BuildingRecord,
        strategy: PitchStrategy,
    ) -> Result<DownloadOutcome> {
        let target = self.image_path(strategy.variant(), building.osm_id, "jpg");
        let client = self.client;
        let outcome = fetch_or_reuse(&target, || {
            let pitch = resolve_pitch(client, building, strategy)?;
            info!("Using pitch {:.1}° for building {}", pitch, building.osm_id);
            client.streetview_image(building.longitude, building.latitude, pitch)
        })?;
        self.record(strategy.variant(), building.osm_id, &outcome);
        Ok(outcome)
    }

    fn aerial(&mut self, building: &BuildingRecord, settings: &AerialRequest) -> Result<DownloadOutcome> {
        let request = settings.centered_on(building.latitude, building.longitude);
        let target = self.image_path(AERIAL_VARIANT, building.osm_id, request.format.as_str());
        let client = self.client;
        let outcome = fetch_or_reuse(&target, || client.aerial_image(&request))?;
        self.record(AERIAL_VARIANT, building.osm_id, &outcome);
        Ok(outcome)
    }

    /// Collect every requested image for one building
    pub fn download_building_images(&mut self, building: &BuildingRecord) -> Result<BuildingWithImages> {
        info!("Processing building (OSM ID: {})", building.osm_id);
        let mut result = BuildingWithImages::new(building.clone());

        for strategy in self.options.pitch_strategies.clone() {
            let outcome = self.streetview(building, strategy)?;
            let path = outcome.path().map(|p| p.to_string_lossy().into_owned());
            match strategy {
                PitchStrategy::Fixed(_) => result.fixed_pitch_image = path,
                PitchStrategy::HeightDerived { .. } => result.height_pitch_image = path,
            }
        }

        if let Some(settings) = self.options.aerial.clone() {
            let outcome = self.aerial(building, &settings)?;
            result.aerial_image = outcome.path().map(|p| p.to_string_lossy().into_owned());
        }

        Ok(result)
    }

    /// Download images for `buildings`, then merge into `processed_with_images.json`
    pub fn run(&mut self, buildings: &[BuildingRecord]) -> Result<BatchReport> {
        let selected = match self.options.limit {
            Some(limit) => &buildings[..limit.min(buildings.len())],
            None => buildings,
        };
        info!("Downloading images for {} buildings", selected.len());

        #[cfg(feature = "indicatif")]
        let pb = {
            let pb = ProgressBar::new(selected.len() as u64);
            pb.set_style(progress_style());
            pb.set_message("Buildings");
            pb
        };

        let mut results = Vec::with_capacity(selected.len());
        for (idx, building) in selected.iter().enumerate() {
            results.push(self.download_building_images(building)?);

            #[cfg(feature = "indicatif")]
            pb.inc(1);

            if idx + 1 < selected.len() && !self.options.sleep.is_zero() {
                thread::sleep(self.options.sleep);
            }
        }

        #[cfg(feature = "indicatif")]
        pb.finish_with_message("Done");

        let output = self.paths.processed_with_images_json();
        let existing = load_buildings_with_images(&output)?;
        let merged = merge_by_osm_id(existing, results);
        save_buildings_with_images(&output, &merged)?;
        info!("Saved {} buildings with images to {:?}", merged.len(), output);

        Ok(BatchReport {
            processed: selected.len(),
            with_images: merged.len(),
            stats: self.stats.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;

    struct FakeClient {
        camera: Option<(f64, f64)>,
        image: std::result::Result<usize, DatasetError>,
        calls: Cell<usize>,
    }

    impl FakeClient {
        fn serving(len: usize) -> Self {
            FakeClient {
                camera: None,
                image: Ok(len),
                calls: Cell::new(0),
            }
        }

        fn failing(err: DatasetError) -> Self {
            FakeClient {
                camera: None,
                image: Err(err),
                calls: Cell::new(0),
            }
        }

        fn respond(&self) -> Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            match &self.image {
                Ok(len) => Ok(vec![0xff; *len]),
                Err(e) => Err(anyhow::Error::new(e.clone()).context("request failed")),
            }
        }
    }

    impl ImageryClient for FakeClient {
        fn camera_position(&self, _lon: f64, _lat: f64) -> Result<Option<(f64, f64)>> {
            Ok(self.camera)
        }

        fn streetview_image(&self, _lon: f64, _lat: f64, _pitch: f64) -> Result<Vec<u8>> {
            self.respond()
        }

        fn aerial_image(&self, _request: &AerialRequest) -> Result<Vec<u8>> {
            self.respond()
        }
    }

    fn building(osm_id: i64) -> BuildingRecord {
        BuildingRecord {
            osm_id,
            longitude: -1.2577,
            latitude: 51.752,
            building_height: Some(9.0),
            levels: Some(3),
            building_type: "house".to_string(),
            building_material: "brick".to_string(),
            roof_material: String::new(),
            roof_shape: String::new(),
            name: String::new(),
            street: "High Street".to_string(),
            housenumber: "1".to_string(),
            postcode: String::new(),
            city: "Oxford".to_string(),
            footprint_wkt: String::new(),
            footprint_area: 80.0,
        }
    }

    fn options(strategies: Vec<PitchStrategy>) -> DownloadOptions {
        DownloadOptions {
            pitch_strategies: strategies,
            aerial: None,
            sleep: Duration::ZERO,
            limit: None,
        }
    }

    #[test]
    fn test_fetch_or_reuse_skips_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("1.jpg");
        fs::write(&target, b"cached").unwrap();

        let outcome = fetch_or_reuse(&target, || -> Result<Vec<u8>> { panic!("must not fetch") }).unwrap();
        assert_eq!(outcome, DownloadOutcome::Skipped(target.clone()));
        assert_eq!(fs::read(&target).unwrap(), b"cached");
    }

    #[test]
    fn test_fetch_or_reuse_writes_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("2.jpg");

        let outcome = fetch_or_reuse(&target, || Ok(vec![1, 2, 3])).unwrap();
        assert_eq!(outcome, DownloadOutcome::Downloaded(target.clone()));
        assert_eq!(fs::read(&target).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_fetch_or_reuse_classifies_errors() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("3.jpg");

        let outcome = fetch_or_reuse(&target, || {
            Err(anyhow::Error::new(DatasetError::not_available("blank")).context("fetch"))
        })
        .unwrap();
        assert_eq!(outcome, DownloadOutcome::NotAvailable("blank".to_string()));

        let outcome = fetch_or_reuse(&target, || Err(anyhow!("connection reset"))).unwrap();
        assert!(matches!(outcome, DownloadOutcome::Failed(ref m) if m.contains("connection reset")));

        let fatal = fetch_or_reuse(&target, || {
            Err(DatasetError::MissingCredential {
                hint: "set a key".to_string(),
            }
            .into())
        });
        assert!(fatal.is_err());
        assert!(!target.exists());
    }

    #[test]
    fn test_download_building_images_per_variant() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DatasetPaths::new(dir.path());
        let client = FakeClient::serving(6000);
        let mut downloader = ImageDownloader::new(
            &client,
            paths.clone(),
            DownloadOptions {
                aerial: Some(AerialRequest::new(0.0, 0.0)),
                ..options(vec![
                    PitchStrategy::Fixed(30.0),
                    PitchStrategy::HeightDerived { default_pitch: 30.0 },
                ])
            },
        );

        let result = downloader.download_building_images(&building(7)).unwrap();
        assert_eq!(client.calls.get(), 3);
        assert!(result.fixed_pitch_image.unwrap().ends_with("fixed_pitch/7.jpg"));
        assert!(result.height_pitch_image.unwrap().ends_with("height_pitch/7.jpg"));
        assert!(result.aerial_image.unwrap().ends_with("aerial/7.png"));
        assert_eq!(downloader.stats()["fixed_pitch"].downloaded, 1);

        // Second pass reuses every file
        downloader.download_building_images(&building(7)).unwrap();
        assert_eq!(client.calls.get(), 3);
        assert_eq!(downloader.stats()["aerial"].skipped, 1);
    }

    #[test]
    fn test_not_available_leaves_image_empty() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeClient::failing(DatasetError::not_available("placeholder"));
        let mut downloader = ImageDownloader::new(
            &client,
            DatasetPaths::new(dir.path()),
            options(vec![PitchStrategy::Fixed(30.0)]),
        );

        let result = downloader.download_building_images(&building(8)).unwrap();
        assert!(!result.has_any_image());
        assert_eq!(downloader.stats()["fixed_pitch"].not_available, 1);
    }

    #[test]
    fn test_missing_credential_aborts_batch() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeClient::failing(DatasetError::MissingCredential {
            hint: "set a key".to_string(),
        });
        let mut downloader = ImageDownloader::new(
            &client,
            DatasetPaths::new(dir.path()),
            options(vec![PitchStrategy::Fixed(30.0)]),
        );

        let err = downloader.run(&[building(1), building(2)]).unwrap_err();
        assert!(dataset_error(&err).is_some_and(|e| e.is_fatal()));
        assert_eq!(client.calls.get(), 1);
    }

    #[test]
    fn test_run_merges_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DatasetPaths::new(dir.path());

        let mut previous = BuildingWithImages::new(building(5));
        previous.height_pitch_image = Some("old/height_pitch/5.jpg".to_string());
        let mut stale = BuildingWithImages::new(building(9));
        stale.aerial_image = Some("old/aerial/9.png".to_string());
        save_buildings_with_images(paths.processed_with_images_json(), &[previous, stale]).unwrap();

        let client = FakeClient::serving(6000);
        let mut downloader = ImageDownloader::new(
            &client,
            paths.clone(),
            DownloadOptions {
                limit: Some(2),
                ..options(vec![PitchStrategy::Fixed(30.0)])
            },
        );
        let report = downloader
            .run(&[building(5), building(6), building(7)])
            .unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.stats["fixed_pitch"].downloaded, 2);

        let saved = load_buildings_with_images(paths.processed_with_images_json()).unwrap();
        let ids: Vec<i64> = saved.iter().map(|b| b.building.osm_id).collect();
        assert_eq!(ids, vec![5, 6, 9]);
        assert_eq!(report.with_images, 3);
        assert!(saved[0].fixed_pitch_image.is_some());
        assert_eq!(
            saved[0].height_pitch_image.as_deref(),
            Some("old/height_pitch/5.jpg")
        );
    }

    #[test]
    fn test_merge_drops_buildings_without_images() {
        let merged = merge_by_osm_id(Vec::new(), vec![BuildingWithImages::new(building(1))]);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_flattened_serialization() {
        let mut record = BuildingWithImages::new(building(3));
        record.fixed_pitch_image = Some("data/images/fixed_pitch/3.jpg".to_string());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["osm_id"], 3);
        assert_eq!(value["street"], "High Street");
        assert_eq!(value["fixed_pitch_image"], "data/images/fixed_pitch/3.jpg");
        assert!(value["height_pitch_image"].is_null());
        assert!(value.get("aerial_image").is_none());

        let back: BuildingWithImages = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
