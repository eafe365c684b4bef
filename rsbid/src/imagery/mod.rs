pub mod aerial;
pub mod client;
pub mod download;
pub mod streetview;

pub use aerial::{AerialRequest, ImageFormat};
pub use client::{GoogleMapsClient, ImageryClient};
pub use download::{BuildingWithImages, DownloadOptions, DownloadOutcome, DownloadStats, ImageDownloader};
pub use streetview::PitchStrategy;
