use std::path::PathBuf;

use crate::collect::global_variables::{DATA_PATH, DEFAULT_PITCH_ANGLE};
use crate::imagery::aerial::ImageFormat;

/// Building imagery dataset builder
#[derive(clap::Parser, Debug)]
#[command(name = "rsbid", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Dataset root directory
    #[arg(long, default_value = DATA_PATH, global = true, value_hint = clap::ValueHint::DirPath)]
    pub data_dir: PathBuf,

    /// Google Maps API key, otherwise GOOGLE_MAPS_KEY or GOOGLE_MAPS_API_KEY
    #[arg(long, global = true, env = "GOOGLE_MAPS_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Download building footprints from Overpass into osm/raw.json
    Fetch(FetchArgs),

    /// Filter and process raw buildings into osm/processed.json
    Process(ProcessArgs),

    /// Download Street View and aerial images for processed buildings
    Images(ImagesArgs),

    /// Download a single satellite image
    Aerial(AerialArgs),

    /// Print the Street View camera position nearest to a point
    Camera(CameraArgs),
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Maximum number of buildings
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// south,west,north,east
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: Option<String>,

    /// CRS of --bbox when it is not WGS84
    #[arg(long, default_value_t = 4326)]
    pub bbox_epsg: i32,
}

#[derive(clap::Args, Debug)]
pub struct ProcessArgs {
    /// Building types to drop, repeatable
    #[arg(long = "exclude-type", default_values_t = vec!["house".to_string()])]
    pub exclude_types: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct ImagesArgs {
    /// Street View images at a constant pitch
    #[arg(long)]
    pub fixed_pitch: bool,

    /// Street View images with a pitch derived from building height
    #[arg(long)]
    pub height_pitch: bool,

    /// Satellite images as well
    #[arg(long)]
    pub aerial: bool,

    /// Pitch for fixed mode and fallback for height mode, in degrees
    #[arg(long, default_value_t = DEFAULT_PITCH_ANGLE)]
    pub pitch: f64,

    /// Seconds to wait between buildings
    #[arg(long, default_value_t = 0.1)]
    pub sleep: f64,

    /// Only the first N buildings
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct AerialArgs {
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,

    #[arg(long, default_value_t = 19)]
    pub zoom: u8,

    /// WIDTHxHEIGHT, at most 640x640
    #[arg(long, default_value = "640x640")]
    pub size: String,

    #[arg(long, default_value_t = 2)]
    pub scale: u8,

    #[arg(long, value_enum, default_value_t = ImageFormat::Png)]
    pub format: ImageFormat,

    /// Marker style and position, e.g. "color:red|40.6892,-74.0445"
    #[arg(long)]
    pub marker: Option<String>,

    /// Output image file
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct CameraArgs {
    #[arg(allow_negative_numbers = true)]
    pub lon: f64,

    #[arg(allow_negative_numbers = true)]
    pub lat: f64,
}
