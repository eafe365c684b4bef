use anyhow::{Context, Result};
use log::{info, LevelFilter};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::time::Duration;

use rsbid::cli::{AerialArgs, CameraArgs, Cli, Commands, FetchArgs, ImagesArgs, ProcessArgs};
use rsbid::collect::global_variables::DatasetPaths;
use rsbid::collect::overpass::{OverpassCollect, OverpassQuery};
use rsbid::geo_core::{BoundingBox, GeoCore};
use rsbid::geometric::building::{filter_buildings_by_street, BuildingCollection, OsmResponse};
use rsbid::imagery::aerial::AerialRequest;
use rsbid::imagery::client::{GoogleMapsClient, ImageryClient};
use rsbid::imagery::download::{DownloadOptions, ImageDownloader};
use rsbid::imagery::streetview::PitchStrategy;

/// Log lines go to stderr and to the run log
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn init_logging(cli: &Cli, paths: &DatasetPaths) -> Result<()> {
    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);

    if let Commands::Images(_) = cli.command {
        let log_path = paths.streetview_log();
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file {:?}", log_path))?;
        builder.target(env_logger::Target::Pipe(Box::new(Tee { file })));
    }

    builder.init();
    Ok(())
}

fn fetch(cli: &Cli, args: &FetchArgs) -> Result<()> {
    let paths = DatasetPaths::new(&cli.data_dir);
    paths.setup_directory_structure()?;

    let mut query = OverpassQuery::default().with_limit(args.limit);
    if let Some(ref bbox) = args.bbox {
        let bbox = BoundingBox::from_overpass_str(bbox)?;
        let bbox = GeoCore::new(args.bbox_epsg).bbox_to_wgs84(&bbox)?;
        query = query.with_bbox(bbox);
    }

    let mut collect = OverpassCollect::new()?;
    collect.execute(&query)?;
    collect.save_raw(paths.raw_json())?;

    println!(
        "Saved {} buildings to {}",
        collect.element_count()?,
        paths.raw_json().display()
    );
    Ok(())
}

fn process(cli: &Cli, args: &ProcessArgs) -> Result<()> {
    let paths = DatasetPaths::new(&cli.data_dir);
    paths.setup_directory_structure()?;

    let response = OsmResponse::load(paths.raw_json())?;
    let exclude: HashSet<String> = args.exclude_types.iter().cloned().collect();
    let (filtered, stats) = filter_buildings_by_street(response.elements, &exclude);

    let collection = BuildingCollection::process(&filtered);
    collection.save(paths.processed_json())?;
    collection.save_geojson(paths.processed_geojson())?;

    println!(
        "Processed {} of {} buildings ({} kept after filtering, {} failed)",
        collection.len(),
        stats.total,
        stats.kept(),
        collection.failed
    );
    println!("Saved to {}", paths.processed_json().display());
    Ok(())
}

fn images(cli: &Cli, args: &ImagesArgs) -> Result<()> {
    let paths = DatasetPaths::new(&cli.data_dir);
    paths.setup_directory_structure()?;
    let client = GoogleMapsClient::from_env(cli.api_key.as_deref())?;

    let mut pitch_strategies = Vec::new();
    if args.fixed_pitch || !args.height_pitch {
        pitch_strategies.push(PitchStrategy::Fixed(args.pitch));
    }
    if args.height_pitch {
        pitch_strategies.push(PitchStrategy::HeightDerived {
            default_pitch: args.pitch,
        });
    }
    let options = DownloadOptions {
        pitch_strategies,
        aerial: args.aerial.then(|| AerialRequest::new(0.0, 0.0)),
        sleep: Duration::try_from_secs_f64(args.sleep).unwrap_or_default(),
        limit: args.limit,
    };

    let collection = BuildingCollection::load(paths.processed_json())?;
    info!("Loaded {} buildings", collection.len());

    let mut downloader = ImageDownloader::new(&client, paths.clone(), options);
    let report = downloader.run(&collection.buildings)?;

    println!("Download summary:");
    println!("  Buildings processed: {}", report.processed);
    for (variant, stats) in &report.stats {
        println!("  {}: {} ({} on disk)", variant, stats, stats.available());
    }
    println!(
        "  Buildings with images: {} (saved to {})",
        report.with_images,
        paths.processed_with_images_json().display()
    );
    Ok(())
}

fn aerial(cli: &Cli, args: &AerialArgs) -> Result<()> {
    let client = GoogleMapsClient::from_env(cli.api_key.as_deref())?;
    let request = AerialRequest {
        lat: args.lat,
        lon: args.lon,
        zoom: args.zoom,
        size: args.size.clone(),
        scale: args.scale,
        format: args.format,
        marker: args.marker.clone(),
    };

    let bytes = client.aerial_image(&request)?;
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    fs::write(&args.output, &bytes)
        .with_context(|| format!("Failed to write {:?}", args.output))?;

    println!(
        "Saved {} ({:.3} m/pixel)",
        args.output.display(),
        request.meters_per_pixel()
    );
    Ok(())
}

fn camera(cli: &Cli, args: &CameraArgs) -> Result<()> {
    let client = GoogleMapsClient::from_env(cli.api_key.as_deref())?;
    println!("Requested: {} {}", args.lon, args.lat);
    match client.camera_position(args.lon, args.lat)? {
        Some((lon, lat)) => println!("Camera:    {} {}", lon, lat),
        None => println!("No Street View panorama near the requested point"),
    }
    Ok(())
}

/// Parse the command line, set up logging and run one command
pub fn run() -> Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    init_logging(&cli, &DatasetPaths::new(&cli.data_dir))?;

    match &cli.command {
        Commands::Fetch(args) => fetch(&cli, args),
        Commands::Process(args) => process(&cli, args),
        Commands::Images(args) => images(&cli, args),
        Commands::Aerial(args) => aerial(&cli, args),
        Commands::Camera(args) => camera(&cli, args),
    }
}

fn main() -> Result<()> {
    run()
}
