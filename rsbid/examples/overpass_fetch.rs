// Fetch a handful of buildings around Oxford city centre and process them
use anyhow::Result;
use std::collections::HashSet;

use rsbid::collect::overpass::{OverpassCollect, OverpassQuery};
use rsbid::geo_core::BoundingBox;
use rsbid::geometric::building::{filter_buildings_by_street, BuildingCollection};

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let query = OverpassQuery::default()
        .with_bbox(BoundingBox::new(-1.27, 51.74, -1.24, 51.76))
        .with_limit(Some(20));

    let mut collect = OverpassCollect::new()?;
    collect.execute(&query)?;
    let response = collect.response()?;
    println!("Overpass returned {} buildings", response.elements.len());

    let (kept, stats) = filter_buildings_by_street(response.elements, &HashSet::new());
    println!("{} kept after street filtering", stats.kept());

    let collection = BuildingCollection::process(&kept);
    for building in collection.buildings.iter().take(5) {
        println!(
            "{:>12} {:<12} {:>6.1} m² at ({:.5}, {:.5})",
            building.osm_id,
            building.building_type,
            building.footprint_area,
            building.longitude,
            building.latitude
        );
    }

    Ok(())
}
