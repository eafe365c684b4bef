// Ground area of a footprint, with and without a courtyard
use anyhow::Result;
use rsbid::geometric::area::{area_m2, GeoPolygon, GeoRing};
use rsbid::geometric::projection::to_utm;

fn main() -> Result<()> {
    // Roughly 100 m x 50 m around the Radcliffe Camera, Oxford
    let exterior = GeoRing::from_lonlat(&[
        (-1.2550, 51.7530),
        (-1.2536, 51.7530),
        (-1.2536, 51.75345),
        (-1.2550, 51.75345),
    ]);
    let courtyard = GeoRing::from_lonlat(&[
        (-1.2545, 51.7531),
        (-1.2541, 51.7531),
        (-1.2541, 51.7533),
        (-1.2545, 51.7533),
    ]);

    let utm = to_utm(-1.2550, 51.7530)?;
    println!(
        "First vertex in UTM {}{}: {:.1} E {:.1} N",
        utm.zone_number, utm.zone_letter, utm.easting, utm.northing
    );

    let solid = GeoPolygon::simple(exterior.clone());
    println!("Solid footprint: {:.1} m²", area_m2(&solid)?);

    let with_hole = GeoPolygon::new(exterior, vec![courtyard]);
    println!("With courtyard:  {:.1} m²", area_m2(&with_hole)?);

    Ok(())
}
