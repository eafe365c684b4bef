// Street View pitch for buildings of different heights seen from the same camera
use anyhow::Result;
use rsbid::collect::global_variables::DEFAULT_PITCH_ANGLE;
use rsbid::geometric::pitch::pitch_degrees;

fn main() -> Result<()> {
    let building = (-0.1276, 51.5072);
    // About 28 m west of the building
    let camera = Some((-0.1280, 51.5072));

    for height in [5.0, 15.0, 30.0, 60.0] {
        let pitch = pitch_degrees(camera, building, Some(height), DEFAULT_PITCH_ANGLE)?;
        println!("{:>5.1} m tall -> pitch {:.1}°", height, pitch);
    }

    let fallback = pitch_degrees(None, building, Some(30.0), DEFAULT_PITCH_ANGLE)?;
    println!("No camera      -> pitch {:.1}°", fallback);

    Ok(())
}
