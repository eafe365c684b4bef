use crate::error::DatasetError;
use crate::geometric::projection::to_geocentric;

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Angle in degrees between the lines of sight from `observer` to the foot and
/// to the top of a vertical segment of `height` meters standing on `target`.
///
/// Positions are (lon, lat) in degrees at ground level.
pub fn subtended_angle(
    observer: (f64, f64),
    target: (f64, f64),
    height: f64,
) -> Result<f64, DatasetError> {
    let origin = to_geocentric(observer.0, observer.1, 0.0);
    let ground = to_geocentric(target.0, target.1, 0.0);
    let top = to_geocentric(target.0, target.1, height);

    let vec_ground = sub(ground, origin);
    let vec_top = sub(top, origin);

    let denominator = norm(vec_ground) * norm(vec_top);
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(DatasetError::invalid_geometry(format!(
            "zero-length sight line from ({}, {}) to ({}, {})",
            observer.0, observer.1, target.0, target.1
        )));
    }

    let cosine = (dot(vec_ground, vec_top) / denominator).clamp(-1.0, 1.0);
    Ok(cosine.acos().to_degrees())
}

/// Camera pitch that frames a building of `target_height_m` standing on `target`
/// when the camera sits at `observer`: half the angle the building subtends.
///
/// Falls back to `default_pitch` when there is no observer or no usable height;
/// that check happens before any vector math.
pub fn pitch_degrees(
    observer: Option<(f64, f64)>,
    target: (f64, f64),
    target_height_m: Option<f64>,
    default_pitch: f64,
) -> Result<f64, DatasetError> {
    let (observer, height) = match (observer, target_height_m) {
        (Some(observer), Some(height)) if height != 0.0 && height.is_finite() => {
            (observer, height)
        }
        _ => return Ok(default_pitch),
    };

    Ok(subtended_angle(observer, target, height)? * 0.5)
}
