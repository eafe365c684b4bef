pub mod area;
pub mod building;
pub mod pitch;
pub mod projection;

pub use area::{area_m2, GeoPolygon, GeoRing};
pub use pitch::pitch_degrees;
