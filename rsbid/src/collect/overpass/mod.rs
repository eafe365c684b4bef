pub mod overpass_collect;

pub use overpass_collect::{OverpassCollect, OverpassQuery};
