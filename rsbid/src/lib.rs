pub mod cli;
pub mod collect;
pub mod commons;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod imagery;

pub use error::DatasetError;
