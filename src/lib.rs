pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod foss;
pub mod geohash;
pub mod output;
pub mod pacing;
pub mod reduce;
pub mod simplify;
pub mod store;
