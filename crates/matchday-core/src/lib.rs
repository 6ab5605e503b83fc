// Library root: league scheduling, fixture lifecycle, standings and player
// stats, plus the SQLite store and config loading the binary builds on.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod export;
pub mod fixtures;
pub mod lifecycle;
pub mod model;
pub mod repository;
pub mod scores;
pub mod standings;
pub mod stats;

pub use error::{Error, Result};
