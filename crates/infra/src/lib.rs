//! Infrastructure layer: Postgres stores, Redis cache, config.

pub mod cache;
pub mod clusters;
pub mod config;
pub mod db;
pub mod jobs;
