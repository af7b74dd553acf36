pub mod config;
pub mod delivery;
pub mod error;
pub mod geo;
pub mod models;
pub mod report;
pub mod sampling;
pub mod store;
