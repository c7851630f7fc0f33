pub mod config;
pub mod error;
pub mod etl;
pub mod telemetry;
