//! Shared fixtures for the cache benchmarks.

pub mod config;
pub mod fixtures;

pub use config::BenchConfig;
pub use fixtures::{Origin, Profile, Workload};
