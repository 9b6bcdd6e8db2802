//! # KPI Sync Library
//!
//! Integration synchronization for the KPI service: source adapters, the
//! adapter registry, the sync engine, retry scheduling, and the background
//! worker.

pub mod adapters;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod scheduler;
pub mod sync_engine;
pub mod telemetry;
pub mod worker;
pub use migration;
