//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for the sync subsystem's tables.

pub mod data_field;
pub mod data_value;
pub mod integration;
pub mod sync_log;

pub use data_field::DataFieldRepository;
pub use data_value::DataValueRepository;
pub use integration::{IntegrationRepository, NewIntegration, ScheduleUpdate};
pub use sync_log::{SyncLogOutcome, SyncLogPage, SyncLogRepository};
