//! Adapters module
//!
//! This module provides the data-source adapter layer:
//! - The `Adapter` trait every source type implements
//! - REST, GraphQL, and manual implementations
//! - The registry mapping integration type tags to adapters

pub mod graphql;
pub mod http;
pub mod json;
pub mod manual;
pub mod registry;
pub mod rest;
pub mod trait_;

pub use graphql::GraphqlAdapter;
pub use http::{HttpError, HttpSource};
pub use manual::ManualAdapter;
pub use registry::{AdapterMetadata, Registry, RegistryError};
pub use rest::RestAdapter;
pub use trait_::{
    Adapter, AuthConfig, ConnectionTestResult, DEFAULT_FETCH_LIMIT, FetchResult, FieldSchema,
    IntegrationConfig, ManualField,
};
