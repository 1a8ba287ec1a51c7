//! # cadence-core
//!
//! Core types, traits, and abstractions for cadence.
//!
//! This crate provides the generation job model, the error taxonomy shared by
//! every layer, and the repository/provider traits the reconciliation engine is
//! written against.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{
    Error, ProviderApiError, ProviderResult, Result, TIMEOUT_ERROR_CODE, TRANSPORT_ERROR_CODE,
};
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
