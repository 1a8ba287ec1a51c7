//! # cadence-provider
//!
//! Adapter for the hosted music-generation provider.
//!
//! This crate provides:
//! - [`ProviderClient`], the HTTP implementation of [`GenerationProvider`]
//! - Wire types for the response envelope and per-kind status payloads
//! - [`ProviderCallback`] parsing for callback notices
//! - [`HttpArtifactFetcher`] for downloading generated artifacts
//! - Scripted provider/fetcher doubles (feature `mock`)
//!
//! # Feature Flags
//!
//! - `mock`: Enable [`mock::ScriptedProvider`] and [`mock::ScriptedFetcher`]

pub mod callback;
pub mod client;
pub mod download;
pub mod error;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use cadence_core::*;

pub use callback::{CallbackParseError, ProviderCallback};
pub use client::{status_endpoint, submit_endpoint, ProviderClient, ProviderConfig};
pub use download::HttpArtifactFetcher;
pub use error::ProviderErrorCode;
