//! # cadence-jobs
//!
//! Resolution of asynchronous generation jobs.
//!
//! This crate provides:
//! - A submission gateway that records provider tasks as `processing` jobs
//! - Per-kind status classification of provider answers
//! - A completion pipeline that stores artifacts and writes the job, its
//!   variants and the catalog entry atomically
//! - A callback receiver and a batch reconciliation engine sharing that pipeline
//! - A periodic sweep worker and a one-shot deferred sweep per submission
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cadence_jobs::{CompletionPipeline, PipelineConfig, ReconcileConfig, ReconciliationEngine,
//!     SweepWorker, WorkerConfig};
//!
//! let pipeline = Arc::new(CompletionPipeline::new(store.clone(), fetcher, artifacts,
//!     PipelineConfig::from_env()));
//! let engine = ReconciliationEngine::new(provider, store, pipeline, ReconcileConfig::from_env());
//!
//! let handle = SweepWorker::new(engine, WorkerConfig::from_env()).start();
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//! handle.shutdown().await?;
//! ```

pub mod backoff;
pub mod callback;
pub mod classifier;
pub mod deferred;
pub mod gateway;
pub mod pipeline;
pub mod reconcile;
pub mod worker;

// Re-export core types
pub use cadence_core::*;

pub use backoff::{BackoffConfig, KindBackoff};
pub use callback::{CallbackDisposition, CallbackReceiver};
pub use classifier::{classify, Outcome};
pub use deferred::DeferredSweeper;
pub use gateway::{GatewayConfig, SubmissionGateway, SubmitGenerationRequest};
pub use pipeline::{CompletionPipeline, PipelineConfig, Resolution};
pub use reconcile::{
    BatchReport, JobReconcileResult, JobReconcileStatus, ReconcileConfig, ReconciliationEngine,
};
pub use worker::{SweepWorker, WorkerConfig, WorkerEvent, WorkerHandle};
