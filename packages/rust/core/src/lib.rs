//! Stage workers and orchestration for the tribunal pipeline.
//!
//! This crate ties discovery, acquisition, transformation and consistency
//! reporting together over one metadata store and one blob store, and renders
//! decision exports.

pub mod acquire;
pub mod export;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod transform;

pub use acquire::{AcquireOptions, AcquisitionStats, AcquisitionWorker, acquisition_stats};
pub use export::{ExportFormat, decisions_to_csv, render_decisions};
pub use pipeline::{
    PipelineOptions, PipelineResult, open_blobs, open_metadata, open_metadata_readonly,
    run_pipeline,
};
pub use progress::{BatchSummary, ProgressReporter, SilentProgress};
pub use report::{ConsistencyReport, ConsistencyReporter, HashAudit, PairCheck, PipelineStats, Zone};
pub use transform::{TransformOptions, TransformStats, TransformWorker, curated_key, transform_stats};
