//! Pipeline engine and assembly for mailsift.
//!
//! [`engine`] runs named steps in order with bounded retries and reports
//! every attempt on the event bus; [`pipeline`] composes the concrete
//! fetch → verify → resolve → export run from options and collaborators.

pub mod engine;
pub mod pipeline;
pub mod steps;

pub use engine::{Pipeline, Step, StepAction};
pub use pipeline::{
    Collaborators, EXPORT_STEP, FETCH_STEP, PipelineOptions, PipelineRun, RESOLVE_STEP,
    VERIFY_STEP, build_pipeline, run_pipeline,
};
pub use steps::{ExportStep, FetchStep, VerifyStep};
