// Job Engine Application Layer
//
// Controller, batch manager, submission service, and the built-in job
// definitions.

mod batch_manager;
mod job_controller;
mod job_service;

pub mod definitions;

pub use batch_manager::BatchManager;
pub use job_controller::{
    is_transient_error, with_transient_retry, BatchOutcome, BatchOutcomeStatus, JobController,
};
pub use job_service::JobService;
