// Application Layer
//
// Use-case orchestration for the job engine.

pub mod jobs;

pub use jobs::{BatchManager, JobController, JobService};
