// Job Interfaces

mod job_definition;

pub use job_definition::{BatchProcessOutcome, JobContext, JobDefinition, WorkItem};
