// Domain Entities

mod job;
mod job_batch;

pub use job::Job;
pub use job_batch::{BatchCounters, ClaimedBatch, JobBatch};
