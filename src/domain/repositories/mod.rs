// Domain Repository Interfaces

mod job_repository;

pub use job_repository::{JobFilter, JobRepository, JobUpdate};
