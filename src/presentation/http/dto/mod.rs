// HTTP DTOs

mod job_dto;

pub use job_dto::{CancelResponse, JobResponse, JobSubmitRequest};
