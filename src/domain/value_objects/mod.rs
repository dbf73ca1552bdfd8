// Domain Value Objects

mod batch_status;
mod job_status;
mod progress;

pub use batch_status::BatchStatus;
pub use job_status::JobStatus;
pub use progress::{AggregateProgress, ProgressSnapshot};
