// Job Engine Infrastructure
//
// The process-wide job registry and the bounded worker pool.

mod registry;
mod worker_pool;

pub use registry::{global_registry, JobRegistry};
pub use worker_pool::{global_worker_pool, WorkerHandle, WorkerPool};
