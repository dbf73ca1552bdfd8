// Infrastructure Layer
//
// This module contains all infrastructure implementations including:
// - Persistence (SQLite job repository)
// - Database connection pooling and schema
// - Messaging (progress channels)
// - The job registry and worker pool
// - External service adapters (tagging backends)

pub mod database;
pub mod external;
pub mod jobs;
pub mod messaging;
pub mod persistence;

pub use database::*;
pub use jobs::*;
pub use messaging::*;
pub use persistence::sqlite::*;
