// Database Infrastructure

mod connection_pool;
mod schema;

pub use connection_pool::{ConnectionPool, ConnectionPoolConfig};
pub use schema::initialize_schema;
