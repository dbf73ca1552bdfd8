// Persistence Infrastructure

pub mod sqlite;
