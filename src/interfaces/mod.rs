// Interfaces Layer
//
// Cross-layer contracts: job definitions and the progress channel.

pub mod jobs;
pub mod messaging;
