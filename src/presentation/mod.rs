// Presentation Layer

pub mod http;
