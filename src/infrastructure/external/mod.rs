// External Service Adapters

pub mod tagging;
