// Messaging Interfaces

mod progress_channel;

pub use progress_channel::{
    build_completion_payload, build_progress_payload, progress_channel_name, wire_timestamp,
    ProgressChannel, ProgressSubscriber,
};
