//! HTTP request handlers for the Conference Controller.

pub mod callbacks;
pub mod conferences;
pub mod metrics;

pub use callbacks::{platform_event, voice_join, voice_status};
pub use conferences::{
    create_conference, delete_conference, get_conference, join_conference, list_conferences,
    list_participants,
};
pub use metrics::metrics_handler;
