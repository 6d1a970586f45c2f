//! Domain layer: raw repository records and content-type metadata.

pub mod content;
pub mod content_type;
pub mod error;
pub mod slug;
