//! Application services: snapshots, rendering and change handling.

pub mod changes;
pub mod error;
pub mod render;
pub mod repos;
pub mod snapshot;
