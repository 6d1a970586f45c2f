//! Small helpers shared across layers.

pub mod lock;
pub mod markup;
