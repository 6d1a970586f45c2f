//! Rendering of content snapshots into published pages.
//!
//! [`RenderOrchestrator`] owns the per-key lifecycle: build the snapshot,
//! load the template, render it with the configured [`RenderEngine`], and
//! commit the page to the [`OutputSink`] only if nothing newer was committed
//! for the same key in the meantime.

pub mod engine;
mod orchestrator;
mod runtime;
mod types;

pub use engine::{EngineKind, ExpressionEngine, HandlebarsEngine, PageModel};
pub use orchestrator::{RenderOptions, RenderOrchestrator, RenderOutcome};
pub use runtime::{CommitResult, RenderPhase, RenderSlot, RenderSlots, RenderStatus};
pub use types::{
    EngineError, OutputSink, PublishError, PublishedPage, RenderEngine, RenderError, RenderKey,
    TemplateError, TemplateStore,
};
