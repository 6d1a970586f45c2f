use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::application::snapshot::{ContentSnapshot, SnapshotError};

/// Identifies one renderable output: a content item, optionally in one culture.
///
/// Keys are stable across renders so engines can keep compiled templates per
/// key and the orchestrator can serialise work per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RenderKey {
    pub content_id: i32,
    pub culture: Option<String>,
}

impl RenderKey {
    pub fn new(content_id: i32, culture: Option<String>) -> Self {
        Self {
            content_id,
            culture,
        }
    }

    pub fn invariant(content_id: i32) -> Self {
        Self::new(content_id, None)
    }

    pub fn culture(&self) -> Option<&str> {
        self.culture.as_deref()
    }
}

impl fmt::Display for RenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.culture {
            Some(culture) => write!(f, "content-{}-{}", self.content_id, culture),
            None => write!(f, "content-{}", self.content_id),
        }
    }
}

/// A rendered page ready for the output sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPage {
    pub content_key: Uuid,
    pub content_id: i32,
    pub culture: Option<String>,
    /// Site-relative route, always starting and ending with `/`.
    pub route: String,
    pub html: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("template compilation failed: {message}")]
    Compile { message: String },
    #[error("template evaluation failed: {message}")]
    Render { message: String },
}

impl EngineError {
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile {
            message: message.into(),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    #[error("template {template_id} does not exist")]
    NotFound { template_id: i32 },
    #[error("template {template_id} could not be read: {message}")]
    Io { template_id: i32, message: String },
}

#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("route `{route}` cannot be mapped to an output location")]
    InvalidRoute { route: String },
    #[error("writing `{route}` failed: {message}")]
    Write { route: String, message: String },
}

/// Failure of one render attempt. Errors are local to their render key and
/// never leave previously committed output behind in a changed state.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("content {content_id} has no template and its content type declares no default")]
    TemplateNotFound { content_id: i32 },
    #[error(transparent)]
    TemplateLoad(#[from] TemplateError),
    #[error("template for {key} failed to compile: {message}")]
    TemplateCompile { key: RenderKey, message: String },
    #[error("template for {key} failed to render: {message}")]
    TemplateRender { key: RenderKey, message: String },
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("render task aborted: {0}")]
    Aborted(String),
}

impl RenderError {
    pub fn from_engine(key: &RenderKey, err: EngineError) -> Self {
        match err {
            EngineError::Compile { message } => Self::TemplateCompile {
                key: key.clone(),
                message,
            },
            EngineError::Render { message } => Self::TemplateRender {
                key: key.clone(),
                message,
            },
        }
    }

    /// Short machine-readable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot(SnapshotError::SchemaResolution { .. }) => "schema",
            Self::Snapshot(SnapshotError::Repository(_)) => "repository",
            Self::TemplateNotFound { .. } | Self::TemplateLoad(TemplateError::NotFound { .. }) => {
                "template_not_found"
            }
            Self::TemplateLoad(TemplateError::Io { .. }) => "template_io",
            Self::TemplateCompile { .. } => "compile",
            Self::TemplateRender { .. } => "render",
            Self::Publish(_) => "publish",
            Self::Aborted(_) => "aborted",
        }
    }
}

/// Source of template bodies keyed by template id.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn load_template_body(&self, template_id: i32) -> Result<String, TemplateError>;
}

/// Destination for committed pages.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn publish(&self, page: PublishedPage) -> Result<(), PublishError>;
}

/// Turns a template body and a snapshot into HTML.
///
/// Implementations run on the blocking pool and may resolve lazy snapshot
/// fields while evaluating. They may cache compiled templates per key, but
/// must recompile when the body for a key changes.
pub trait RenderEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn compile_and_render(
        &self,
        body: &str,
        key: &RenderKey,
        model: &ContentSnapshot,
    ) -> Result<String, EngineError>;
}
