use std::path::PathBuf;

use thiserror::Error;

use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("configuration error: {message}")]
    Configuration { message: String },
    #[error("content source `{}` is invalid: {message}", path.display())]
    ContentSource { path: PathBuf, message: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl InfraError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn content_source(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ContentSource {
            path: path.into(),
            message: message.into(),
        }
    }
}
