use thiserror::Error;

use crate::{
    application::{changes::ChangeFeedError, render::RenderError},
    domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    ChangeFeed(#[from] ChangeFeedError),
    #[error("content {0} does not exist")]
    NotFound(i32),
    #[error("{failed} of {total} renders failed")]
    RenderFailures { failed: usize, total: usize },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::Infra(InfraError::ContentSource { .. })
            | AppError::Domain(_)
            | AppError::NotFound(_) => 65,
            AppError::RenderFailures { .. } | AppError::Render(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_group_failures() {
        assert_eq!(
            AppError::from(InfraError::configuration("bad")).exit_code(),
            78
        );
        assert_eq!(AppError::NotFound(3).exit_code(), 65);
        assert_eq!(
            AppError::RenderFailures {
                failed: 1,
                total: 4
            }
            .exit_code(),
            2
        );
        assert_eq!(AppError::unexpected("boom").exit_code(), 1);
    }
}
