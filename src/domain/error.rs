use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("duplicate {entity} `{id}`")]
    Duplicate { entity: &'static str, id: String },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn duplicate(entity: &'static str, id: impl ToString) -> Self {
        Self::Duplicate {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
