//! Lookup traits for the content repository collaborators.
//!
//! Snapshot fields resolve lazily while a template is being evaluated, which
//! happens on the blocking pool, so these lookups are synchronous. Adapters
//! backed by async stores are expected to bridge on their side.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::{
    content::{Profile, RawContentRecord},
    content_type::ContentTypeDescriptor,
};

#[derive(Debug, Error, Clone)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("repository timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

pub trait ContentRepository: Send + Sync {
    fn get_by_id(&self, id: i32) -> Result<Option<RawContentRecord>, RepoError>;

    /// Every child of `parent_id`, in storage order, without paging.
    fn get_children(&self, parent_id: i32) -> Result<Vec<RawContentRecord>, RepoError>;
}

pub trait ContentTypeService: Send + Sync {
    fn content_type_of(&self, record: &RawContentRecord) -> Option<Arc<ContentTypeDescriptor>>;
}

pub trait ProfileLookup: Send + Sync {
    fn creator_profile(&self, record: &RawContentRecord) -> Result<Option<Profile>, RepoError>;

    fn writer_profile(&self, record: &RawContentRecord) -> Result<Option<Profile>, RepoError>;
}
