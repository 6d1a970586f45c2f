use std::{
    sync::{Arc, Weak},
    time::Instant,
};

use metrics::histogram;
use thiserror::Error;
use tracing::debug;

use crate::{
    application::repos::{ContentRepository, ContentTypeService, ProfileLookup, RepoError},
    domain::{content::RawContentRecord, content_type::ContentTypeDescriptor},
};

use super::{
    content::ContentSnapshot,
    converters::ConverterRegistry,
    property::PropertyView,
    segments::{UrlSegmentProvider, UrlSegmentResolver},
};

const METRIC_SNAPSHOT_BUILD_MS: &str = "imprint_snapshot_build_ms";

#[derive(Debug, Error, Clone)]
pub enum SnapshotError {
    #[error("content type `{alias}` of content {content_id} could not be resolved")]
    SchemaResolution { content_id: i32, alias: String },
    #[error(transparent)]
    Repository(#[from] RepoError),
}

/// Builds snapshots from raw records.
///
/// Only the content type is resolved up front. Parent, children, profiles,
/// properties and segments are left to the snapshot, which resolves them
/// through this factory the first time they are read.
#[derive(Clone)]
pub struct SnapshotFactory {
    inner: Arc<FactoryInner>,
}

struct FactoryInner {
    repository: Arc<dyn ContentRepository>,
    content_types: Arc<dyn ContentTypeService>,
    profiles: Arc<dyn ProfileLookup>,
    segments: UrlSegmentResolver,
    converters: ConverterRegistry,
}

impl SnapshotFactory {
    /// Factory with the default converters and no segment providers beyond
    /// the default.
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        content_types: Arc<dyn ContentTypeService>,
        profiles: Arc<dyn ProfileLookup>,
    ) -> Self {
        Self::builder(repository, content_types, profiles).build()
    }

    pub fn builder(
        repository: Arc<dyn ContentRepository>,
        content_types: Arc<dyn ContentTypeService>,
        profiles: Arc<dyn ProfileLookup>,
    ) -> SnapshotFactoryBuilder {
        SnapshotFactoryBuilder {
            repository,
            content_types,
            profiles,
            segments: UrlSegmentResolver::default(),
            converters: ConverterRegistry::default(),
        }
    }

    pub fn build(
        &self,
        record: RawContentRecord,
        preview: bool,
    ) -> Result<Arc<ContentSnapshot>, SnapshotError> {
        self.build_for_culture(record, preview, None)
    }

    pub fn build_for_culture(
        &self,
        record: RawContentRecord,
        preview: bool,
        culture: Option<String>,
    ) -> Result<Arc<ContentSnapshot>, SnapshotError> {
        let started_at = Instant::now();
        let content_type = self.inner.content_types.content_type_of(&record).ok_or_else(|| {
            SnapshotError::SchemaResolution {
                content_id: record.id,
                alias: record.content_type_alias.clone(),
            }
        })?;

        let snapshot =
            ContentSnapshot::new_cyclic(record, content_type, preview, culture, self.clone());
        histogram!(METRIC_SNAPSHOT_BUILD_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        Ok(snapshot)
    }

    /// `Ok(None)` when the repository has no record with `id`.
    pub fn build_by_id(
        &self,
        id: i32,
        preview: bool,
        culture: Option<String>,
    ) -> Result<Option<Arc<ContentSnapshot>>, SnapshotError> {
        match self.inner.repository.get_by_id(id)? {
            Some(record) => self.build_for_culture(record, preview, culture).map(Some),
            None => {
                debug!(
                    target = "application::snapshot::factory",
                    content_id = id,
                    "referenced content does not exist"
                );
                Ok(None)
            }
        }
    }

    pub fn content_type_of(&self, record: &RawContentRecord) -> Option<Arc<ContentTypeDescriptor>> {
        self.inner.content_types.content_type_of(record)
    }

    /// Cultures a record renders in: every culture it carries publish data
    /// for when its type varies by culture, otherwise just the invariant.
    pub fn render_cultures(&self, record: &RawContentRecord) -> Vec<Option<String>> {
        let varies = self
            .content_type_of(record)
            .is_some_and(|content_type| content_type.varies_by_culture());
        if !varies || record.publish_culture_infos.is_empty() {
            return vec![None];
        }
        record
            .publish_culture_infos
            .keys()
            .cloned()
            .map(Some)
            .collect()
    }

    pub(super) fn build_children(
        &self,
        parent_id: i32,
        preview: bool,
        culture: Option<String>,
    ) -> Result<Vec<Arc<ContentSnapshot>>, SnapshotError> {
        let mut children = self
            .inner
            .repository
            .get_children(parent_id)?
            .into_iter()
            .map(|record| self.build_for_culture(record, preview, culture.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        children.sort_by_key(|child| child.sort_order());
        Ok(children)
    }

    /// One view per declared property type, in declaration order; a missing
    /// raw property yields a view without a source value.
    pub(super) fn property_views(
        &self,
        owner: &Weak<ContentSnapshot>,
        record: &RawContentRecord,
        content_type: &ContentTypeDescriptor,
        preview: bool,
        culture: Option<&str>,
    ) -> Vec<PropertyView> {
        content_type
            .property_types
            .iter()
            .map(|property_type| {
                let value_culture = culture.filter(|_| property_type.varies_by_culture);
                let source = record
                    .property(&property_type.alias)
                    .and_then(|raw| raw.value_for(value_culture))
                    .cloned();
                PropertyView::new(
                    owner.clone(),
                    Arc::new(property_type.clone()),
                    self.inner.converters.resolve(&property_type.editor_alias),
                    source,
                    preview,
                )
            })
            .collect()
    }

    pub(super) fn profiles(&self) -> &dyn ProfileLookup {
        self.inner.profiles.as_ref()
    }

    pub(super) fn segments(&self) -> &UrlSegmentResolver {
        &self.inner.segments
    }
}

pub struct SnapshotFactoryBuilder {
    repository: Arc<dyn ContentRepository>,
    content_types: Arc<dyn ContentTypeService>,
    profiles: Arc<dyn ProfileLookup>,
    segments: UrlSegmentResolver,
    converters: ConverterRegistry,
}

impl SnapshotFactoryBuilder {
    /// Append a provider; providers are consulted in the order they were added.
    pub fn segment_provider(mut self, provider: Arc<dyn UrlSegmentProvider>) -> Self {
        self.segments.push(provider);
        self
    }

    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = converters;
        self
    }

    pub fn build(self) -> SnapshotFactory {
        SnapshotFactory {
            inner: Arc::new(FactoryInner {
                repository: self.repository,
                content_types: self.content_types,
                profiles: self.profiles,
                segments: self.segments,
                converters: self.converters,
            }),
        }
    }
}
