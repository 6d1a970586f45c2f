use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Weak},
};

use once_cell::sync::OnceCell;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{content::RawContentRecord, content_type::ContentTypeDescriptor};

use super::{
    factory::{SnapshotError, SnapshotFactory},
    property::PropertyView,
    values::PublishedValue,
};

/// Published metadata of one culture variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CultureInfo {
    pub culture: String,
    pub name: String,
    pub url_segment: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

/// Immutable read view over one raw record for one (preview, culture) context.
///
/// Identity fields are copied from the record. Everything that needs a
/// lookup or a conversion is computed on first read and kept for the life of
/// the snapshot, so reading a field twice never re-queries the repository.
/// Lookup failures are returned to the caller and not kept.
pub struct ContentSnapshot {
    record: RawContentRecord,
    content_type: Arc<ContentTypeDescriptor>,
    preview: bool,
    culture: Option<String>,
    factory: SnapshotFactory,
    this: Weak<ContentSnapshot>,
    creator_name: OnceCell<Option<String>>,
    writer_name: OnceCell<Option<String>>,
    properties: OnceCell<Vec<PropertyView>>,
    parent: OnceCell<Option<Arc<ContentSnapshot>>>,
    children: OnceCell<Vec<Arc<ContentSnapshot>>>,
    cultures: OnceCell<BTreeMap<String, CultureInfo>>,
    url_segment: OnceCell<String>,
    route: OnceCell<String>,
}

impl ContentSnapshot {
    pub(super) fn new_cyclic(
        record: RawContentRecord,
        content_type: Arc<ContentTypeDescriptor>,
        preview: bool,
        culture: Option<String>,
        factory: SnapshotFactory,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            record,
            content_type,
            preview,
            culture,
            factory,
            this: this.clone(),
            creator_name: OnceCell::new(),
            writer_name: OnceCell::new(),
            properties: OnceCell::new(),
            parent: OnceCell::new(),
            children: OnceCell::new(),
            cultures: OnceCell::new(),
            url_segment: OnceCell::new(),
            route: OnceCell::new(),
        })
    }

    pub fn id(&self) -> i32 {
        self.record.id
    }

    pub fn key(&self) -> Uuid {
        self.record.key
    }

    pub fn path(&self) -> &str {
        &self.record.path
    }

    pub fn level(&self) -> i32 {
        self.record.level
    }

    pub fn sort_order(&self) -> i32 {
        self.record.sort_order
    }

    /// The culture variant's name when this snapshot has a culture with
    /// publish data, otherwise the invariant name.
    pub fn name(&self) -> &str {
        self.culture
            .as_deref()
            .and_then(|culture| self.record.publish_culture_infos.get(culture))
            .map(|info| info.name.as_str())
            .unwrap_or(&self.record.name)
    }

    pub fn template_id(&self) -> Option<i32> {
        self.record.template_id
    }

    pub fn create_date(&self) -> OffsetDateTime {
        self.record.create_date
    }

    pub fn update_date(&self) -> OffsetDateTime {
        self.record.update_date
    }

    pub fn creator_id(&self) -> i32 {
        self.record.creator_id
    }

    pub fn writer_id(&self) -> i32 {
        self.record.writer_id
    }

    pub fn content_type(&self) -> &ContentTypeDescriptor {
        &self.content_type
    }

    pub fn is_preview(&self) -> bool {
        self.preview
    }

    pub fn culture(&self) -> Option<&str> {
        self.culture.as_deref()
    }

    /// The record this snapshot was built from.
    pub fn record(&self) -> &RawContentRecord {
        &self.record
    }

    pub fn is_published(&self, culture: Option<&str>) -> bool {
        self.record.is_culture_published(culture)
    }

    pub fn is_draft(&self, culture: Option<&str>) -> bool {
        !self.is_published(culture)
    }

    pub fn creator_name(&self) -> Result<Option<&str>, SnapshotError> {
        let name = self.creator_name.get_or_try_init(|| {
            let profile = self.factory.profiles().creator_profile(&self.record)?;
            Ok::<_, SnapshotError>(profile.map(|profile| profile.name))
        })?;
        Ok(name.as_deref())
    }

    pub fn writer_name(&self) -> Result<Option<&str>, SnapshotError> {
        let name = self.writer_name.get_or_try_init(|| {
            let profile = self.factory.profiles().writer_profile(&self.record)?;
            Ok::<_, SnapshotError>(profile.map(|profile| profile.name))
        })?;
        Ok(name.as_deref())
    }

    /// Properties in the content type's declared order.
    pub fn properties(&self) -> &[PropertyView] {
        self.properties.get_or_init(|| {
            self.factory.property_views(
                &self.this,
                &self.record,
                &self.content_type,
                self.preview,
                self.culture(),
            )
        })
    }

    pub fn property(&self, alias: &str) -> Option<&PropertyView> {
        self.properties()
            .iter()
            .find(|property| property.alias_matches(alias))
    }

    pub fn has_value(&self, alias: &str) -> bool {
        self.property(alias).is_some_and(PropertyView::has_value)
    }

    pub fn value(&self, alias: &str) -> PublishedValue {
        self.property(alias)
            .map_or(PublishedValue::None, PropertyView::value)
    }

    /// `Ok(None)` at the root.
    pub fn parent(&self) -> Result<Option<&Arc<ContentSnapshot>>, SnapshotError> {
        let parent = self.parent.get_or_try_init(|| match self.record.parent() {
            None => Ok(None),
            Some(parent_id) => {
                self.factory
                    .build_by_id(parent_id, self.preview, self.culture.clone())
            }
        })?;
        Ok(parent.as_ref())
    }

    /// All children, ascending by sort order.
    pub fn children(&self) -> Result<&[Arc<ContentSnapshot>], SnapshotError> {
        let children = self.children.get_or_try_init(|| {
            self.factory
                .build_children(self.record.id, self.preview, self.culture.clone())
        })?;
        Ok(children)
    }

    /// Culture variants keyed by culture code; empty for invariant content.
    pub fn cultures(&self) -> &BTreeMap<String, CultureInfo> {
        self.cultures.get_or_init(|| {
            if !self.content_type.varies_by_culture() {
                return BTreeMap::new();
            }
            self.record
                .publish_culture_infos
                .iter()
                .map(|(culture, info)| {
                    let entry = CultureInfo {
                        culture: culture.clone(),
                        name: info.name.clone(),
                        url_segment: self.factory.segments().resolve(&self.record, Some(culture)),
                        date: info.date,
                    };
                    (culture.clone(), entry)
                })
                .collect()
        })
    }

    pub fn url_segment(&self) -> &str {
        self.url_segment
            .get_or_init(|| self.factory.segments().resolve(&self.record, self.culture()))
    }

    /// Site-relative route such as `/` or `/blog/first-post/`.
    ///
    /// Only the first root is hidden from paths: it maps to `/`, so its
    /// children sit at `/<segment>/`. Other roots are `/<segment>/` and keep
    /// their segment in every descendant route.
    pub fn route(&self) -> Result<&str, SnapshotError> {
        let route = self.route.get_or_try_init(|| {
            let route = match self.parent()? {
                None if self.sort_order() == 0 => "/".to_string(),
                None => format!("/{}/", self.url_segment()),
                Some(parent) => format!("{}{}/", parent.route()?, self.url_segment()),
            };
            Ok::<_, SnapshotError>(route)
        })?;
        Ok(route)
    }

    /// Snapshot of another content item in this snapshot's context.
    pub fn resolve_reference(&self, id: i32) -> Result<Option<Arc<ContentSnapshot>>, SnapshotError> {
        self.factory.build_by_id(id, self.preview, self.culture.clone())
    }
}

/// Two snapshots are equal when they view the same record in the same context.
impl PartialEq for ContentSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.record.key == other.record.key
            && self.preview == other.preview
            && self.culture == other.culture
    }
}

impl fmt::Debug for ContentSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentSnapshot")
            .field("id", &self.record.id)
            .field("key", &self.record.key)
            .field("name", &self.name())
            .field("content_type", &self.content_type.alias)
            .field("preview", &self.preview)
            .field("culture", &self.culture)
            .finish_non_exhaustive()
    }
}
