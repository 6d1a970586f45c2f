//! In-memory content repository, loadable from a TOML site file.
//!
//! ```toml
//! [[content_types]]
//! id = 1
//! alias = "home"
//! default_template_id = 1
//!
//! [[content_types.properties]]
//! alias = "title"
//! editor = "textstring"
//!
//! [[profiles]]
//! id = 0
//! name = "Administrator"
//!
//! [[content]]
//! id = 1054
//! name = "Home"
//! content_type_alias = "home"
//!
//! [[content.properties]]
//! alias = "title"
//! value = "Welcome"
//! ```

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
    sync::{Arc, RwLock},
};

use serde::Deserialize;

use crate::{
    application::repos::{ContentRepository, ContentTypeService, ProfileLookup, RepoError},
    domain::{
        content::{Profile, RawContentRecord},
        content_type::ContentTypeDescriptor,
        error::DomainError,
    },
    util::lock::{rw_read, rw_write},
};

use super::error::InfraError;

const SOURCE: &str = "infra::content_store";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SiteFile {
    pub content_types: Vec<ContentTypeDescriptor>,
    pub profiles: Vec<Profile>,
    pub content: Vec<RawContentRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    records: RwLock<BTreeMap<i32, RawContentRecord>>,
    content_types: RwLock<HashMap<String, Arc<ContentTypeDescriptor>>>,
    profiles: RwLock<HashMap<i32, Profile>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and validate a TOML site file.
    pub async fn load(path: &Path) -> Result<Self, InfraError> {
        let text = tokio::fs::read_to_string(path).await?;
        let site: SiteFile = toml::from_str(&text)
            .map_err(|err| InfraError::content_source(path, err.to_string()))?;
        Ok(Self::from_site(site)?)
    }

    /// Build a store from parsed site data, rejecting duplicate identifiers
    /// and broken parent chains, and filling in `key`, `path` and `level` for
    /// records that leave them empty.
    pub fn from_site(site: SiteFile) -> Result<Self, DomainError> {
        let store = Self::new();

        for content_type in site.content_types {
            if store.content_type(&content_type.alias).is_some() {
                return Err(DomainError::duplicate("content type", &content_type.alias));
            }
            store.insert_content_type(content_type);
        }

        for profile in site.profiles {
            let id = profile.id;
            if rw_write(&store.profiles, SOURCE, "from_site")
                .insert(id, profile)
                .is_some()
            {
                return Err(DomainError::duplicate("profile", id));
            }
        }

        let mut records = BTreeMap::new();
        for mut record in site.content {
            let id = record.id;
            if record.key.is_nil() {
                record.key = RawContentRecord::derived_key(id);
            }
            if records.insert(id, record).is_some() {
                return Err(DomainError::duplicate("content", id));
            }
        }
        check_ancestry(&records)?;
        fill_hierarchy(&mut records)?;
        *rw_write(&store.records, SOURCE, "from_site") = records;

        Ok(store)
    }

    pub fn insert_content_type(&self, content_type: ContentTypeDescriptor) {
        rw_write(&self.content_types, SOURCE, "insert_content_type")
            .insert(content_type.alias.clone(), Arc::new(content_type));
    }

    pub fn insert_profile(&self, profile: Profile) {
        rw_write(&self.profiles, SOURCE, "insert_profile").insert(profile.id, profile);
    }

    pub fn content_type(&self, alias: &str) -> Option<Arc<ContentTypeDescriptor>> {
        rw_read(&self.content_types, SOURCE, "content_type")
            .get(alias)
            .cloned()
    }

    /// Insert or replace a record, returning the previous version.
    pub fn save(&self, record: RawContentRecord) -> Option<RawContentRecord> {
        rw_write(&self.records, SOURCE, "save").insert(record.id, record)
    }

    pub fn remove(&self, id: i32) -> Option<RawContentRecord> {
        rw_write(&self.records, SOURCE, "remove").remove(&id)
    }

    /// All records, parents before children, siblings by sort order.
    pub fn records(&self) -> Vec<RawContentRecord> {
        let mut records: Vec<RawContentRecord> = rw_read(&self.records, SOURCE, "records")
            .values()
            .cloned()
            .collect();
        records.sort_by_key(|record| (record.level, record.parent_id, record.sort_order, record.id));
        records
    }

    pub fn len(&self) -> usize {
        rw_read(&self.records, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentRepository for InMemoryContentStore {
    fn get_by_id(&self, id: i32) -> Result<Option<RawContentRecord>, RepoError> {
        Ok(rw_read(&self.records, SOURCE, "get_by_id").get(&id).cloned())
    }

    fn get_children(&self, parent_id: i32) -> Result<Vec<RawContentRecord>, RepoError> {
        Ok(rw_read(&self.records, SOURCE, "get_children")
            .values()
            .filter(|record| record.parent_id == parent_id)
            .cloned()
            .collect())
    }
}

impl ContentTypeService for InMemoryContentStore {
    fn content_type_of(&self, record: &RawContentRecord) -> Option<Arc<ContentTypeDescriptor>> {
        self.content_type(&record.content_type_alias)
    }
}

impl ProfileLookup for InMemoryContentStore {
    fn creator_profile(&self, record: &RawContentRecord) -> Result<Option<Profile>, RepoError> {
        Ok(rw_read(&self.profiles, SOURCE, "creator_profile")
            .get(&record.creator_id)
            .cloned())
    }

    fn writer_profile(&self, record: &RawContentRecord) -> Result<Option<Profile>, RepoError> {
        Ok(rw_read(&self.profiles, SOURCE, "writer_profile")
            .get(&record.writer_id)
            .cloned())
    }
}

/// Every parent chain must end at the root without revisiting a record,
/// whether or not the records declare their own paths.
fn check_ancestry(records: &BTreeMap<i32, RawContentRecord>) -> Result<(), DomainError> {
    for (&id, record) in records {
        let mut seen = HashSet::from([id]);
        let mut next = record.parent();

        while let Some(parent_id) = next {
            let parent = records.get(&parent_id).ok_or_else(|| {
                DomainError::validation(format!(
                    "content {parent_id} is referenced as a parent but does not exist"
                ))
            })?;
            if !seen.insert(parent_id) {
                return Err(DomainError::validation(format!(
                    "content {id} is part of a parent cycle"
                )));
            }
            next = parent.parent();
        }
    }
    Ok(())
}

fn fill_hierarchy(records: &mut BTreeMap<i32, RawContentRecord>) -> Result<(), DomainError> {
    let ids: Vec<i32> = records.keys().copied().collect();
    for id in ids {
        resolve_path(records, id, 0)?;
    }
    Ok(())
}

/// Returns `(path, level)` for `id`, computing and storing it when the record
/// does not declare a path.
fn resolve_path(
    records: &mut BTreeMap<i32, RawContentRecord>,
    id: i32,
    depth: usize,
) -> Result<(String, i32), DomainError> {
    if depth > records.len() {
        return Err(DomainError::validation(format!(
            "content {id} is part of a parent cycle"
        )));
    }

    let (parent, path, level) = match records.get(&id) {
        Some(record) => (record.parent(), record.path.clone(), record.level),
        None => {
            return Err(DomainError::validation(format!(
                "content {id} is referenced as a parent but does not exist"
            )));
        }
    };
    if !path.is_empty() {
        return Ok((path, level));
    }

    let (path, level) = match parent {
        None => (format!("-1,{id}"), 1),
        Some(parent_id) => {
            let (parent_path, parent_level) = resolve_path(records, parent_id, depth + 1)?;
            (format!("{parent_path},{id}"), parent_level + 1)
        }
    };

    if let Some(record) = records.get_mut(&id) {
        record.path = path.clone();
        record.level = level;
    }
    Ok((path, level))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = r#"
        [[content_types]]
        id = 1
        alias = "page"
        default_template_id = 3

        [[content_types.properties]]
        alias = "title"
        editor = "textstring"

        [[profiles]]
        id = 7
        name = "Editor"

        [[content]]
        id = 10
        name = "Home"
        content_type_alias = "page"
        writer_id = 7

        [[content]]
        id = 12
        parent_id = 11
        name = "Deep"
        content_type_alias = "page"

        [[content]]
        id = 11
        parent_id = 10
        sort_order = 1
        name = "About"
        content_type_alias = "page"

        [[content.properties]]
        alias = "title"
        value = "About us"
    "#;

    fn store() -> InMemoryContentStore {
        let site: SiteFile = toml::from_str(SITE).expect("site parses");
        InMemoryContentStore::from_site(site).expect("site is valid")
    }

    #[test]
    fn hierarchy_is_derived_from_parents() {
        let store = store();

        let deep = store.get_by_id(12).unwrap().expect("record");
        assert_eq!(deep.path, "-1,10,11,12");
        assert_eq!(deep.level, 3);

        let order: Vec<i32> = store.records().iter().map(|record| record.id).collect();
        assert_eq!(order, vec![10, 11, 12]);
    }

    #[test]
    fn lookups_resolve_types_children_and_profiles() {
        let store = store();
        let home = store.get_by_id(10).unwrap().expect("record");

        let content_type = store.content_type_of(&home).expect("content type");
        assert_eq!(content_type.default_template_id, Some(3));
        assert_eq!(content_type.property_types[0].editor_alias, "textstring");

        let children = store.get_children(10).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "About");

        assert_eq!(
            store.writer_profile(&home).unwrap().map(|profile| profile.name),
            Some("Editor".to_string())
        );
        assert_eq!(store.creator_profile(&home).unwrap(), None);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let site = SiteFile {
            content: vec![
                RawContentRecord::new(1, "A", "page"),
                RawContentRecord::new(1, "B", "page"),
            ],
            ..SiteFile::default()
        };

        assert!(matches!(
            InMemoryContentStore::from_site(site),
            Err(DomainError::Duplicate { entity: "content", .. })
        ));
    }

    #[test]
    fn dangling_parents_are_rejected() {
        let orphan = RawContentRecord {
            parent_id: 99,
            path: String::new(),
            ..RawContentRecord::new(1, "Orphan", "page")
        };
        let site = SiteFile {
            content: vec![orphan],
            ..SiteFile::default()
        };

        assert!(matches!(
            InMemoryContentStore::from_site(site),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn parent_cycles_are_rejected_even_with_declared_paths() {
        let site: SiteFile = toml::from_str(
            r#"
            [[content]]
            id = 1
            parent_id = 2
            path = "-1,2,1"
            level = 2
            name = "A"
            content_type_alias = "page"

            [[content]]
            id = 2
            parent_id = 1
            path = "-1,1,2"
            level = 2
            name = "B"
            content_type_alias = "page"
            "#,
        )
        .expect("site parses");

        let err = InMemoryContentStore::from_site(site).expect_err("cycle");
        assert!(matches!(
            err,
            DomainError::Validation { ref message } if message.contains("cycle")
        ));
    }

    #[test]
    fn dangling_parents_are_rejected_with_declared_paths() {
        let orphan = RawContentRecord {
            parent_id: 99,
            path: "-1,99,1".to_string(),
            ..RawContentRecord::new(1, "Orphan", "page")
        };
        let site = SiteFile {
            content: vec![orphan],
            ..SiteFile::default()
        };

        assert!(matches!(
            InMemoryContentStore::from_site(site),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn missing_keys_are_derived_from_ids() {
        let first = store().get_by_id(10).unwrap().expect("record");
        let second = store().get_by_id(10).unwrap().expect("record");

        assert!(!first.key.is_nil());
        assert_eq!(first.key, second.key);
        assert_eq!(first.key, RawContentRecord::derived_key(10));
        assert_ne!(first.key, RawContentRecord::derived_key(11));
    }

    #[tokio::test]
    async fn load_reads_site_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("site.toml");
        tokio::fs::write(&path, SITE).await.expect("write site");

        let store = InMemoryContentStore::load(&path).await.expect("load");
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.toml");
        tokio::fs::write(&path, "[[content]]\nid = \"nope\"")
            .await
            .expect("write site");

        let err = InMemoryContentStore::load(&path)
            .await
            .expect_err("invalid site");
        assert!(matches!(err, InfraError::ContentSource { .. }));
    }
}
