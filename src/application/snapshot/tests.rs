use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};

use serde_json::json;
use time::OffsetDateTime;

use super::*;
use crate::{
    application::repos::{ContentRepository, ContentTypeService, ProfileLookup, RepoError},
    domain::{
        content::{CulturePublishRecord, Profile, RawContentRecord, RawProperty},
        content_type::{ContentTypeDescriptor, PropertyCacheLevel, PropertyType},
    },
};

/// Repository fixture that counts every lookup it serves.
#[derive(Default)]
struct CountingRepo {
    records: BTreeMap<i32, RawContentRecord>,
    content_types: HashMap<String, Arc<ContentTypeDescriptor>>,
    profiles: HashMap<i32, Profile>,
    by_id_calls: AtomicUsize,
    children_calls: AtomicUsize,
    profile_calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl CountingRepo {
    fn with_type(mut self, content_type: ContentTypeDescriptor) -> Self {
        self.content_types
            .insert(content_type.alias.clone(), Arc::new(content_type));
        self
    }

    fn with_record(mut self, record: RawContentRecord) -> Self {
        self.records.insert(record.id, record);
        self
    }

    fn with_profile(mut self, id: i32, name: &str) -> Self {
        self.profiles.insert(
            id,
            Profile {
                id,
                name: name.to_string(),
            },
        );
        self
    }

    fn fail_once(&self) -> Result<(), RepoError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(())
    }
}

impl ContentRepository for CountingRepo {
    fn get_by_id(&self, id: i32) -> Result<Option<RawContentRecord>, RepoError> {
        self.by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.fail_once()?;
        Ok(self.records.get(&id).cloned())
    }

    fn get_children(&self, parent_id: i32) -> Result<Vec<RawContentRecord>, RepoError> {
        self.children_calls.fetch_add(1, Ordering::SeqCst);
        self.fail_once()?;
        Ok(self
            .records
            .values()
            .filter(|record| record.parent_id == parent_id)
            .cloned()
            .collect())
    }
}

impl ContentTypeService for CountingRepo {
    fn content_type_of(&self, record: &RawContentRecord) -> Option<Arc<ContentTypeDescriptor>> {
        self.content_types.get(&record.content_type_alias).cloned()
    }
}

impl ProfileLookup for CountingRepo {
    fn creator_profile(&self, record: &RawContentRecord) -> Result<Option<Profile>, RepoError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.profiles.get(&record.creator_id).cloned())
    }

    fn writer_profile(&self, record: &RawContentRecord) -> Result<Option<Profile>, RepoError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.profiles.get(&record.writer_id).cloned())
    }
}

fn page_type() -> ContentTypeDescriptor {
    ContentTypeDescriptor::new(1, "page")
        .with_property(PropertyType::new("title", EDITOR_TEXTSTRING))
        .with_property(PropertyType::new("body", EDITOR_MARKDOWN))
        .with_property(PropertyType::new("count", EDITOR_INTEGER))
        .with_property(PropertyType::new("related", EDITOR_CONTENT_PICKER))
}

fn child(id: i32, parent_id: i32, name: &str, sort_order: i32) -> RawContentRecord {
    RawContentRecord {
        parent_id,
        level: 2,
        sort_order,
        path: format!("-1,{parent_id},{id}"),
        ..RawContentRecord::new(id, name, "page")
    }
}

/// Home (1) with About Us (2, sort 1) and Blog (4, sort 0); Team (3) under About Us.
fn site() -> CountingRepo {
    let team = RawContentRecord {
        level: 3,
        path: "-1,1,2,3".to_string(),
        ..child(3, 2, "Team", 0)
    };
    CountingRepo::default()
        .with_type(page_type())
        .with_record(RawContentRecord::new(1, "Home", "page"))
        .with_record(child(2, 1, "About Us", 1))
        .with_record(team)
        .with_record(child(4, 1, "Blog", 0))
}

fn factory(repo: &Arc<CountingRepo>) -> SnapshotFactory {
    SnapshotFactory::new(repo.clone(), repo.clone(), repo.clone())
}

fn snapshot_of(repo: &Arc<CountingRepo>, id: i32) -> Arc<ContentSnapshot> {
    factory(repo)
        .build_by_id(id, false, None)
        .expect("lookup")
        .expect("record exists")
}

#[test]
fn parent_is_resolved_once() {
    let repo = Arc::new(site());
    let about = snapshot_of(&repo, 2);
    let before = repo.by_id_calls.load(Ordering::SeqCst);

    let first = about.parent().unwrap().cloned().expect("has parent");
    let second = about.parent().unwrap().cloned().expect("has parent");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.id(), 1);
    assert_eq!(repo.by_id_calls.load(Ordering::SeqCst), before + 1);
}

#[test]
fn children_resolve_once_under_concurrent_readers() {
    let repo = Arc::new(site());
    let home = snapshot_of(&repo, 1);

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let ids: Vec<i32> = home.children().unwrap().iter().map(|c| c.id()).collect();
                assert_eq!(ids, vec![4, 2]);
            });
        }
    });

    assert_eq!(repo.children_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn children_are_ordered_by_sort_order() {
    let repo = Arc::new(site());
    let home = snapshot_of(&repo, 1);

    let names: Vec<&str> = home.children().unwrap().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["Blog", "About Us"]);
    assert!(snapshot_of(&repo, 3).children().unwrap().is_empty());
}

#[test]
fn lookup_failures_are_not_kept() {
    let repo = Arc::new(site());
    let about = snapshot_of(&repo, 2);

    repo.fail_next.store(true, Ordering::SeqCst);
    let err = about.parent().expect_err("first lookup fails");
    assert!(matches!(err, SnapshotError::Repository(RepoError::Timeout)));

    let parent = about.parent().unwrap().expect("retry succeeds");
    assert_eq!(parent.name(), "Home");
}

#[test]
fn profile_names_resolve_once() {
    let repo = site().with_profile(7, "Editor");
    let mut record = RawContentRecord::new(9, "Draft", "page");
    record.creator_id = 7;
    record.writer_id = 8;
    let repo = Arc::new(repo.with_record(record));
    let snapshot = snapshot_of(&repo, 9);

    assert_eq!(snapshot.creator_name().unwrap(), Some("Editor"));
    assert_eq!(snapshot.creator_name().unwrap(), Some("Editor"));
    assert_eq!(snapshot.writer_name().unwrap(), None);
    assert_eq!(repo.profile_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn properties_follow_declaration_order() {
    let mut record = RawContentRecord::new(10, "Ordered", "page");
    record.properties = vec![
        RawProperty::invariant("count", json!(3)),
        RawProperty::invariant("title", json!("First")),
    ];
    let repo = Arc::new(site().with_record(record));
    let snapshot = snapshot_of(&repo, 10);

    let aliases: Vec<&str> = snapshot.properties().iter().map(|p| p.alias()).collect();
    assert_eq!(aliases, vec!["title", "body", "count", "related"]);
    assert_eq!(snapshot.value("count"), PublishedValue::Integer(3));
    assert!(std::ptr::eq(snapshot.properties(), snapshot.properties()));
}

#[test]
fn missing_and_blank_values_have_no_value() {
    let record = RawContentRecord::new(11, "Sparse", "page").with_property("title", json!("   "));
    let repo = Arc::new(site().with_record(record));
    let snapshot = snapshot_of(&repo, 11);

    let title = snapshot.property("TITLE").expect("aliases ignore case");
    assert!(!title.has_value());
    assert_eq!(title.source_value(), Some(&json!("   ")));

    let body = snapshot.property("body").expect("declared property");
    assert!(!body.has_value());
    assert_eq!(body.source_value(), None);
    assert!(body.value().is_none());

    assert!(snapshot.property("undeclared").is_none());
    assert!(snapshot.value("undeclared").is_none());
}

#[test]
fn invariant_properties_ignore_the_snapshot_culture() {
    let mut localized = ContentTypeDescriptor::new(2, "article")
        .with_property(PropertyType::new("title", EDITOR_TEXTSTRING))
        .with_property(PropertyType {
            varies_by_culture: true,
            ..PropertyType::new("headline", EDITOR_TEXTSTRING)
        });
    localized.varies_by_culture = true;

    let mut title = RawProperty::invariant("title", json!("Shared"));
    title
        .culture_values
        .insert("fr-FR".to_string(), json!("Ignored"));
    let mut headline = RawProperty::invariant("headline", json!("Hello"));
    headline
        .culture_values
        .insert("fr-FR".to_string(), json!("Bonjour"));

    let mut record = RawContentRecord::new(12, "Article", "article");
    record.properties = vec![title, headline];
    record.publish_culture_infos = BTreeMap::from([(
        "fr-FR".to_string(),
        CulturePublishRecord {
            name: "Article FR".to_string(),
            date: OffsetDateTime::UNIX_EPOCH,
        },
    )]);

    let repo = Arc::new(CountingRepo::default().with_type(localized).with_record(record));
    let snapshot = factory(&repo)
        .build_by_id(12, false, Some("fr-FR".to_string()))
        .unwrap()
        .unwrap();

    assert_eq!(snapshot.name(), "Article FR");
    assert_eq!(snapshot.value("title"), PublishedValue::Text("Shared".into()));
    assert_eq!(snapshot.value("headline"), PublishedValue::Text("Bonjour".into()));
    assert_eq!(snapshot.cultures()["fr-FR"].url_segment, "article-fr");
}

#[test]
fn routes_hide_only_the_first_root() {
    let repo = Arc::new(site());

    assert_eq!(snapshot_of(&repo, 1).route().unwrap(), "/");
    assert_eq!(snapshot_of(&repo, 2).route().unwrap(), "/about-us/");
    assert_eq!(snapshot_of(&repo, 3).route().unwrap(), "/about-us/team/");
}

#[test]
fn routes_keep_the_segment_of_later_roots() {
    let other = RawContentRecord {
        sort_order: 1,
        ..RawContentRecord::new(10, "Other", "page")
    };
    let repo = Arc::new(
        site()
            .with_record(other)
            .with_record(child(11, 1, "About", 2))
            .with_record(child(12, 10, "About", 0)),
    );

    assert_eq!(snapshot_of(&repo, 10).route().unwrap(), "/other/");
    assert_eq!(snapshot_of(&repo, 11).route().unwrap(), "/about/");
    assert_eq!(snapshot_of(&repo, 12).route().unwrap(), "/other/about/");
}

#[test]
fn invariant_types_report_no_cultures() {
    let mut record = RawContentRecord::new(14, "Invariant", "page");
    record.publish_culture_infos = BTreeMap::from([(
        "de-DE".to_string(),
        CulturePublishRecord {
            name: "Unveraenderlich".to_string(),
            date: OffsetDateTime::UNIX_EPOCH,
        },
    )]);
    let repo = Arc::new(site().with_record(record));

    let snapshot = snapshot_of(&repo, 14);
    assert!(!snapshot.content_type().varies_by_culture);
    assert!(snapshot.cultures().is_empty());
}

#[test]
fn unknown_content_type_is_a_schema_error() {
    let repo = Arc::new(site());
    let err = factory(&repo)
        .build(RawContentRecord::new(20, "Orphan", "missing"), false)
        .expect_err("no such content type");

    assert!(matches!(
        err,
        SnapshotError::SchemaResolution { content_id: 20, ref alias } if alias == "missing"
    ));
}

#[test]
fn missing_ids_build_nothing() {
    let repo = Arc::new(site());
    assert!(factory(&repo).build_by_id(404, false, None).unwrap().is_none());
}

#[test]
fn markdown_renders_to_html() {
    let record = RawContentRecord::new(13, "Post", "page").with_property("body", json!("**bold**"));
    let repo = Arc::new(site().with_record(record));
    let snapshot = snapshot_of(&repo, 13);

    let value = snapshot.value("body");
    assert!(value.is_html());
    assert_eq!(value.as_text(), Some("<p><strong>bold</strong></p>\n"));
    assert_eq!(
        snapshot.property("body").unwrap().xpath_value(),
        XPathValue::Text("**bold**".to_string())
    );
}

#[test]
fn content_picker_skips_missing_and_unpublished_items() {
    let hidden = RawContentRecord {
        published: false,
        ..RawContentRecord::new(15, "Hidden", "page")
    };
    let record =
        RawContentRecord::new(14, "Links", "page").with_property("related", json!("2,15,404"));
    let repo = Arc::new(site().with_record(hidden).with_record(record));

    let PublishedValue::Content(items) = snapshot_of(&repo, 14).value("related") else {
        panic!("expected content references");
    };
    let ids: Vec<i32> = items.iter().map(|item| item.id()).collect();
    assert_eq!(ids, vec![2]);

    let preview = factory(&repo).build_by_id(14, true, None).unwrap().unwrap();
    let PublishedValue::Content(items) = preview.value("related") else {
        panic!("expected content references");
    };
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item.is_preview()));
}

#[test]
fn uncached_properties_recompute_presentation_values() {
    let repo = Arc::new(
        CountingRepo::default()
            .with_type(ContentTypeDescriptor::new(3, "linked").with_property(
                PropertyType::new("related", EDITOR_CONTENT_PICKER)
                    .with_cache_level(PropertyCacheLevel::None),
            ))
            .with_record(RawContentRecord::new(1, "Target", "linked"))
            .with_record(
                RawContentRecord::new(2, "Source", "linked").with_property("related", json!(1)),
            ),
    );
    let snapshot = snapshot_of(&repo, 2);
    let before = repo.by_id_calls.load(Ordering::SeqCst);

    snapshot.value("related");
    snapshot.value("related");

    assert_eq!(repo.by_id_calls.load(Ordering::SeqCst), before + 2);
}

#[test]
fn snapshots_compare_by_key_and_context() {
    let repo = Arc::new(site());
    let first = snapshot_of(&repo, 1);
    let again = snapshot_of(&repo, 1);
    let preview = factory(&repo).build_by_id(1, true, None).unwrap().unwrap();

    assert_eq!(first, again);
    assert_ne!(*first, *preview);
}
