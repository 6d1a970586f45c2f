//! Raw content records as owned by the content repository.
//!
//! These types are the mutable, relational side of the system: one record per
//! content item, referencing its parent by id and its content type by alias.
//! They are deserialized straight from site files, so every optional field
//! carries a serde default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Parent id carried by top-level content.
pub const ROOT_PARENT_ID: i32 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContentRecord {
    pub id: i32,
    /// Stable content key. Site files may leave it out; the loader then
    /// derives it from the id.
    #[serde(default)]
    pub key: Uuid,
    #[serde(default = "root_parent_id")]
    pub parent_id: i32,
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_level")]
    pub level: i32,
    #[serde(default)]
    pub sort_order: i32,
    pub name: String,
    pub content_type_alias: String,
    #[serde(default)]
    pub creator_id: i32,
    #[serde(default)]
    pub writer_id: i32,
    #[serde(default)]
    pub template_id: Option<i32>,
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")]
    pub create_date: OffsetDateTime,
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")]
    pub update_date: OffsetDateTime,
    #[serde(default = "published_by_default")]
    pub published: bool,
    #[serde(default)]
    pub publish_culture_infos: BTreeMap<String, CulturePublishRecord>,
    #[serde(default)]
    pub properties: Vec<RawProperty>,
}

impl RawContentRecord {
    /// Minimal record with the given identity; everything else takes its default.
    pub fn new(id: i32, name: impl Into<String>, content_type_alias: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            key: Self::derived_key(id),
            parent_id: ROOT_PARENT_ID,
            path: format!("{ROOT_PARENT_ID},{id}"),
            level: default_level(),
            sort_order: 0,
            name: name.into(),
            content_type_alias: content_type_alias.into(),
            creator_id: 0,
            writer_id: 0,
            template_id: None,
            create_date: now,
            update_date: now,
            published: true,
            publish_culture_infos: BTreeMap::new(),
            properties: Vec::new(),
        }
    }

    /// Name-based key for records that do not carry one, identical across loads.
    pub fn derived_key(id: i32) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("imprint:content:{id}").as_bytes())
    }

    pub fn with_property(mut self, alias: impl Into<String>, value: Value) -> Self {
        self.properties.push(RawProperty::invariant(alias, value));
        self
    }

    /// The parent id, or `None` for top-level content.
    pub fn parent(&self) -> Option<i32> {
        (self.parent_id != ROOT_PARENT_ID).then_some(self.parent_id)
    }

    /// Whether the record is published, either invariantly or for `culture`.
    pub fn is_culture_published(&self, culture: Option<&str>) -> bool {
        match culture {
            None => self.published,
            Some(culture) => self.publish_culture_infos.contains_key(culture),
        }
    }

    /// Case-sensitive lookup by alias.
    pub fn property(&self, alias: &str) -> Option<&RawProperty> {
        self.properties.iter().find(|property| property.alias == alias)
    }
}

fn root_parent_id() -> i32 {
    ROOT_PARENT_ID
}

fn default_level() -> i32 {
    1
}

fn published_by_default() -> bool {
    true
}

/// Publish metadata for one culture variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CulturePublishRecord {
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

/// One stored property value. Values are opaque JSON; the property editor
/// decides how to interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProperty {
    pub alias: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub culture_values: BTreeMap<String, Value>,
}

impl RawProperty {
    pub fn invariant(alias: impl Into<String>, value: Value) -> Self {
        Self {
            alias: alias.into(),
            value: Some(value),
            culture_values: BTreeMap::new(),
        }
    }

    /// Stored value for `culture`, falling back to the invariant value.
    pub fn value_for(&self, culture: Option<&str>) -> Option<&Value> {
        culture
            .and_then(|culture| self.culture_values.get(culture))
            .or(self.value.as_ref())
            .filter(|value| !value.is_null())
    }
}

/// Back-office user profile referenced by creator and writer ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i32,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn root_records_have_no_parent() {
        let record = RawContentRecord::new(1, "Home", "home");
        assert_eq!(record.parent(), None);

        let child = RawContentRecord {
            parent_id: 1,
            ..RawContentRecord::new(2, "About", "page")
        };
        assert_eq!(child.parent(), Some(1));
    }

    #[test]
    fn culture_value_falls_back_to_invariant() {
        let mut property = RawProperty::invariant("title", json!("Hello"));
        property
            .culture_values
            .insert("fr-FR".to_string(), json!("Bonjour"));

        assert_eq!(property.value_for(Some("fr-FR")), Some(&json!("Bonjour")));
        assert_eq!(property.value_for(Some("de-DE")), Some(&json!("Hello")));
        assert_eq!(property.value_for(None), Some(&json!("Hello")));
    }

    #[test]
    fn null_values_count_as_missing() {
        let property = RawProperty::invariant("body", Value::Null);
        assert_eq!(property.value_for(None), None);
    }

    #[test]
    fn property_lookup_is_case_sensitive() {
        let record = RawContentRecord::new(1, "Home", "home").with_property("title", json!("Hi"));
        assert!(record.property("title").is_some());
        assert!(record.property("Title").is_none());
    }

    #[test]
    fn culture_publish_state() {
        let mut record = RawContentRecord::new(1, "Home", "home");
        record.publish_culture_infos.insert(
            "en-US".to_string(),
            CulturePublishRecord {
                name: "Home".to_string(),
                date: OffsetDateTime::UNIX_EPOCH,
            },
        );

        assert!(record.is_culture_published(None));
        assert!(record.is_culture_published(Some("en-US")));
        assert!(!record.is_culture_published(Some("da-DK")));
    }
}
