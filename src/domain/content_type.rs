//! Content-type metadata: the declared, ordered set of property definitions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTypeDescriptor {
    pub id: i32,
    pub alias: String,
    #[serde(default)]
    pub varies_by_culture: bool,
    #[serde(default)]
    pub default_template_id: Option<i32>,
    #[serde(default, rename = "properties")]
    pub property_types: Vec<PropertyType>,
}

impl ContentTypeDescriptor {
    pub fn new(id: i32, alias: impl Into<String>) -> Self {
        Self {
            id,
            alias: alias.into(),
            varies_by_culture: false,
            default_template_id: None,
            property_types: Vec::new(),
        }
    }

    pub fn with_property(mut self, property_type: PropertyType) -> Self {
        self.property_types.push(property_type);
        self
    }

    pub fn varies_by_culture(&self) -> bool {
        self.varies_by_culture
    }
}

/// Declaration of one property on a content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyType {
    pub alias: String,
    #[serde(rename = "editor")]
    pub editor_alias: String,
    #[serde(default)]
    pub cache_level: PropertyCacheLevel,
    #[serde(default)]
    pub varies_by_culture: bool,
}

impl PropertyType {
    pub fn new(alias: impl Into<String>, editor_alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            editor_alias: editor_alias.into(),
            cache_level: PropertyCacheLevel::default(),
            varies_by_culture: false,
        }
    }

    pub fn with_cache_level(mut self, cache_level: PropertyCacheLevel) -> Self {
        self.cache_level = cache_level;
        self
    }
}

/// Advisory hint for how long a converted value may be reused.
///
/// Only [`PropertyCacheLevel::None`] changes behaviour: presentation values are
/// then recomputed on every read instead of being kept on the property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCacheLevel {
    #[default]
    Unknown,
    Element,
    Elements,
    Snapshot,
    None,
}
