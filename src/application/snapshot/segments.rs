//! URL segment resolution: an ordered provider chain with a default that
//! always produces a segment.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::{
    content::RawContentRecord,
    slug::{derive_segment, is_safe_segment},
};

/// Property alias conventionally used to override a content item's segment.
pub const DEFAULT_URL_NAME_PROPERTY: &str = "umbracoUrlName";

pub trait UrlSegmentProvider: Send + Sync {
    fn url_segment(&self, record: &RawContentRecord, culture: Option<&str>) -> Option<String>;
}

/// Slug of the (culture) name; the numeric id when the name has nothing
/// usable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUrlSegmentProvider;

impl DefaultUrlSegmentProvider {
    pub fn segment_for(&self, record: &RawContentRecord, culture: Option<&str>) -> String {
        let name = culture
            .and_then(|culture| record.publish_culture_infos.get(culture))
            .map(|info| info.name.as_str())
            .unwrap_or(record.name.as_str());

        derive_segment(name).unwrap_or_else(|_| record.id.to_string())
    }
}

impl UrlSegmentProvider for DefaultUrlSegmentProvider {
    fn url_segment(&self, record: &RawContentRecord, culture: Option<&str>) -> Option<String> {
        Some(self.segment_for(record, culture))
    }
}

/// Reads an explicit segment from a text property.
#[derive(Debug, Clone)]
pub struct UrlNamePropertyProvider {
    alias: String,
}

impl UrlNamePropertyProvider {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
        }
    }
}

impl Default for UrlNamePropertyProvider {
    fn default() -> Self {
        Self::new(DEFAULT_URL_NAME_PROPERTY)
    }
}

impl UrlSegmentProvider for UrlNamePropertyProvider {
    fn url_segment(&self, record: &RawContentRecord, culture: Option<&str>) -> Option<String> {
        let Value::String(text) = record.property(&self.alias)?.value_for(culture)? else {
            return None;
        };
        derive_segment(text).ok()
    }
}

#[derive(Clone, Default)]
pub struct UrlSegmentResolver {
    providers: Vec<Arc<dyn UrlSegmentProvider>>,
    fallback: DefaultUrlSegmentProvider,
}

impl UrlSegmentResolver {
    pub fn new(providers: Vec<Arc<dyn UrlSegmentProvider>>) -> Self {
        Self {
            providers,
            fallback: DefaultUrlSegmentProvider,
        }
    }

    pub fn push(&mut self, provider: Arc<dyn UrlSegmentProvider>) {
        self.providers.push(provider);
    }

    /// First provider answer wins; unsafe path components are ignored so a
    /// provider cannot steer output outside its directory.
    pub fn resolve(&self, record: &RawContentRecord, culture: Option<&str>) -> String {
        self.providers
            .iter()
            .filter_map(|provider| provider.url_segment(record, culture))
            .find(|segment| is_safe_segment(segment))
            .unwrap_or_else(|| self.fallback.segment_for(record, culture))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;
    use crate::domain::content::{CulturePublishRecord, RawProperty};

    struct Fixed(Option<&'static str>);

    impl UrlSegmentProvider for Fixed {
        fn url_segment(&self, _record: &RawContentRecord, _culture: Option<&str>) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[test]
    fn first_non_empty_provider_wins() {
        let resolver = UrlSegmentResolver::new(vec![
            Arc::new(Fixed(None)),
            Arc::new(Fixed(Some("second"))),
            Arc::new(Fixed(Some("third"))),
        ]);
        let record = RawContentRecord::new(1, "Home", "home");

        assert_eq!(resolver.resolve(&record, None), "second");
    }

    #[test]
    fn default_provider_applies_when_all_decline() {
        let resolver = UrlSegmentResolver::new(vec![Arc::new(Fixed(None))]);
        let record = RawContentRecord::new(7, "Our Products", "page");

        assert_eq!(resolver.resolve(&record, None), "our-products");
    }

    #[test]
    fn unsafe_provider_output_is_ignored() {
        let resolver = UrlSegmentResolver::new(vec![Arc::new(Fixed(Some("../etc")))]);
        let record = RawContentRecord::new(7, "Contact", "page");

        assert_eq!(resolver.resolve(&record, None), "contact");
    }

    #[test]
    fn unrepresentable_names_fall_back_to_id() {
        let record = RawContentRecord::new(42, "???", "page");
        assert_eq!(DefaultUrlSegmentProvider.segment_for(&record, None), "42");
    }

    #[test]
    fn culture_names_drive_culture_segments() {
        let mut record = RawContentRecord::new(3, "About", "page");
        record.publish_culture_infos = BTreeMap::from([(
            "da-DK".to_string(),
            CulturePublishRecord {
                name: "Om os".to_string(),
                date: OffsetDateTime::UNIX_EPOCH,
            },
        )]);

        let resolver = UrlSegmentResolver::default();
        assert_eq!(resolver.resolve(&record, Some("da-DK")), "om-os");
        assert_eq!(resolver.resolve(&record, None), "about");
    }

    #[test]
    fn url_name_property_overrides_name() {
        let mut record = RawContentRecord::new(3, "About", "page");
        let mut property = RawProperty::invariant(DEFAULT_URL_NAME_PROPERTY, json!("Who We Are"));
        property
            .culture_values
            .insert("da-DK".to_string(), json!("hvem-vi-er"));
        record.properties.push(property);

        let provider = UrlNamePropertyProvider::default();
        assert_eq!(
            provider.url_segment(&record, None).as_deref(),
            Some("who-we-are")
        );
        assert_eq!(
            provider.url_segment(&record, Some("da-DK")).as_deref(),
            Some("hvem-vi-er")
        );
    }
}
