use std::{
    fmt,
    sync::{Arc, Weak},
};

use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::domain::content_type::{PropertyCacheLevel, PropertyType};

use super::{
    content::ContentSnapshot,
    converters::{ConversionContext, PropertyValueConverter},
    values::{InterValue, PublishedValue, XPathValue},
};

/// Read view over one property of a snapshot.
///
/// The source value is captured when the owning snapshot materialises its
/// properties and is never re-fetched. The interim value is computed once;
/// the presentation value is kept as well unless the property type opts out
/// with [`PropertyCacheLevel::None`].
pub struct PropertyView {
    owner: Weak<ContentSnapshot>,
    property_type: Arc<PropertyType>,
    converter: Arc<dyn PropertyValueConverter>,
    source: Option<Value>,
    preview: bool,
    inter: OnceCell<InterValue>,
    object: OnceCell<PublishedValue>,
}

impl PropertyView {
    pub(crate) fn new(
        owner: Weak<ContentSnapshot>,
        property_type: Arc<PropertyType>,
        converter: Arc<dyn PropertyValueConverter>,
        source: Option<Value>,
        preview: bool,
    ) -> Self {
        Self {
            owner,
            property_type,
            converter,
            source,
            preview,
            inter: OnceCell::new(),
            object: OnceCell::new(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.property_type.alias
    }

    /// Aliases compare case-insensitively.
    pub fn alias_matches(&self, alias: &str) -> bool {
        self.property_type.alias.eq_ignore_ascii_case(alias)
    }

    pub fn property_type(&self) -> &PropertyType {
        &self.property_type
    }

    pub fn cache_level(&self) -> PropertyCacheLevel {
        self.property_type.cache_level
    }

    /// False for a missing value and for strings that are only whitespace.
    pub fn has_value(&self) -> bool {
        match &self.source {
            None | Some(Value::Null) => false,
            Some(Value::String(text)) => !text.trim().is_empty(),
            Some(_) => true,
        }
    }

    /// The stored value, untouched by either conversion stage.
    pub fn source_value(&self) -> Option<&Value> {
        self.source.as_ref()
    }

    pub fn value(&self) -> PublishedValue {
        let Some(owner) = self.owner.upgrade() else {
            return PublishedValue::None;
        };
        let ctx = self.context(&owner);
        let inter = self.inter(&ctx);

        if self.cache_level() == PropertyCacheLevel::None {
            return self.converter.inter_to_object(&ctx, inter);
        }
        self.object
            .get_or_init(|| self.converter.inter_to_object(&ctx, inter))
            .clone()
    }

    /// Same interim stage as [`PropertyView::value`], converted into a
    /// queryable tree instead of a template object.
    pub fn xpath_value(&self) -> XPathValue {
        let Some(owner) = self.owner.upgrade() else {
            return XPathValue::Empty;
        };
        let ctx = self.context(&owner);
        let inter = self.inter(&ctx);
        self.converter.inter_to_xpath(&ctx, inter)
    }

    fn context<'a>(&'a self, owner: &'a ContentSnapshot) -> ConversionContext<'a> {
        ConversionContext {
            owner,
            property_type: &self.property_type,
            preview: self.preview,
        }
    }

    fn inter(&self, ctx: &ConversionContext<'_>) -> &InterValue {
        self.inter
            .get_or_init(|| self.converter.source_to_inter(ctx, self.source.as_ref()))
    }
}

impl fmt::Debug for PropertyView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyView")
            .field("alias", &self.property_type.alias)
            .field("editor", &self.property_type.editor_alias)
            .field("source", &self.source)
            .finish()
    }
}
