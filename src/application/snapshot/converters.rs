//! Property value converters keyed by property editor alias.
//!
//! Every converter runs the same two stages: `source_to_inter` normalises the
//! stored value, then either `inter_to_object` (templates) or
//! `inter_to_xpath` (tree queries) materialises it. Converters hold no state
//! that varies between calls, so a property converts identically every time
//! it is read in the same context.

use std::{collections::HashMap, fmt, sync::Arc};

use comrak::{Options, markdown_to_html};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, warn};

use crate::domain::content_type::PropertyType;

use super::{
    content::ContentSnapshot,
    values::{InterValue, PublishedValue, XPathElement, XPathValue, format_datetime},
};

pub const EDITOR_TEXTSTRING: &str = "textstring";
pub const EDITOR_TEXTAREA: &str = "textarea";
pub const EDITOR_MARKDOWN: &str = "markdown";
pub const EDITOR_RICHTEXT: &str = "richtext";
pub const EDITOR_INTEGER: &str = "integer";
pub const EDITOR_DECIMAL: &str = "decimal";
pub const EDITOR_BOOLEAN: &str = "boolean";
pub const EDITOR_DATETIME: &str = "datetime";
pub const EDITOR_TAGS: &str = "tags";
pub const EDITOR_CONTENT_PICKER: &str = "contentpicker";

/// Inputs shared by both conversion stages.
pub struct ConversionContext<'a> {
    pub owner: &'a ContentSnapshot,
    pub property_type: &'a PropertyType,
    pub preview: bool,
}

pub trait PropertyValueConverter: Send + Sync {
    fn source_to_inter(&self, ctx: &ConversionContext<'_>, source: Option<&Value>) -> InterValue;

    fn inter_to_object(&self, _ctx: &ConversionContext<'_>, inter: &InterValue) -> PublishedValue {
        PublishedValue::from_inter(inter)
    }

    fn inter_to_xpath(&self, ctx: &ConversionContext<'_>, inter: &InterValue) -> XPathValue {
        match self.inter_to_object(ctx, inter) {
            PublishedValue::None => XPathValue::Empty,
            value => XPathValue::Text(value.to_string()),
        }
    }
}

/// Editor alias → converter lookup with a pass-through fallback.
#[derive(Clone)]
pub struct ConverterRegistry {
    by_editor: HashMap<String, Arc<dyn PropertyValueConverter>>,
    fallback: Arc<dyn PropertyValueConverter>,
}

impl ConverterRegistry {
    /// Registry without any editor-specific converters.
    pub fn empty() -> Self {
        Self {
            by_editor: HashMap::new(),
            fallback: Arc::new(PassThroughConverter),
        }
    }

    pub fn register(
        &mut self,
        editor_alias: &str,
        converter: Arc<dyn PropertyValueConverter>,
    ) -> &mut Self {
        self.by_editor
            .insert(editor_alias.to_ascii_lowercase(), converter);
        self
    }

    pub fn resolve(&self, editor_alias: &str) -> Arc<dyn PropertyValueConverter> {
        self.by_editor
            .get(&editor_alias.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        let text: Arc<dyn PropertyValueConverter> = Arc::new(TextConverter);
        registry
            .register(EDITOR_TEXTSTRING, Arc::clone(&text))
            .register(EDITOR_TEXTAREA, text)
            .register(EDITOR_MARKDOWN, Arc::new(MarkdownConverter::default()))
            .register(EDITOR_RICHTEXT, Arc::new(RichTextConverter))
            .register(EDITOR_INTEGER, Arc::new(IntegerConverter))
            .register(EDITOR_DECIMAL, Arc::new(DecimalConverter))
            .register(EDITOR_BOOLEAN, Arc::new(BooleanConverter))
            .register(EDITOR_DATETIME, Arc::new(DateTimeConverter))
            .register(EDITOR_TAGS, Arc::new(TagsConverter))
            .register(EDITOR_CONTENT_PICKER, Arc::new(ContentPickerConverter));
        registry
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut editors: Vec<&String> = self.by_editor.keys().collect();
        editors.sort();
        f.debug_struct("ConverterRegistry")
            .field("editors", &editors)
            .finish()
    }
}

fn source_text(source: Option<&Value>) -> Option<String> {
    match source? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        other => Some(other.to_string()),
    }
}

/// Unknown editors: keeps the stored JSON as-is, unwrapping plain strings.
pub struct PassThroughConverter;

impl PropertyValueConverter for PassThroughConverter {
    fn source_to_inter(&self, _ctx: &ConversionContext<'_>, source: Option<&Value>) -> InterValue {
        match source {
            None | Some(Value::Null) => InterValue::None,
            Some(Value::String(text)) => InterValue::Text(text.clone()),
            Some(other) => InterValue::Json(other.clone()),
        }
    }
}

pub struct TextConverter;

impl PropertyValueConverter for TextConverter {
    fn source_to_inter(&self, _ctx: &ConversionContext<'_>, source: Option<&Value>) -> InterValue {
        source_text(source).map_or(InterValue::None, InterValue::Text)
    }
}

/// Markdown rendered to HTML with comrak.
pub struct MarkdownConverter {
    options: Options<'static>,
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        let mut options = Options::default();
        options.extension.strikethrough = true;
        options.extension.table = true;
        options.extension.autolink = true;
        options.extension.tasklist = true;
        Self { options }
    }
}

impl PropertyValueConverter for MarkdownConverter {
    fn source_to_inter(&self, _ctx: &ConversionContext<'_>, source: Option<&Value>) -> InterValue {
        source_text(source).map_or(InterValue::None, InterValue::Text)
    }

    fn inter_to_object(&self, _ctx: &ConversionContext<'_>, inter: &InterValue) -> PublishedValue {
        match inter {
            InterValue::Text(markdown) => {
                PublishedValue::Html(markdown_to_html(markdown, &self.options))
            }
            _ => PublishedValue::None,
        }
    }

    fn inter_to_xpath(&self, _ctx: &ConversionContext<'_>, inter: &InterValue) -> XPathValue {
        match inter {
            InterValue::Text(markdown) => XPathValue::Text(markdown.clone()),
            _ => XPathValue::Empty,
        }
    }
}

/// Stored HTML passed through ammonia before templates see it.
pub struct RichTextConverter;

impl PropertyValueConverter for RichTextConverter {
    fn source_to_inter(&self, _ctx: &ConversionContext<'_>, source: Option<&Value>) -> InterValue {
        source_text(source).map_or(InterValue::None, InterValue::Text)
    }

    fn inter_to_object(&self, _ctx: &ConversionContext<'_>, inter: &InterValue) -> PublishedValue {
        match inter {
            InterValue::Text(html) => PublishedValue::Html(ammonia::clean(html)),
            _ => PublishedValue::None,
        }
    }
}

pub struct IntegerConverter;

impl PropertyValueConverter for IntegerConverter {
    fn source_to_inter(&self, ctx: &ConversionContext<'_>, source: Option<&Value>) -> InterValue {
        let parsed = match source {
            Some(Value::Number(number)) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|value| value.trunc() as i64)),
            Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
            _ => None,
        };
        if parsed.is_none() && source.is_some_and(|value| !value.is_null()) {
            debug!(
                target = "application::snapshot::converters",
                alias = %ctx.property_type.alias,
                "integer property value could not be parsed"
            );
        }
        parsed.map_or(InterValue::None, InterValue::Integer)
    }
}

pub struct DecimalConverter;

impl PropertyValueConverter for DecimalConverter {
    fn source_to_inter(&self, _ctx: &ConversionContext<'_>, source: Option<&Value>) -> InterValue {
        let parsed = match source {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed
            .filter(|value| value.is_finite())
            .map_or(InterValue::None, InterValue::Decimal)
    }
}

/// Checkbox semantics: anything not recognisably true is false.
pub struct BooleanConverter;

impl PropertyValueConverter for BooleanConverter {
    fn source_to_inter(&self, _ctx: &ConversionContext<'_>, source: Option<&Value>) -> InterValue {
        let flag = match source {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(number)) => number.as_i64() == Some(1),
            Some(Value::String(text)) => {
                let text = text.trim();
                text == "1" || text.eq_ignore_ascii_case("true")
            }
            _ => false,
        };
        InterValue::Boolean(flag)
    }
}

pub struct DateTimeConverter;

impl PropertyValueConverter for DateTimeConverter {
    fn source_to_inter(&self, _ctx: &ConversionContext<'_>, source: Option<&Value>) -> InterValue {
        match source {
            Some(Value::String(text)) => OffsetDateTime::parse(text.trim(), &Rfc3339)
                .map_or(InterValue::None, InterValue::DateTime),
            Some(Value::Number(number)) => number
                .as_i64()
                .and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok())
                .map_or(InterValue::None, InterValue::DateTime),
            _ => InterValue::None,
        }
    }

    fn inter_to_xpath(&self, _ctx: &ConversionContext<'_>, inter: &InterValue) -> XPathValue {
        match inter {
            InterValue::DateTime(value) => XPathValue::Text(format_datetime(value)),
            _ => XPathValue::Empty,
        }
    }
}

/// Accepts a JSON array of strings or a comma-separated string.
pub struct TagsConverter;

impl PropertyValueConverter for TagsConverter {
    fn source_to_inter(&self, _ctx: &ConversionContext<'_>, source: Option<&Value>) -> InterValue {
        let tags: Vec<String> = match source {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str())
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
            Some(Value::String(text)) => text
                .split(',')
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
            _ => Vec::new(),
        };
        if tags.is_empty() {
            InterValue::None
        } else {
            InterValue::Tags(tags)
        }
    }

    fn inter_to_xpath(&self, ctx: &ConversionContext<'_>, inter: &InterValue) -> XPathValue {
        let InterValue::Tags(tags) = inter else {
            return XPathValue::Empty;
        };
        let element = tags.iter().fold(
            XPathElement::new(ctx.property_type.alias.clone()),
            |element, tag| element.with_child(XPathElement::new("tag").with_text(tag.clone())),
        );
        XPathValue::Element(element)
    }
}

/// References to other content, hydrated into snapshots sharing the owner's
/// preview and culture context.
pub struct ContentPickerConverter;

impl ContentPickerConverter {
    fn parse_ids(source: &Value) -> Vec<i32> {
        match source {
            Value::Number(number) => number
                .as_i64()
                .and_then(|id| i32::try_from(id).ok())
                .into_iter()
                .collect(),
            Value::String(text) => text
                .split(',')
                .filter_map(|part| part.trim().parse::<i32>().ok())
                .collect(),
            Value::Array(items) => items.iter().flat_map(Self::parse_ids).collect(),
            _ => Vec::new(),
        }
    }
}

impl PropertyValueConverter for ContentPickerConverter {
    fn source_to_inter(&self, _ctx: &ConversionContext<'_>, source: Option<&Value>) -> InterValue {
        let ids = source.map(Self::parse_ids).unwrap_or_default();
        if ids.is_empty() {
            InterValue::None
        } else {
            InterValue::References(ids)
        }
    }

    fn inter_to_object(&self, ctx: &ConversionContext<'_>, inter: &InterValue) -> PublishedValue {
        let InterValue::References(ids) = inter else {
            return PublishedValue::None;
        };

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            match ctx.owner.resolve_reference(*id) {
                Ok(Some(item)) if ctx.preview || item.is_published(item.culture()) => {
                    items.push(item)
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        target = "application::snapshot::converters",
                        owner_id = ctx.owner.id(),
                        alias = %ctx.property_type.alias,
                        reference_id = id,
                        error = %err,
                        "skipping unresolvable content reference"
                    );
                }
            }
        }
        PublishedValue::Content(items)
    }

    fn inter_to_xpath(&self, _ctx: &ConversionContext<'_>, inter: &InterValue) -> XPathValue {
        match inter {
            InterValue::References(ids) => {
                let joined: Vec<String> = ids.iter().map(i32::to_string).collect();
                XPathValue::Text(joined.join(","))
            }
            _ => XPathValue::Empty,
        }
    }
}
