//! Published-content snapshots over raw repository records.
//!
//! A [`ContentSnapshot`] is the render model: an immutable view of one record
//! for one preview/culture context whose expensive fields (ancestry,
//! children, profiles, converted property values) resolve lazily and at most
//! once. [`SnapshotFactory`] is the only way to build one and carries the
//! collaborators the lazy fields need.

mod content;
mod converters;
mod factory;
mod property;
mod segments;
mod values;

#[cfg(test)]
mod tests;

pub use content::{ContentSnapshot, CultureInfo};
pub use converters::{
    BooleanConverter, ContentPickerConverter, ConversionContext, ConverterRegistry,
    DateTimeConverter, DecimalConverter, EDITOR_BOOLEAN, EDITOR_CONTENT_PICKER, EDITOR_DATETIME,
    EDITOR_DECIMAL, EDITOR_INTEGER, EDITOR_MARKDOWN, EDITOR_RICHTEXT, EDITOR_TAGS,
    EDITOR_TEXTAREA, EDITOR_TEXTSTRING, IntegerConverter, MarkdownConverter,
    PassThroughConverter, PropertyValueConverter, RichTextConverter, TagsConverter, TextConverter,
};
pub use factory::{SnapshotError, SnapshotFactory, SnapshotFactoryBuilder};
pub use property::PropertyView;
pub use segments::{
    DEFAULT_URL_NAME_PROPERTY, DefaultUrlSegmentProvider, UrlNamePropertyProvider,
    UrlSegmentProvider, UrlSegmentResolver,
};
pub use values::{InterValue, PublishedValue, XPathElement, XPathValue};
