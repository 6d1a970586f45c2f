//! Value representations produced by the two conversion stages.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::util::markup::push_encoded;

use super::content::ContentSnapshot;

/// Stage-one result: the stored value normalised into a shape the editor
/// understands, before anything is materialised for templates.
#[derive(Debug, Clone, PartialEq)]
pub enum InterValue {
    None,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    DateTime(OffsetDateTime),
    Tags(Vec<String>),
    /// Content ids referenced by a picker.
    References(Vec<i32>),
    Json(Value),
}

/// Stage-two result: the object a template consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishedValue {
    None,
    Text(String),
    /// Markup that templates must emit without encoding.
    Html(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    DateTime(OffsetDateTime),
    Tags(Vec<String>),
    Content(Vec<Arc<ContentSnapshot>>),
    Json(Value),
}

impl PublishedValue {
    /// Direct mapping used by editors without a custom materialisation step.
    pub fn from_inter(inter: &InterValue) -> Self {
        match inter {
            InterValue::None | InterValue::References(_) => Self::None,
            InterValue::Text(text) => Self::Text(text.clone()),
            InterValue::Integer(value) => Self::Integer(*value),
            InterValue::Decimal(value) => Self::Decimal(*value),
            InterValue::Boolean(value) => Self::Boolean(*value),
            InterValue::DateTime(value) => Self::DateTime(*value),
            InterValue::Tags(tags) => Self::Tags(tags.clone()),
            InterValue::Json(value) => Self::Json(value.clone()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn is_html(&self) -> bool {
        matches!(self, Self::Html(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Html(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for PublishedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Text(text) | Self::Html(text) => f.write_str(text),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Decimal(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::DateTime(value) => f.write_str(&format_datetime(value)),
            Self::Tags(tags) => f.write_str(&tags.join(", ")),
            Self::Content(items) => {
                let names: Vec<&str> = items.iter().map(|item| item.name()).collect();
                f.write_str(&names.join(", "))
            }
            Self::Json(Value::String(text)) => f.write_str(text),
            Self::Json(value) => write!(f, "{value}"),
        }
    }
}

pub(crate) fn format_datetime(value: &OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

/// Structural form of a property value for tree-query consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue {
    Empty,
    Text(String),
    Element(XPathElement),
}

impl XPathValue {
    /// Serialise to an XML fragment.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        match self {
            Self::Empty => {}
            Self::Text(text) => push_encoded(&mut out, text),
            Self::Element(element) => element.write_xml(&mut out),
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XPathElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub text: Option<String>,
    pub children: Vec<XPathElement>,
}

impl XPathElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: XPathElement) -> Self {
        self.children.push(child);
        self
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            push_encoded(out, value);
            out.push('"');
        }
        if self.text.is_none() && self.children.is_empty() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        if let Some(text) = &self.text {
            push_encoded(out, text);
        }
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn display_formats_scalars() {
        assert_eq!(PublishedValue::None.to_string(), "");
        assert_eq!(PublishedValue::Integer(42).to_string(), "42");
        assert_eq!(
            PublishedValue::Tags(vec!["a".into(), "b".into()]).to_string(),
            "a, b"
        );
        assert_eq!(
            PublishedValue::DateTime(datetime!(2024-05-01 10:00 UTC)).to_string(),
            "2024-05-01T10:00:00Z"
        );
    }

    #[test]
    fn xml_output_nests_and_encodes() {
        let tags = XPathElement::new("tags")
            .with_attribute("count", "2")
            .with_child(XPathElement::new("tag").with_text("rust & go"))
            .with_child(XPathElement::new("tag").with_text("cms"));

        assert_eq!(
            XPathValue::Element(tags).to_xml(),
            r#"<tags count="2"><tag>rust &amp; go</tag><tag>cms</tag></tags>"#
        );
        assert_eq!(
            XPathValue::Element(XPathElement::new("empty")).to_xml(),
            "<empty />"
        );
    }
}
