//! JSON view of a snapshot for data-driven template engines.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Number, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::snapshot::{ContentSnapshot, CultureInfo, PublishedValue, SnapshotError};

/// Full model of the page being rendered. Related items are shallow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageModel {
    pub id: i32,
    pub key: Uuid,
    pub name: String,
    pub path: String,
    pub level: i32,
    pub sort_order: i32,
    pub template_id: Option<i32>,
    pub content_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub create_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub update_date: OffsetDateTime,
    pub creator_name: Option<String>,
    pub writer_name: Option<String>,
    pub url_segment: String,
    pub url: String,
    pub culture: Option<String>,
    pub is_published: bool,
    pub is_draft: bool,
    pub properties: Map<String, Value>,
    pub cultures: BTreeMap<String, CultureInfo>,
    pub parent: Option<LinkModel>,
    pub children: Vec<LinkModel>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkModel {
    pub id: i32,
    pub key: Uuid,
    pub name: String,
    pub url_segment: String,
    pub url: String,
    pub sort_order: i32,
}

impl PageModel {
    pub fn from_snapshot(snapshot: &ContentSnapshot) -> Result<Self, SnapshotError> {
        let culture = snapshot.culture();
        let properties = snapshot
            .properties()
            .iter()
            .map(|property| (property.alias().to_string(), value_to_json(&property.value())))
            .collect();

        let parent = snapshot.parent()?.map(|parent| link(parent)).transpose()?;
        let children = snapshot
            .children()?
            .iter()
            .map(|child| link(child))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: snapshot.id(),
            key: snapshot.key(),
            name: snapshot.name().to_string(),
            path: snapshot.path().to_string(),
            level: snapshot.level(),
            sort_order: snapshot.sort_order(),
            template_id: snapshot.template_id(),
            content_type: snapshot.content_type().alias.clone(),
            create_date: snapshot.create_date(),
            update_date: snapshot.update_date(),
            creator_name: snapshot.creator_name()?.map(str::to_string),
            writer_name: snapshot.writer_name()?.map(str::to_string),
            url_segment: snapshot.url_segment().to_string(),
            url: snapshot.route()?.to_string(),
            culture: culture.map(str::to_string),
            is_published: snapshot.is_published(culture),
            is_draft: snapshot.is_draft(culture),
            properties,
            cultures: snapshot.cultures().clone(),
            parent,
            children,
        })
    }
}

fn link(snapshot: &ContentSnapshot) -> Result<LinkModel, SnapshotError> {
    Ok(LinkModel {
        id: snapshot.id(),
        key: snapshot.key(),
        name: snapshot.name().to_string(),
        url_segment: snapshot.url_segment().to_string(),
        url: snapshot.route()?.to_string(),
        sort_order: snapshot.sort_order(),
    })
}

/// Picked content becomes a list of links; links whose route cannot be
/// resolved are left out.
pub fn value_to_json(value: &PublishedValue) -> Value {
    match value {
        PublishedValue::None => Value::Null,
        PublishedValue::Text(text) | PublishedValue::Html(text) => Value::String(text.clone()),
        PublishedValue::Integer(number) => Value::from(*number),
        PublishedValue::Decimal(number) => Number::from_f64(*number)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        PublishedValue::Boolean(flag) => Value::Bool(*flag),
        PublishedValue::DateTime(_) => Value::String(value.to_string()),
        PublishedValue::Tags(tags) => Value::from(tags.clone()),
        PublishedValue::Content(items) => Value::Array(
            items
                .iter()
                .filter_map(|item| link(item).ok())
                .filter_map(|link| serde_json::to_value(link).ok())
                .collect(),
        ),
        PublishedValue::Json(json) => json.clone(),
    }
}
