//! Razor-style templates: literal markup with `@Model` member chains.
//!
//! ```text
//! <h1>@Model.Name</h1>
//! <p>@Model.GetProperty("title").GetValue()</p>
//! <a href="@Model.Parent.Url">up</a> (@Model.Children.Count children)
//! ```
//!
//! Member chains are checked when the template compiles, so a misspelt
//! member fails the compile step instead of rendering an empty string.
//! Output is HTML-encoded unless the value is already HTML (rich text,
//! markdown). `@@` writes a literal `@`, and an `@` directly after a letter
//! or digit is left alone so addresses like `info@example.com` survive.

use std::{
    fmt::{self, Display},
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use lru::LruCache;
use serde_json::Value;
use tracing::debug;

use crate::{
    application::{
        render::types::{EngineError, RenderEngine, RenderKey},
        snapshot::{ContentSnapshot, PropertyView, PublishedValue, SnapshotError},
    },
    util::{lock::mutex_lock, markup::push_encoded},
};

const SOURCE: &str = "application::render::engine::expression";
const MODEL: &str = "Model";
pub const DEFAULT_COMPILED_CACHE_CAPACITY: usize = 256;

/// Compiles `@Model` templates and keeps the compiled form per render key.
pub struct ExpressionEngine {
    compiled: Mutex<LruCache<RenderKey, Arc<CompiledTemplate>>>,
}

impl ExpressionEngine {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            compiled: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn cached_len(&self) -> usize {
        mutex_lock(&self.compiled, SOURCE, "cached_len").len()
    }

    fn compiled_for(&self, key: &RenderKey, body: &str) -> Result<Arc<CompiledTemplate>, EngineError> {
        if let Some(template) = mutex_lock(&self.compiled, SOURCE, "compiled_for").get(key)
            && template.source == body
        {
            return Ok(Arc::clone(template));
        }

        let template = Arc::new(CompiledTemplate::compile(body)?);
        debug!(
            target = "application::render::engine::expression::compile",
            key = %key,
            expressions = template.expression_count(),
            "template compiled"
        );
        mutex_lock(&self.compiled, SOURCE, "compiled_for").put(key.clone(), Arc::clone(&template));
        Ok(template)
    }
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_COMPILED_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl RenderEngine for ExpressionEngine {
    fn name(&self) -> &'static str {
        "expression"
    }

    fn compile_and_render(
        &self,
        body: &str,
        key: &RenderKey,
        model: &ContentSnapshot,
    ) -> Result<String, EngineError> {
        self.compiled_for(key, body)?.render(model)
    }
}

/// A parsed template, ready to be evaluated against any snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
struct Expression {
    text: String,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Id,
    Key,
    Name,
    Path,
    Level,
    SortOrder,
    TemplateId,
    CreatorName,
    WriterName,
    CreateDate,
    UpdateDate,
    UrlSegment,
    Url,
    ContentType,
    Culture,
    Parent,
    Children,
    IsDraft,
    IsPublished,
    HasValue(String),
    Value(String),
    GetProperty(String),
    Alias,
    PropertyHasValue,
    GetValue,
    GetSourceValue,
    GetXPathValue,
    Count,
    First,
    Last,
}

/// Static type of the value a chain has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Content,
    Property,
    Children,
    Scalar,
}

impl Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Content => "content",
            Self::Property => "property",
            Self::Children => "children",
            Self::Scalar => "value",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Args {
    /// `Member`
    None,
    /// `Member()`
    Empty,
    /// `Member("alias")`
    Text(String),
}

impl CompiledTemplate {
    pub fn compile(source: &str) -> Result<Self, EngineError> {
        Parser::new(source).parse()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expression_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Expression(_)))
            .count()
    }

    pub fn render(&self, model: &ContentSnapshot) -> Result<String, EngineError> {
        let mut output = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Expression(expression) => match expression.evaluate(model)? {
                    Output::Text(text) => push_encoded(&mut output, &text),
                    Output::Html(html) => output.push_str(&html),
                },
            }
        }
        Ok(output)
    }
}

struct Parser<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    fn parse(mut self) -> Result<CompiledTemplate, EngineError> {
        let mut segments = Vec::new();
        let mut literal = String::new();

        while let Some(ch) = self.peek() {
            if ch != '@' {
                literal.push(ch);
                self.bump(ch);
                continue;
            }

            let at = self.pos;
            self.bump('@');

            if self.peek() == Some('@') {
                self.bump('@');
                literal.push('@');
                continue;
            }
            if self.source[..at]
                .chars()
                .next_back()
                .is_some_and(char::is_alphanumeric)
            {
                literal.push('@');
                continue;
            }

            let ident = self.identifier();
            if ident != MODEL {
                let found = if ident.is_empty() {
                    "`@` must be followed by `Model` or escaped as `@@`".to_string()
                } else {
                    format!("unknown expression `@{ident}`, expected `@Model`")
                };
                return Err(self.error_at(at, &found));
            }

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Expression(self.chain(at)?));
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(CompiledTemplate {
            source: self.source.to_string(),
            segments,
        })
    }

    fn chain(&mut self, start: usize) -> Result<Expression, EngineError> {
        let mut kind = Kind::Content;
        let mut steps = Vec::new();

        while self.peek() == Some('.') && self.peek_nth(1).is_some_and(is_identifier_start) {
            self.bump('.');
            let member_at = self.pos;
            let name = self.identifier();
            let args = self.arguments(member_at)?;

            let (step, next) =
                resolve(kind, name, args).map_err(|reason| self.error_at(member_at, &reason))?;
            steps.push(step);
            kind = next;
        }

        Ok(Expression {
            text: self.source[start + 1..self.pos].to_string(),
            steps,
        })
    }

    fn arguments(&mut self, member_at: usize) -> Result<Args, EngineError> {
        if self.peek() != Some('(') {
            return Ok(Args::None);
        }
        self.bump('(');
        self.skip_whitespace();

        let args = match self.peek() {
            Some(')') => Args::Empty,
            Some('"') => Args::Text(self.string_literal(member_at)?),
            _ => return Err(self.error_at(member_at, "arguments must be a single string literal")),
        };

        self.skip_whitespace();
        if self.peek() != Some(')') {
            return Err(self.error_at(member_at, "missing `)`"));
        }
        self.bump(')');
        Ok(args)
    }

    fn string_literal(&mut self, member_at: usize) -> Result<String, EngineError> {
        self.bump('"');
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error_at(member_at, "unterminated string literal")),
                Some('"') => {
                    self.bump('"');
                    return Ok(value);
                }
                Some('\\') => {
                    self.bump('\\');
                    match self.peek() {
                        Some(escaped) => {
                            value.push(escaped);
                            self.bump(escaped);
                        }
                        None => {
                            return Err(self.error_at(member_at, "unterminated string literal"));
                        }
                    }
                }
                Some(ch) => {
                    value.push(ch);
                    self.bump(ch);
                }
            }
        }
    }

    fn identifier(&mut self) -> &'a str {
        let start = self.pos;
        if self.peek().is_some_and(is_identifier_start) {
            while let Some(ch) = self.peek().filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_') {
                self.bump(ch);
            }
        }
        &self.source[start..self.pos]
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek().filter(|ch| ch.is_whitespace()) {
            self.bump(ch);
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(n)
    }

    fn bump(&mut self, ch: char) {
        self.pos += ch.len_utf8();
    }

    fn error_at(&self, pos: usize, reason: &str) -> EngineError {
        let consumed = &self.source[..pos];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed
            .rsplit('\n')
            .next()
            .map_or(0, |tail| tail.chars().count())
            + 1;
        EngineError::compile(format!("{reason} (line {line}, column {column})"))
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn resolve(kind: Kind, name: &str, args: Args) -> Result<(Step, Kind), String> {
    let scalar = |step: Step| expect_member(name, &args, step, Kind::Scalar);
    match (kind, name) {
        (Kind::Content, "Id") => scalar(Step::Id),
        (Kind::Content, "Key") => scalar(Step::Key),
        (Kind::Content, "Name") => scalar(Step::Name),
        (Kind::Content, "Path") => scalar(Step::Path),
        (Kind::Content, "Level") => scalar(Step::Level),
        (Kind::Content, "SortOrder") => scalar(Step::SortOrder),
        (Kind::Content, "TemplateId") => scalar(Step::TemplateId),
        (Kind::Content, "CreatorName") => scalar(Step::CreatorName),
        (Kind::Content, "WriterName") => scalar(Step::WriterName),
        (Kind::Content, "CreateDate") => scalar(Step::CreateDate),
        (Kind::Content, "UpdateDate") => scalar(Step::UpdateDate),
        (Kind::Content, "UrlSegment") => scalar(Step::UrlSegment),
        (Kind::Content, "Url") => scalar(Step::Url),
        (Kind::Content, "ContentType") => scalar(Step::ContentType),
        (Kind::Content, "Culture") => scalar(Step::Culture),
        (Kind::Content, "Parent") => expect_member(name, &args, Step::Parent, Kind::Content),
        (Kind::Content, "Children") => expect_member(name, &args, Step::Children, Kind::Children),
        (Kind::Content, "IsDraft") => expect_call(name, &args, Step::IsDraft, Kind::Scalar),
        (Kind::Content, "IsPublished") => expect_call(name, &args, Step::IsPublished, Kind::Scalar),
        (Kind::Content, "HasValue") => {
            expect_alias(name, args, Step::HasValue, Kind::Scalar)
        }
        (Kind::Content, "Value") => expect_alias(name, args, Step::Value, Kind::Scalar),
        (Kind::Content, "GetProperty") => {
            expect_alias(name, args, Step::GetProperty, Kind::Property)
        }
        (Kind::Property, "Alias") => scalar(Step::Alias),
        (Kind::Property, "HasValue") => {
            expect_call(name, &args, Step::PropertyHasValue, Kind::Scalar)
        }
        (Kind::Property, "GetValue") => expect_call(name, &args, Step::GetValue, Kind::Scalar),
        (Kind::Property, "GetSourceValue") => {
            expect_call(name, &args, Step::GetSourceValue, Kind::Scalar)
        }
        (Kind::Property, "GetXPathValue") => {
            expect_call(name, &args, Step::GetXPathValue, Kind::Scalar)
        }
        (Kind::Children, "Count") => scalar(Step::Count),
        (Kind::Children, "First") => expect_call(name, &args, Step::First, Kind::Content),
        (Kind::Children, "Last") => expect_call(name, &args, Step::Last, Kind::Content),
        (Kind::Scalar, _) => Err(format!("`{name}` cannot be read from a value")),
        (kind, _) => Err(format!("{kind} has no member `{name}`")),
    }
}

fn expect_member(name: &str, args: &Args, step: Step, next: Kind) -> Result<(Step, Kind), String> {
    match args {
        Args::None => Ok((step, next)),
        _ => Err(format!("`{name}` is not a method, remove the parentheses")),
    }
}

fn expect_call(name: &str, args: &Args, step: Step, next: Kind) -> Result<(Step, Kind), String> {
    match args {
        Args::Empty => Ok((step, next)),
        _ => Err(format!("`{name}` must be called as `{name}()`")),
    }
}

fn expect_alias(
    name: &str,
    args: Args,
    step: impl FnOnce(String) -> Step,
    next: Kind,
) -> Result<(Step, Kind), String> {
    match args {
        Args::Text(alias) => Ok((step(alias), next)),
        _ => Err(format!("`{name}` takes a property alias, as in `{name}(\"alias\")`")),
    }
}

enum Output {
    Text(String),
    Html(String),
}

enum Cursor<'a> {
    Null,
    Content(&'a ContentSnapshot),
    Property(&'a PropertyView),
    Children(&'a [Arc<ContentSnapshot>]),
    Output(Output),
}

fn text(value: impl Display) -> Cursor<'static> {
    Cursor::Output(Output::Text(value.to_string()))
}

fn optional_text(value: Option<impl Display>) -> Cursor<'static> {
    value.map_or(Cursor::Null, text)
}

fn published(value: PublishedValue) -> Cursor<'static> {
    match value {
        PublishedValue::Html(html) => Cursor::Output(Output::Html(html)),
        other => text(other),
    }
}

impl Expression {
    fn evaluate(&self, model: &ContentSnapshot) -> Result<Output, EngineError> {
        let mut cursor = Cursor::Content(model);

        for step in &self.steps {
            cursor = match cursor {
                Cursor::Null => {
                    return Err(EngineError::render(format!(
                        "`{}` reads a member of a missing value",
                        self.text
                    )));
                }
                Cursor::Content(content) => self.content_step(content, step)?,
                Cursor::Property(property) => property_step(property, step),
                Cursor::Children(children) => children_step(children, step),
                Cursor::Output(_) => {
                    return Err(EngineError::render(format!(
                        "`{}` reads a member of a value",
                        self.text
                    )));
                }
            };
        }

        Ok(match cursor {
            Cursor::Null => Output::Text(String::new()),
            Cursor::Content(content) => Output::Text(content.name().to_string()),
            Cursor::Property(property) => match published(property.value()) {
                Cursor::Output(output) => output,
                _ => Output::Text(String::new()),
            },
            Cursor::Children(children) => Output::Text(
                children
                    .iter()
                    .map(|child| child.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            Cursor::Output(output) => output,
        })
    }

    fn content_step<'a>(
        &self,
        content: &'a ContentSnapshot,
        step: &Step,
    ) -> Result<Cursor<'a>, EngineError> {
        let lookup = |err: SnapshotError| EngineError::render(format!("`{}`: {err}", self.text));
        let culture = content.culture();

        Ok(match step {
            Step::Id => text(content.id()),
            Step::Key => text(content.key()),
            Step::Name => text(content.name()),
            Step::Path => text(content.path()),
            Step::Level => text(content.level()),
            Step::SortOrder => text(content.sort_order()),
            Step::TemplateId => optional_text(content.template_id()),
            Step::CreatorName => optional_text(content.creator_name().map_err(lookup)?),
            Step::WriterName => optional_text(content.writer_name().map_err(lookup)?),
            Step::CreateDate => text(PublishedValue::DateTime(content.create_date())),
            Step::UpdateDate => text(PublishedValue::DateTime(content.update_date())),
            Step::UrlSegment => text(content.url_segment()),
            Step::Url => text(content.route().map_err(lookup)?),
            Step::ContentType => text(&content.content_type().alias),
            Step::Culture => optional_text(culture),
            Step::Parent => content
                .parent()
                .map_err(lookup)?
                .map_or(Cursor::Null, |parent| Cursor::Content(parent.as_ref())),
            Step::Children => Cursor::Children(content.children().map_err(lookup)?),
            Step::IsDraft => text(content.is_draft(culture)),
            Step::IsPublished => text(content.is_published(culture)),
            Step::HasValue(alias) => text(content.has_value(alias)),
            Step::Value(alias) => published(content.value(alias)),
            Step::GetProperty(alias) => content
                .property(alias)
                .map_or(Cursor::Null, Cursor::Property),
            other => {
                return Err(EngineError::render(format!(
                    "`{}`: {other:?} is not a content member",
                    self.text
                )));
            }
        })
    }
}

fn property_step<'a>(property: &'a PropertyView, step: &Step) -> Cursor<'a> {
    match step {
        Step::Alias => text(property.alias()),
        Step::PropertyHasValue => text(property.has_value()),
        Step::GetValue => published(property.value()),
        Step::GetSourceValue => match property.source_value() {
            None | Some(Value::Null) => Cursor::Null,
            Some(Value::String(source)) => text(source),
            Some(source) => text(source),
        },
        Step::GetXPathValue => text(property.xpath_value().to_xml()),
        _ => Cursor::Null,
    }
}

fn children_step<'a>(children: &'a [Arc<ContentSnapshot>], step: &Step) -> Cursor<'a> {
    match step {
        Step::Count => text(children.len()),
        Step::First => children
            .first()
            .map_or(Cursor::Null, |child| Cursor::Content(child.as_ref())),
        Step::Last => children
            .last()
            .map_or(Cursor::Null, |child| Cursor::Content(child.as_ref())),
        _ => Cursor::Null,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        application::snapshot::{EDITOR_RICHTEXT, EDITOR_TEXTSTRING, SnapshotFactory},
        domain::{
            content::{Profile, RawContentRecord},
            content_type::{ContentTypeDescriptor, PropertyType},
        },
        infra::content_store::InMemoryContentStore,
    };

    fn factory() -> SnapshotFactory {
        let store = InMemoryContentStore::new();
        store.insert_content_type(
            ContentTypeDescriptor::new(1, "page")
                .with_property(PropertyType::new("title", EDITOR_TEXTSTRING))
                .with_property(PropertyType::new("body", EDITOR_RICHTEXT)),
        );
        store.insert_profile(Profile {
            id: 3,
            name: "Ada".to_string(),
        });

        let home = RawContentRecord {
            writer_id: 3,
            ..RawContentRecord::new(5, "Home", "page")
        }
        .with_property("title", json!("Hi & welcome"))
        .with_property("body", json!("<p>Rich <b>text</b><script>x()</script></p>"));
        store.save(home);

        for (id, name, sort_order) in [(6, "Zeta", 2), (7, "Alpha", 1)] {
            store.save(RawContentRecord {
                parent_id: 5,
                path: format!("-1,5,{id}"),
                level: 2,
                sort_order,
                ..RawContentRecord::new(id, name, "page")
            });
        }

        let store = Arc::new(store);
        SnapshotFactory::new(store.clone(), store.clone(), store)
    }

    fn render(template: &str, id: i32) -> Result<String, EngineError> {
        let factory = factory();
        let snapshot = factory
            .build_by_id(id, false, None)
            .expect("lookup")
            .expect("record");
        ExpressionEngine::default().compile_and_render(
            template,
            &RenderKey::invariant(id),
            &snapshot,
        )
    }

    #[test]
    fn renders_names_and_property_values() {
        let html = render(
            r#"<h1>@Model.Name</h1><p>@Model.GetProperty("title").GetValue()</p>"#,
            5,
        )
        .expect("render");
        assert_eq!(html, "<h1>Home</h1><p>Hi &amp; welcome</p>");
    }

    #[test]
    fn html_values_are_not_encoded_twice() {
        let html = render(r#"@Model.Value("body")"#, 5).expect("render");
        assert_eq!(html, "<p>Rich <b>text</b></p>");
    }

    #[test]
    fn navigation_members_follow_the_tree() {
        let html = render(
            "@Model.Children.Count:@Model.Children.First().Name:@Model.Children.Last().Parent.Name",
            5,
        )
        .expect("render");
        assert_eq!(html, "2:Alpha:Home");

        let child = render("@Model.Parent.Name @Model.Url", 7).expect("render");
        assert_eq!(child, "Home /alpha/");
    }

    #[test]
    fn profile_and_flag_members() {
        let html = render(
            r#"@Model.WriterName|@Model.CreatorName|@Model.IsPublished()|@Model.HasValue("title")"#,
            5,
        )
        .expect("render");
        assert_eq!(html, "Ada||true|true");
    }

    #[test]
    fn escapes_and_addresses_stay_literal() {
        let html = render("@@Model mail info@example.com.", 5).expect("render");
        assert_eq!(html, "@Model mail info@example.com.");

        let sentence = render("Welcome to @Model.Name.", 5).expect("render");
        assert_eq!(sentence, "Welcome to Home.");
    }

    #[test]
    fn unknown_members_fail_to_compile() {
        let err = CompiledTemplate::compile("<p>\n  @Model.Titel</p>").expect_err("unknown member");
        assert_eq!(
            err,
            EngineError::compile("content has no member `Titel` (line 2, column 10)")
        );

        assert!(CompiledTemplate::compile("@Model.Name.Length").is_err());
        assert!(CompiledTemplate::compile("@Model.IsDraft").is_err());
        assert!(CompiledTemplate::compile("@Model.GetProperty(title)").is_err());
        assert!(CompiledTemplate::compile("@ViewBag.Title").is_err());
    }

    #[test]
    fn reading_through_a_missing_value_is_a_render_error() {
        let err = render("@Model.Parent.Name", 5).expect_err("root has no parent");
        assert!(matches!(err, EngineError::Render { .. }));

        let missing = render(r#"@Model.GetProperty("nope").GetValue()"#, 5).expect_err("missing");
        assert!(matches!(missing, EngineError::Render { .. }));

        let empty = render("[@Model.Parent]", 5).expect("null prints nothing");
        assert_eq!(empty, "[]");
    }

    #[test]
    fn compiled_templates_are_reused_until_the_body_changes() {
        let factory = factory();
        let snapshot = factory.build_by_id(5, false, None).unwrap().unwrap();
        let engine = ExpressionEngine::new(NonZeroUsize::new(1).unwrap());
        let key = RenderKey::invariant(5);

        assert_eq!(
            engine.compile_and_render("@Model.Id", &key, &snapshot).unwrap(),
            "5"
        );
        assert_eq!(
            engine.compile_and_render("#@Model.Id", &key, &snapshot).unwrap(),
            "#5"
        );
        assert_eq!(engine.cached_len(), 1);
    }
}
