//! Handlebars templates over the JSON page model.
//!
//! Properties are available as `{{properties.alias}}`; HTML-valued properties
//! need the triple-stash form `{{{properties.body}}}` to render unescaped.

use std::{
    num::NonZeroUsize,
    sync::{Mutex, RwLock},
};

use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderErrorReason,
};
use lru::LruCache;
use tracing::debug;

use crate::{
    application::{
        render::types::{EngineError, RenderEngine, RenderKey},
        snapshot::ContentSnapshot,
    },
    domain::slug::derive_segment,
    util::lock::{mutex_lock, rw_read, rw_write},
};

use super::{expression::DEFAULT_COMPILED_CACHE_CAPACITY, model::PageModel};

const SOURCE: &str = "application::render::engine::handlebars";

/// Registers one template per render key and re-registers it when the body
/// for that key changes. At most `capacity` keys stay registered; the least
/// recently rendered one is unregistered to make room.
pub struct HandlebarsEngine {
    registry: RwLock<Handlebars<'static>>,
    bodies: Mutex<LruCache<String, String>>,
}

impl HandlebarsEngine {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_helper("slug", Box::new(slug_helper));
        registry.register_helper("uppercase", Box::new(uppercase_helper));

        Self {
            registry: RwLock::new(registry),
            bodies: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn ensure_registered(&self, name: &str, body: &str) -> Result<(), EngineError> {
        let mut bodies = mutex_lock(&self.bodies, SOURCE, "ensure_registered");
        if bodies
            .get(name)
            .is_some_and(|registered| registered == body)
        {
            return Ok(());
        }

        let mut registry = rw_write(&self.registry, SOURCE, "ensure_registered");
        registry
            .register_template_string(name, body)
            .map_err(|err| EngineError::compile(err.to_string()))?;

        let evicted = bodies
            .push(name.to_string(), body.to_string())
            .map(|(evicted, _)| evicted)
            .filter(|evicted| evicted != name);
        if let Some(evicted) = evicted {
            registry.unregister_template(&evicted);
            debug!(
                target = "application::render::engine::handlebars::register",
                template = %evicted,
                "least recently used template unregistered"
            );
        }

        debug!(
            target = "application::render::engine::handlebars::register",
            template = name,
            "template registered"
        );
        Ok(())
    }
}

impl Default for HandlebarsEngine {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_COMPILED_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl RenderEngine for HandlebarsEngine {
    fn name(&self) -> &'static str {
        "handlebars"
    }

    fn compile_and_render(
        &self,
        body: &str,
        key: &RenderKey,
        model: &ContentSnapshot,
    ) -> Result<String, EngineError> {
        let name = key.to_string();
        self.ensure_registered(&name, body)?;

        let data = PageModel::from_snapshot(model)
            .map_err(|err| EngineError::render(format!("building page model: {err}")))?;

        let registry = rw_read(&self.registry, SOURCE, "compile_and_render");
        let rendered = match registry.get_template(&name) {
            Some(_) => registry.render(&name, &data),
            // Evicted by a concurrent render since registration.
            None => registry.render_template(body, &data),
        };
        rendered.map_err(|err| EngineError::render(err.to_string()))
    }
}

fn slug_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    let segment = derive_segment(param)
        .map_err(|err| RenderErrorReason::Other(err.to_string()))?;
    out.write(&segment)?;
    Ok(())
}

fn uppercase_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&param.to_uppercase())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        application::snapshot::{EDITOR_MARKDOWN, EDITOR_TEXTSTRING, SnapshotFactory},
        domain::{
            content::RawContentRecord,
            content_type::{ContentTypeDescriptor, PropertyType},
        },
        infra::content_store::InMemoryContentStore,
    };

    fn snapshot() -> Arc<ContentSnapshot> {
        let store = InMemoryContentStore::new();
        store.insert_content_type(
            ContentTypeDescriptor::new(1, "page")
                .with_property(PropertyType::new("title", EDITOR_TEXTSTRING))
                .with_property(PropertyType::new("intro", EDITOR_MARKDOWN)),
        );
        store.save(
            RawContentRecord::new(5, "Home", "page")
                .with_property("title", json!("Hi <there>"))
                .with_property("intro", json!("**bold**")),
        );
        let store = Arc::new(store);
        SnapshotFactory::new(store.clone(), store.clone(), store)
            .build_by_id(5, false, None)
            .expect("lookup")
            .expect("record")
    }

    #[test]
    fn renders_the_page_model() {
        let engine = HandlebarsEngine::default();
        let html = engine
            .compile_and_render(
                "<h1>{{name}}</h1><p>{{properties.title}}</p>{{{properties.intro}}}{{url}}",
                &RenderKey::invariant(5),
                &snapshot(),
            )
            .expect("render");

        assert_eq!(
            html,
            "<h1>Home</h1><p>Hi &lt;there&gt;</p><p><strong>bold</strong></p>\n/"
        );
    }

    #[test]
    fn bodies_are_re_registered_when_they_change() {
        let engine = HandlebarsEngine::default();
        let key = RenderKey::invariant(5);
        let model = snapshot();

        assert_eq!(
            engine.compile_and_render("{{id}}", &key, &model).unwrap(),
            "5"
        );
        assert_eq!(
            engine
                .compile_and_render("{{uppercase name}}", &key, &model)
                .unwrap(),
            "HOME"
        );
    }

    #[test]
    fn least_recently_rendered_templates_are_evicted() {
        let engine = HandlebarsEngine::new(NonZeroUsize::new(2).unwrap());
        let model = snapshot();
        let keys: Vec<RenderKey> = (1..=3).map(RenderKey::invariant).collect();

        for key in &keys {
            engine.compile_and_render("{{name}}", key, &model).unwrap();
        }

        assert_eq!(engine.bodies.lock().unwrap().len(), 2);
        let registry = engine.registry.read().unwrap();
        assert!(registry.get_template(&keys[0].to_string()).is_none());
        assert!(registry.get_template(&keys[2].to_string()).is_some());
        drop(registry);

        assert_eq!(
            engine.compile_and_render("{{id}}", &keys[0], &model).unwrap(),
            "5"
        );
        assert_eq!(engine.bodies.lock().unwrap().len(), 2);
        assert!(
            engine
                .registry
                .read()
                .unwrap()
                .get_template(&keys[1].to_string())
                .is_none()
        );
    }

    #[test]
    fn syntax_errors_are_compile_errors() {
        let engine = HandlebarsEngine::default();
        let err = engine
            .compile_and_render("{{#if name}}unclosed", &RenderKey::invariant(5), &snapshot())
            .expect_err("broken template");
        assert!(matches!(err, EngineError::Compile { .. }));
    }

    #[test]
    fn unknown_fields_are_render_errors() {
        let engine = HandlebarsEngine::default();
        let err = engine
            .compile_and_render("{{missing}}", &RenderKey::invariant(5), &snapshot())
            .expect_err("strict mode");
        assert!(matches!(err, EngineError::Render { .. }));
    }
}
