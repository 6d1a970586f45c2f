//! Template body sources.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::RwLock,
};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    application::render::{TemplateError, TemplateStore},
    util::lock::{rw_read, rw_write},
};

pub const DEFAULT_TEMPLATE_EXTENSION: &str = "cshtml";

/// Reads `<root>/<template_id>.<extension>` on every load so edits to a
/// template file are picked up by the next render.
#[derive(Debug, Clone)]
pub struct FileTemplateStore {
    root: PathBuf,
    extension: String,
}

impl FileTemplateStore {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, template_id: i32) -> PathBuf {
        self.root.join(format!("{template_id}.{}", self.extension))
    }
}

#[async_trait]
impl TemplateStore for FileTemplateStore {
    async fn load_template_body(&self, template_id: i32) -> Result<String, TemplateError> {
        let path = self.path_for(template_id);
        debug!(
            target = "infra::templates::load_template_body",
            template_id,
            path = %path.display(),
            "loading template"
        );

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => TemplateError::NotFound { template_id },
                _ => TemplateError::Io {
                    template_id,
                    message: err.to_string(),
                },
            })
    }
}

#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    templates: RwLock<HashMap<i32, String>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(self, template_id: i32, body: impl Into<String>) -> Self {
        self.insert(template_id, body);
        self
    }

    /// Insert or replace a template body.
    pub fn insert(&self, template_id: i32, body: impl Into<String>) {
        rw_write(&self.templates, "infra::templates", "insert").insert(template_id, body.into());
    }

    pub fn remove(&self, template_id: i32) -> Option<String> {
        rw_write(&self.templates, "infra::templates", "remove").remove(&template_id)
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn load_template_body(&self, template_id: i32) -> Result<String, TemplateError> {
        rw_read(&self.templates, "infra::templates", "load_template_body")
            .get(&template_id)
            .cloned()
            .ok_or(TemplateError::NotFound { template_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_reads_by_id_and_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("3.cshtml"), "<p>@Model.Name</p>")
            .await
            .expect("write template");

        let store = FileTemplateStore::new(dir.path(), ".cshtml");
        let body = store.load_template_body(3).await.expect("template");
        assert_eq!(body, "<p>@Model.Name</p>");
    }

    #[tokio::test]
    async fn file_store_reports_missing_templates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileTemplateStore::new(dir.path(), DEFAULT_TEMPLATE_EXTENSION);

        let err = store.load_template_body(9).await.expect_err("missing");
        assert!(matches!(err, TemplateError::NotFound { template_id: 9 }));
    }

    #[tokio::test]
    async fn memory_store_replaces_bodies() {
        let store = MemoryTemplateStore::new().with_template(1, "first");
        store.insert(1, "second");

        assert_eq!(store.load_template_body(1).await.unwrap(), "second");
        store.remove(1);
        assert!(store.load_template_body(1).await.is_err());
    }
}
