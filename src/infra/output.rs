//! Output sinks for committed pages.

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::info;

use crate::{
    application::render::{OutputSink, PublishError, PublishedPage},
    domain::slug::is_safe_segment,
    util::lock::mutex_lock,
};

const INDEX_FILE: &str = "index.html";

/// Writes each page to `<root>/[<culture>/]<route>/index.html`.
///
/// Pages are written to a temporary file in the target directory and renamed
/// into place, so readers see either the previous page or the new one.
#[derive(Debug, Clone)]
pub struct FileOutputSink {
    root: PathBuf,
}

impl FileOutputSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Target file for a page; rejects routes that would escape the root.
    pub fn path_for(&self, page: &PublishedPage) -> Result<PathBuf, PublishError> {
        let mut path = self.root.clone();

        if let Some(culture) = page.culture.as_deref() {
            if !is_safe_segment(culture) {
                return Err(PublishError::InvalidRoute {
                    route: format!("{culture}{}", page.route),
                });
            }
            path.push(culture);
        }

        for segment in page.route.split('/').filter(|segment| !segment.is_empty()) {
            if !is_safe_segment(segment) {
                return Err(PublishError::InvalidRoute {
                    route: page.route.clone(),
                });
            }
            path.push(segment);
        }

        path.push(INDEX_FILE);
        Ok(path)
    }
}

#[async_trait]
impl OutputSink for FileOutputSink {
    async fn publish(&self, page: PublishedPage) -> Result<(), PublishError> {
        let path = self.path_for(&page)?;
        let route = page.route.clone();
        let html = page.html;

        let written = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&written, html.as_bytes()))
            .await
            .map_err(|err| PublishError::Write {
                route: route.clone(),
                message: err.to_string(),
            })?
            .map_err(|err| PublishError::Write {
                route: route.clone(),
                message: err.to_string(),
            })?;

        info!(
            target = "infra::output::publish",
            content_id = page.content_id,
            culture = page.culture.as_deref().unwrap_or(""),
            route = %route,
            path = %path.display(),
            "page written"
        );
        Ok(())
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::other("output path has no parent directory"))?;
    std::fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Keeps the latest page per (content, culture) plus the full publish history.
#[derive(Debug, Default)]
pub struct MemoryOutputSink {
    inner: Mutex<MemoryOutput>,
}

#[derive(Debug, Default)]
struct MemoryOutput {
    pages: BTreeMap<(i32, Option<String>), PublishedPage>,
    history: Vec<PublishedPage>,
}

impl MemoryOutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, content_id: i32, culture: Option<&str>) -> Option<PublishedPage> {
        mutex_lock(&self.inner, "infra::output", "page")
            .pages
            .get(&(content_id, culture.map(str::to_string)))
            .cloned()
    }

    pub fn html(&self, content_id: i32, culture: Option<&str>) -> Option<String> {
        self.page(content_id, culture).map(|page| page.html)
    }

    /// Every publish call in order.
    pub fn history(&self) -> Vec<PublishedPage> {
        mutex_lock(&self.inner, "infra::output", "history")
            .history
            .clone()
    }

    pub fn publish_count(&self) -> usize {
        mutex_lock(&self.inner, "infra::output", "publish_count")
            .history
            .len()
    }
}

#[async_trait]
impl OutputSink for MemoryOutputSink {
    async fn publish(&self, page: PublishedPage) -> Result<(), PublishError> {
        let mut inner = mutex_lock(&self.inner, "infra::output", "publish");
        inner.history.push(page.clone());
        inner
            .pages
            .insert((page.content_id, page.culture.clone()), page);
        Ok(())
    }
}
