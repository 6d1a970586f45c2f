use std::{sync::Arc, time::Instant};

use futures::future::join_all;
use metrics::{counter, histogram};
use tracing::{debug, info, warn};

use crate::{
    application::{
        changes::ContentChanged,
        snapshot::{ContentSnapshot, SnapshotFactory},
    },
    domain::content::RawContentRecord,
};

use super::{
    runtime::{Admission, CommitResult, RenderPhase, RenderSlot, RenderSlots, RenderStatus},
    types::{OutputSink, PublishedPage, RenderEngine, RenderError, RenderKey, TemplateStore},
};

const METRIC_COMMITTED: &str = "imprint_render_committed_total";
const METRIC_FAILED: &str = "imprint_render_failed_total";
const METRIC_COALESCED: &str = "imprint_render_coalesced_total";
const METRIC_DISCARDED: &str = "imprint_render_discarded_total";
const METRIC_RENDER_MS: &str = "imprint_render_ms";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Render drafts and unpublished cultures as well.
    pub preview: bool,
}

/// How one submission ended.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Committed { generation: u64, route: String },
    /// Folded into the render already running for the key.
    Coalesced { generation: u64 },
    /// Stopped early because a newer record arrived for the key.
    Superseded { generation: u64 },
    /// Rendered, but a newer generation had already been committed.
    Discarded { generation: u64, committed: u64 },
    /// Not published in this context; nothing to render.
    Skipped,
    Failed { generation: u64, error: RenderError },
}

impl RenderOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    fn phase(&self) -> RenderPhase {
        match self {
            Self::Committed { .. } => RenderPhase::Committed,
            Self::Failed { .. } => RenderPhase::Failed,
            _ => RenderPhase::Idle,
        }
    }
}

/// Single-flight renderer: at most one render runs per key, later signals for
/// a busy key collapse into one follow-up, and output is only written when it
/// is newer than what was last written for that key.
#[derive(Clone)]
pub struct RenderOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    factory: SnapshotFactory,
    templates: Arc<dyn TemplateStore>,
    engine: Arc<dyn RenderEngine>,
    sink: Arc<dyn OutputSink>,
    slots: RenderSlots,
    options: RenderOptions,
}

impl RenderOrchestrator {
    pub fn new(
        factory: SnapshotFactory,
        templates: Arc<dyn TemplateStore>,
        engine: Arc<dyn RenderEngine>,
        sink: Arc<dyn OutputSink>,
        options: RenderOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                templates,
                engine,
                sink,
                slots: RenderSlots::new(),
                options,
            }),
        }
    }

    pub fn options(&self) -> RenderOptions {
        self.inner.options
    }

    pub fn status(&self, key: &RenderKey) -> Option<RenderStatus> {
        self.inner.slots.status(key)
    }

    /// Render every (record, culture) pair carried by a change signal.
    ///
    /// Culture-varying records render once per culture they carry publish
    /// data for; invariant records render once. Keys are independent and run
    /// concurrently.
    pub async fn handle_change(&self, event: ContentChanged) -> Vec<(RenderKey, RenderOutcome)> {
        debug!(
            target = "application::render::orchestrator::handle_change",
            event_id = %event.id,
            event_epoch = event.epoch,
            records = event.records.len(),
            "handling content change"
        );

        let jobs: Vec<(RawContentRecord, Option<String>)> = event
            .records
            .into_iter()
            .flat_map(|record| {
                self.inner
                    .factory
                    .render_cultures(&record)
                    .into_iter()
                    .map(move |culture| (record.clone(), culture))
            })
            .collect();

        join_all(jobs.into_iter().map(|(record, culture)| async move {
            let key = RenderKey::new(record.id, culture.clone());
            let outcome = self.submit(record, culture).await;
            (key, outcome)
        }))
        .await
    }

    /// Offer a record for rendering.
    ///
    /// When the key is idle the caller runs the render, including any
    /// follow-ups that arrive meanwhile, and receives the outcome of the last
    /// run. When the key is busy the record replaces the pending follow-up and
    /// `Coalesced` is returned immediately.
    pub async fn submit(&self, record: RawContentRecord, culture: Option<String>) -> RenderOutcome {
        let key = RenderKey::new(record.id, culture);

        if !self.inner.options.preview && !record.is_culture_published(key.culture()) {
            debug!(
                target = "application::render::orchestrator::submit",
                key = %key,
                "skipping unpublished content"
            );
            return RenderOutcome::Skipped;
        }

        let slot = self.inner.slots.slot(&key);
        let (record, generation) = match slot.admit(record) {
            Admission::Run { record, generation } => (record, generation),
            Admission::Coalesced { generation } => {
                counter!(METRIC_COALESCED).increment(1);
                debug!(
                    target = "application::render::orchestrator::submit",
                    key = %key,
                    generation,
                    "render in flight, queued as follow-up"
                );
                return RenderOutcome::Coalesced { generation };
            }
        };

        self.drive(key, slot, record, generation).await
    }

    /// Own the slot from an admitted run until it is released, running each
    /// follow-up in turn. If this future is dropped first, the guard hands
    /// the slot back.
    async fn drive(
        &self,
        key: RenderKey,
        slot: Arc<RenderSlot>,
        mut record: RawContentRecord,
        mut generation: u64,
    ) -> RenderOutcome {
        let mut guard = RunGuard {
            orchestrator: self.clone(),
            key: key.clone(),
            slot: Arc::clone(&slot),
            armed: true,
        };

        loop {
            let outcome = self.run(&key, &slot, record, generation).await;
            let error = match &outcome {
                RenderOutcome::Failed { error, .. } => Some(error.to_string()),
                _ => None,
            };

            match slot.finish(outcome.phase(), error) {
                Some((next, next_generation)) => {
                    debug!(
                        target = "application::render::orchestrator::drive",
                        key = %key,
                        generation = next_generation,
                        "running follow-up render"
                    );
                    record = next;
                    generation = next_generation;
                }
                None => {
                    guard.armed = false;
                    return outcome;
                }
            }
        }
    }

    async fn run(
        &self,
        key: &RenderKey,
        slot: &RenderSlot,
        record: RawContentRecord,
        generation: u64,
    ) -> RenderOutcome {
        match self.render(key, slot, record, generation).await {
            Ok(outcome) => outcome,
            Err(error) => {
                counter!(METRIC_FAILED, "kind" => error.kind()).increment(1);
                warn!(
                    target = "application::render::orchestrator::run",
                    key = %key,
                    generation,
                    kind = error.kind(),
                    error = %error,
                    "render failed, previous output kept"
                );
                RenderOutcome::Failed { generation, error }
            }
        }
    }

    async fn render(
        &self,
        key: &RenderKey,
        slot: &RenderSlot,
        record: RawContentRecord,
        generation: u64,
    ) -> Result<RenderOutcome, RenderError> {
        let snapshot = self.build_snapshot(key, record).await?;

        let template_id = snapshot
            .template_id()
            .or(snapshot.content_type().default_template_id)
            .ok_or(RenderError::TemplateNotFound {
                content_id: key.content_id,
            })?;
        let body = self.inner.templates.load_template_body(template_id).await?;

        if slot.is_superseded() {
            return Ok(superseded(key, generation, "before render"));
        }

        slot.enter(RenderPhase::Rendering);
        let started_at = Instant::now();
        let (html, route) = {
            let engine = Arc::clone(&self.inner.engine);
            let snapshot = Arc::clone(&snapshot);
            let key = key.clone();
            tokio::task::spawn_blocking(move || {
                let html = engine
                    .compile_and_render(&body, &key, &snapshot)
                    .map_err(|err| RenderError::from_engine(&key, err))?;
                let route = snapshot.route()?.to_string();
                Ok::<_, RenderError>((html, route))
            })
            .await
            .map_err(|err| RenderError::Aborted(err.to_string()))??
        };
        histogram!(METRIC_RENDER_MS, "engine" => self.inner.engine.name())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        if slot.is_superseded() {
            return Ok(superseded(key, generation, "before commit"));
        }

        let page = PublishedPage {
            content_key: snapshot.key(),
            content_id: key.content_id,
            culture: key.culture.clone(),
            route: route.clone(),
            html,
        };
        let sink = Arc::clone(&self.inner.sink);
        match slot.commit(generation, || sink.publish(page)).await {
            CommitResult::Committed => {
                counter!(METRIC_COMMITTED).increment(1);
                info!(
                    target = "application::render::orchestrator::render",
                    key = %key,
                    generation,
                    route = %route,
                    template_id,
                    "page committed"
                );
                Ok(RenderOutcome::Committed { generation, route })
            }
            CommitResult::Discarded { committed } => {
                counter!(METRIC_DISCARDED).increment(1);
                info!(
                    target = "application::render::orchestrator::render",
                    key = %key,
                    generation,
                    committed,
                    "stale render discarded"
                );
                Ok(RenderOutcome::Discarded {
                    generation,
                    committed,
                })
            }
            CommitResult::Failed(err) => Err(err.into()),
        }
    }

    async fn build_snapshot(
        &self,
        key: &RenderKey,
        record: RawContentRecord,
    ) -> Result<Arc<ContentSnapshot>, RenderError> {
        let factory = self.inner.factory.clone();
        let preview = self.inner.options.preview;
        let culture = key.culture.clone();

        let snapshot = tokio::task::spawn_blocking(move || {
            factory.build_for_culture(record, preview, culture)
        })
        .await
        .map_err(|err| RenderError::Aborted(err.to_string()))??;
        Ok(snapshot)
    }
}

fn superseded(key: &RenderKey, generation: u64, stage: &'static str) -> RenderOutcome {
    debug!(
        target = "application::render::orchestrator::render",
        key = %key,
        generation,
        stage,
        "newer record pending, render abandoned"
    );
    RenderOutcome::Superseded { generation }
}

/// Releases a slot whose driving future was dropped mid-run (aborted task,
/// timeout, panic in a sink). A pending follow-up is driven on a fresh task
/// when a runtime is available.
struct RunGuard {
    orchestrator: RenderOrchestrator,
    key: RenderKey,
    slot: Arc<RenderSlot>,
    armed: bool,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let runtime = tokio::runtime::Handle::try_current().ok();
        let handed_off = self.slot.abandon(runtime.is_some());
        warn!(
            target = "application::render::orchestrator::drive",
            key = %self.key,
            follow_up = handed_off.as_ref().map(|(_, generation)| *generation),
            "render abandoned before completion"
        );

        if let (Some(runtime), Some((record, generation))) = (runtime, handed_off) {
            let orchestrator = self.orchestrator.clone();
            let key = self.key.clone();
            let slot = Arc::clone(&self.slot);
            runtime.spawn(async move {
                orchestrator.drive(key, slot, record, generation).await;
            });
        }
    }
}
