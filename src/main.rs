use std::{process, sync::Arc};

use imprint::{
    application::{
        changes::{ChangeFeed, RenderReport, RenderWorker},
        error::AppError,
        render::{RenderOptions, RenderOrchestrator},
        repos::ContentRepository,
        snapshot::{SnapshotFactory, UrlNamePropertyProvider},
    },
    config,
    domain::content::RawContentRecord,
    infra::{
        content_store::InMemoryContentStore, error::InfraError, output::FileOutputSink, telemetry,
        templates::FileTemplateStore,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        InfraError::configuration(format!("failed to load configuration: {err}"))
    })?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Render(config::RenderArgs::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Render(args) => run_render(settings, args).await,
        config::Command::Routes(_) => run_routes(settings).await,
    }
}

async fn load_store(settings: &config::Settings) -> Result<Arc<InMemoryContentStore>, AppError> {
    let store = InMemoryContentStore::load(&settings.content.source).await?;
    info!(
        target = "imprint::content",
        source = %settings.content.source.display(),
        records = store.len(),
        "content loaded"
    );
    Ok(Arc::new(store))
}

fn build_factory(store: &Arc<InMemoryContentStore>, settings: &config::Settings) -> SnapshotFactory {
    SnapshotFactory::builder(store.clone(), store.clone(), store.clone())
        .segment_provider(Arc::new(UrlNamePropertyProvider::new(
            settings.render.url_name_property.clone(),
        )))
        .build()
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let store = load_store(&settings).await?;
    let records = select_records(&store, &args.ids)?;

    let orchestrator = RenderOrchestrator::new(
        build_factory(&store, &settings),
        Arc::new(FileTemplateStore::new(
            settings.render.templates_dir.clone(),
            settings.render.template_extension.clone(),
        )),
        settings
            .render
            .engine
            .build(settings.render.compiled_cache_capacity),
        Arc::new(FileOutputSink::new(settings.render.output_dir.clone())),
        RenderOptions {
            preview: settings.render.preview,
        },
    );

    info!(
        target = "imprint::render",
        engine = %settings.render.engine,
        records = records.len(),
        concurrency = settings.render.concurrency.get(),
        preview = settings.render.preview,
        output = %settings.render.output_dir.display(),
        "Starting render"
    );

    let (feed, receiver) = ChangeFeed::channel();
    let worker = RenderWorker::new(orchestrator, settings.render.concurrency);
    let handle = tokio::spawn(worker.run(receiver));

    for record in records {
        feed.publish(vec![record])?;
    }
    drop(feed);

    let report = handle
        .await
        .map_err(|err| AppError::unexpected(format!("render worker stopped: {err}")))?;
    summarize(&report)
}

fn select_records(
    store: &InMemoryContentStore,
    ids: &[i32],
) -> Result<Vec<RawContentRecord>, AppError> {
    if ids.is_empty() {
        return Ok(store.records());
    }

    ids.iter()
        .map(|&id| {
            store
                .get_by_id(id)
                .map_err(|err| AppError::unexpected(err.to_string()))?
                .ok_or(AppError::NotFound(id))
        })
        .collect()
}

fn summarize(report: &RenderReport) -> Result<(), AppError> {
    info!(
        target = "imprint::render",
        events = report.events,
        committed = report.committed,
        coalesced = report.coalesced,
        superseded = report.superseded,
        discarded = report.discarded,
        skipped = report.skipped,
        failed = report.failed,
        "Render completed"
    );

    if !report.has_failures() {
        return Ok(());
    }

    for (key, message) in &report.failures {
        warn!(target = "imprint::render", key = %key, error = %message, "render failed");
    }
    Err(AppError::RenderFailures {
        failed: report.failed,
        total: report.renders(),
    })
}

async fn run_routes(settings: config::Settings) -> Result<(), AppError> {
    let store = load_store(&settings).await?;
    let factory = build_factory(&store, &settings);
    let preview = settings.render.preview;

    let lines = tokio::task::spawn_blocking(move || route_lines(&factory, store.records(), preview))
        .await
        .map_err(|err| AppError::unexpected(format!("route listing stopped: {err}")))??;

    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn route_lines(
    factory: &SnapshotFactory,
    records: Vec<RawContentRecord>,
    preview: bool,
) -> Result<Vec<String>, AppError> {
    let mut lines = Vec::new();
    for record in records {
        for culture in factory.render_cultures(&record) {
            if !preview && !record.is_culture_published(culture.as_deref()) {
                continue;
            }
            let id = record.id;
            let label = culture.clone().unwrap_or_else(|| "*".to_string());
            let snapshot = factory
                .build_for_culture(record.clone(), preview, culture)
                .map_err(|err| AppError::Render(err.into()))?;
            let route = snapshot
                .route()
                .map_err(|err| AppError::Render(err.into()))?;
            lines.push(format!("{id}\t{label}\t{route}"));
        }
    }
    Ok(lines)
}
