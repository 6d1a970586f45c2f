//! Content change signals and the worker that turns them into renders.
//!
//! Saving or publishing content only enqueues a [`ContentChanged`] signal;
//! rendering happens on the worker, so the save path never waits for it.

use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use thiserror::Error;
use time::OffsetDateTime;
use tokio::{
    sync::{Semaphore, mpsc},
    task::{JoinError, JoinSet},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::render::{RenderKey, RenderOrchestrator, RenderOutcome},
    domain::content::RawContentRecord,
};

/// Monotonic, process-local ordering of change signals.
pub type Epoch = u64;

/// One save or publish operation, carrying every record it touched.
#[derive(Debug, Clone)]
pub struct ContentChanged {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub records: Vec<RawContentRecord>,
    pub timestamp: OffsetDateTime,
}

impl ContentChanged {
    pub fn new(records: Vec<RawContentRecord>, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            records,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChangeFeedError {
    #[error("change receiver has been dropped")]
    Closed,
}

/// Sending half of the change channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: mpsc::UnboundedSender<ContentChanged>,
    epoch_counter: Arc<AtomicU64>,
}

impl ChangeFeed {
    pub fn channel() -> (Self, ChangeReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let feed = Self {
            sender,
            epoch_counter: Arc::new(AtomicU64::new(0)),
        };
        (feed, ChangeReceiver { receiver })
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Enqueue a change signal without waiting for it to be rendered.
    pub fn publish(&self, records: Vec<RawContentRecord>) -> Result<Epoch, ChangeFeedError> {
        let event = ContentChanged::new(records, self.next_epoch());

        info!(
            target = "application::changes::publish",
            event_id = %event.id,
            event_epoch = event.epoch,
            records = event.records.len(),
            "content change enqueued"
        );

        let epoch = event.epoch;
        self.sender
            .send(event)
            .map_err(|_| ChangeFeedError::Closed)?;
        Ok(epoch)
    }
}

#[derive(Debug)]
pub struct ChangeReceiver {
    receiver: mpsc::UnboundedReceiver<ContentChanged>,
}

impl ChangeReceiver {
    /// `None` once every [`ChangeFeed`] handle is dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<ContentChanged> {
        self.receiver.recv().await
    }
}

/// Tally of render outcomes across the events a worker processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub events: usize,
    pub committed: usize,
    pub coalesced: usize,
    pub superseded: usize,
    pub discarded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<(RenderKey, String)>,
}

impl RenderReport {
    pub fn record(&mut self, key: &RenderKey, outcome: &RenderOutcome) {
        match outcome {
            RenderOutcome::Committed { .. } => self.committed += 1,
            RenderOutcome::Coalesced { .. } => self.coalesced += 1,
            RenderOutcome::Superseded { .. } => self.superseded += 1,
            RenderOutcome::Discarded { .. } => self.discarded += 1,
            RenderOutcome::Skipped => self.skipped += 1,
            RenderOutcome::Failed { error, .. } => {
                self.failed += 1;
                self.failures.push((key.clone(), error.to_string()));
            }
        }
    }

    pub fn record_event(&mut self, outcomes: &[(RenderKey, RenderOutcome)]) {
        self.events += 1;
        for (key, outcome) in outcomes {
            self.record(key, outcome);
        }
    }

    /// Number of render outcomes recorded, across every event.
    pub fn renders(&self) -> usize {
        self.committed
            + self.coalesced
            + self.superseded
            + self.discarded
            + self.skipped
            + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn absorb(&mut self, joined: Result<Vec<(RenderKey, RenderOutcome)>, JoinError>) {
        match joined {
            Ok(outcomes) => self.record_event(&outcomes),
            Err(err) => {
                warn!(
                    target = "application::changes::worker",
                    error = %err,
                    "render task panicked or was cancelled"
                );
                self.events += 1;
                self.failed += 1;
            }
        }
    }
}

/// Drains a [`ChangeReceiver`], handling up to `concurrency` events at once.
pub struct RenderWorker {
    orchestrator: RenderOrchestrator,
    concurrency: NonZeroUsize,
}

impl RenderWorker {
    pub fn new(orchestrator: RenderOrchestrator, concurrency: NonZeroUsize) -> Self {
        Self {
            orchestrator,
            concurrency,
        }
    }

    /// Run until the channel closes and every accepted event has finished.
    pub async fn run(self, mut receiver: ChangeReceiver) -> RenderReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency.get()));
        let mut tasks = JoinSet::new();
        let mut report = RenderReport::default();

        loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Some(event) => {
                        let orchestrator = self.orchestrator.clone();
                        let semaphore = Arc::clone(&semaphore);
                        tasks.spawn(async move {
                            let _permit = semaphore.acquire_owned().await.ok();
                            orchestrator.handle_change(event).await
                        });
                    }
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => report.absorb(joined),
            }
        }

        while let Some(joined) = tasks.join_next().await {
            report.absorb(joined);
        }

        info!(
            target = "application::changes::worker",
            events = report.events,
            committed = report.committed,
            coalesced = report.coalesced,
            failed = report.failed,
            "change feed drained"
        );
        report
    }
}
