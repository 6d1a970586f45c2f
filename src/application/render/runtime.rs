use std::{future::Future, sync::Arc};

use dashmap::DashMap;
use metrics::gauge;
use serde::Serialize;

use crate::{domain::content::RawContentRecord, util::lock::mutex_lock};

use super::types::RenderKey;

const SOURCE: &str = "application::render::runtime";
const METRIC_IN_FLIGHT: &str = "imprint_render_in_flight";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPhase {
    #[default]
    Idle,
    Building,
    Rendering,
    Committed,
    Failed,
}

/// Point-in-time view of one render key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderStatus {
    pub phase: RenderPhase,
    pub latest_generation: u64,
    pub committed_generation: u64,
    pub pending: bool,
    pub last_error: Option<String>,
}

/// Result of offering a record to a slot.
#[derive(Debug)]
pub(crate) enum Admission {
    /// The caller owns the slot and must run `generation`.
    Run {
        record: RawContentRecord,
        generation: u64,
    },
    /// Another task owns the slot; the record became its pending follow-up.
    Coalesced { generation: u64 },
}

/// Result of a guarded commit.
#[derive(Debug)]
pub enum CommitResult<E> {
    Committed,
    Discarded { committed: u64 },
    Failed(E),
}

/// Per-key render state, one entry per key ever rendered.
#[derive(Default, Clone)]
pub struct RenderSlots {
    slots: Arc<DashMap<RenderKey, Arc<RenderSlot>>>,
}

impl RenderSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, key: &RenderKey) -> Arc<RenderSlot> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(
            self.slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(RenderSlot::default()))
                .value(),
        )
    }

    pub fn status(&self, key: &RenderKey) -> Option<RenderStatus> {
        self.slots.get(key).map(|slot| slot.status())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// State machine for one render key.
///
/// The std mutex is only held for bookkeeping. The async mutex serialises
/// commits and holds the committed generation across the sink write, so a
/// commit can never overtake a newer one that already reached the sink.
#[derive(Default)]
pub struct RenderSlot {
    state: std::sync::Mutex<SlotState>,
    committed: tokio::sync::Mutex<u64>,
}

#[derive(Default)]
struct SlotState {
    phase: RenderPhase,
    next_generation: u64,
    committed_generation: u64,
    running: bool,
    pending: Option<(RawContentRecord, u64)>,
    last_error: Option<String>,
}

impl RenderSlot {
    pub(crate) fn admit(&self, record: RawContentRecord) -> Admission {
        let mut state = mutex_lock(&self.state, SOURCE, "admit");
        state.next_generation += 1;
        let generation = state.next_generation;

        if state.running {
            state.pending = Some((record, generation));
            return Admission::Coalesced { generation };
        }

        state.running = true;
        state.phase = RenderPhase::Building;
        gauge!(METRIC_IN_FLIGHT).increment(1.0);
        Admission::Run { record, generation }
    }

    /// A newer record is waiting, so the current run's output would be stale.
    pub fn is_superseded(&self) -> bool {
        mutex_lock(&self.state, SOURCE, "is_superseded")
            .pending
            .is_some()
    }

    pub(crate) fn enter(&self, phase: RenderPhase) {
        mutex_lock(&self.state, SOURCE, "enter").phase = phase;
    }

    /// Close the current run. Returns the pending follow-up, which the caller
    /// must run next, or releases the slot when there is none.
    pub(crate) fn finish(
        &self,
        phase: RenderPhase,
        error: Option<String>,
    ) -> Option<(RawContentRecord, u64)> {
        let mut state = mutex_lock(&self.state, SOURCE, "finish");
        match phase {
            RenderPhase::Failed => state.last_error = error,
            RenderPhase::Committed => state.last_error = None,
            _ => {}
        }

        match state.pending.take() {
            Some(next) => {
                state.phase = RenderPhase::Building;
                Some(next)
            }
            None => {
                state.running = false;
                state.phase = phase;
                gauge!(METRIC_IN_FLIGHT).decrement(1.0);
                None
            }
        }
    }

    /// Close a run whose owner went away before `finish`.
    ///
    /// With `hand_off` the pending follow-up is returned and the slot stays
    /// owned by whoever runs it. Otherwise the slot is released and the
    /// follow-up dropped; the next signal for the key starts a fresh run.
    pub(crate) fn abandon(&self, hand_off: bool) -> Option<(RawContentRecord, u64)> {
        let mut state = mutex_lock(&self.state, SOURCE, "abandon");
        if !state.running {
            return None;
        }
        state.last_error = Some("render abandoned before completion".to_string());

        match state.pending.take() {
            Some(next) if hand_off => {
                state.phase = RenderPhase::Building;
                Some(next)
            }
            _ => {
                state.running = false;
                state.phase = RenderPhase::Failed;
                gauge!(METRIC_IN_FLIGHT).decrement(1.0);
                None
            }
        }
    }

    /// Run `publish` only when `generation` is newer than everything already
    /// committed for this key.
    pub async fn commit<F, Fut, E>(&self, generation: u64, publish: F) -> CommitResult<E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut committed = self.committed.lock().await;
        if generation <= *committed {
            return CommitResult::Discarded {
                committed: *committed,
            };
        }

        match publish().await {
            Ok(()) => {
                *committed = generation;
                mutex_lock(&self.state, SOURCE, "commit").committed_generation = generation;
                CommitResult::Committed
            }
            Err(err) => CommitResult::Failed(err),
        }
    }

    pub fn status(&self) -> RenderStatus {
        let state = mutex_lock(&self.state, SOURCE, "status");
        RenderStatus {
            phase: state.phase,
            latest_generation: state.next_generation,
            committed_generation: state.committed_generation,
            pending: state.pending.is_some(),
            last_error: state.last_error.clone(),
        }
    }
}
