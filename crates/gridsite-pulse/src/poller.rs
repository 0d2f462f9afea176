use crate::session::SessionEvent;
use gridsite_client::{ApiError, QueryApi};
use gridsite_core::{QueryId, QuerySnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);

/// Identifies which poller produced a response and in what order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTicket {
    pub id: QueryId,
    pub generation: u64,
    pub seq: u64,
}

#[derive(Debug)]
pub enum PollOutcome {
    Snapshot(QuerySnapshot),
    Failed(ApiError),
}

#[derive(Debug)]
pub struct PollReport {
    pub ticket: PollTicket,
    pub outcome: PollOutcome,
}

struct PollHandle {
    generation: u64,
    last_seq: u64,
    task: JoinHandle<()>,
}

/// At most one live status loop per query id.
pub struct StatusPoller {
    api: Arc<dyn QueryApi>,
    events: mpsc::Sender<SessionEvent>,
    period: Duration,
    active: HashMap<QueryId, PollHandle>,
    next_generation: u64,
}

impl StatusPoller {
    pub fn new(api: Arc<dyn QueryApi>, events: mpsc::Sender<SessionEvent>, period: Duration) -> Self {
        Self {
            api,
            events,
            period,
            active: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Replaces any poller already running for `id`.
    pub fn start(&mut self, id: QueryId) -> u64 {
        self.stop(&id);
        self.next_generation += 1;
        let generation = self.next_generation;
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.api),
            self.events.clone(),
            id.clone(),
            generation,
            self.period,
        ));
        info!(event = "poller_start", query_id = %id, generation);
        self.active.insert(
            id,
            PollHandle {
                generation,
                last_seq: 0,
                task,
            },
        );
        generation
    }

    pub fn stop(&mut self, id: &QueryId) -> bool {
        match self.active.remove(id) {
            Some(handle) => {
                handle.task.abort();
                debug!(event = "poller_stop", query_id = %id, generation = handle.generation);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for (id, handle) in self.active.drain() {
            handle.task.abort();
            debug!(event = "poller_stop", query_id = %id, generation = handle.generation);
        }
    }

    /// Forget a poller whose task already ended on its own.
    pub fn finish(&mut self, id: &QueryId) {
        self.active.remove(id);
    }

    /// True when `ticket` comes from the live poller for its id and is newer
    /// than anything applied so far. Records the sequence on success.
    pub fn accept(&mut self, ticket: &PollTicket) -> bool {
        let Some(handle) = self.active.get_mut(&ticket.id) else {
            return false;
        };
        if handle.generation != ticket.generation || ticket.seq <= handle.last_seq {
            return false;
        }
        handle.last_seq = ticket.seq;
        true
    }

    pub fn is_active(&self, id: &QueryId) -> bool {
        self.active.contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn poll_loop(
    api: Arc<dyn QueryApi>,
    events: mpsc::Sender<SessionEvent>,
    id: QueryId,
    generation: u64,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seq = 0u64;
    loop {
        ticker.tick().await;
        seq += 1;
        let outcome = match api.status(&id).await {
            Ok(snapshot) => PollOutcome::Snapshot(snapshot),
            Err(err) => PollOutcome::Failed(err),
        };
        let done = match &outcome {
            PollOutcome::Snapshot(snapshot) => snapshot.is_terminal(),
            PollOutcome::Failed(_) => true,
        };
        let report = PollReport {
            ticket: PollTicket {
                id: id.clone(),
                generation,
                seq,
            },
            outcome,
        };
        if events.send(SessionEvent::Poll(report)).await.is_err() {
            break;
        }
        if done {
            debug!(event = "poller_done", query_id = %id, generation, seq);
            break;
        }
    }
}
