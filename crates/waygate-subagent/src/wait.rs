//! Multiplexed blocking wait over independent "agent updated" signals.
//!
//! The coordinator is purely reactive: no source is ever polled. A wait
//! resolves on the first of caller cancellation, deadline expiry, or any
//! target signalling — whichever becomes ready first. All pending futures
//! (timer included) are dropped on return, so nothing leaks past the wait.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::SubAgentError;

/// Status reported for a target that has never signalled.
pub const IDLE_STATUS: &str = "idle";

struct AgentCell {
    tx: Arc<watch::Sender<u64>>,
    seq: u64,
    status: Option<Value>,
}

impl AgentCell {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            tx: Arc::new(tx),
            seq: 0,
            status: None,
        }
    }
}

/// Outcome of a multiplexed wait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitReport {
    pub timed_out: bool,
    /// Not timed out and at least one target has a known status.
    pub ready: bool,
    /// Last-known status per target id; `"idle"` when never signalled.
    pub statuses: BTreeMap<String, Value>,
    /// Full last-known snapshot, populated for single-target waits only.
    pub snapshot: Option<Value>,
}

/// Registry of per-agent signal sources and last-known statuses.
///
/// Turns signal through [`AgentSignals::notify`]; coordinating turns block
/// on [`AgentSignals::wait_any`].
pub struct AgentSignals {
    cells: DashMap<String, AgentCell>,
}

impl AgentSignals {
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }

    /// Record `status` as the agent's last-known state and wake every waiter
    /// subscribed to this id.
    pub fn notify(&self, id: &str, status: Value) {
        let mut cell = self
            .cells
            .entry(id.to_string())
            .or_insert_with(AgentCell::new);
        cell.seq += 1;
        cell.status = Some(status);
        let seq = cell.seq;
        let _ = cell.tx.send(seq);
        debug!(agent = id, seq, "agent signalled");
    }

    /// Last-known status of an agent, if it has ever signalled.
    pub fn status_of(&self, id: &str) -> Option<Value> {
        self.cells.get(id).and_then(|cell| cell.status.clone())
    }

    fn subscribe(&self, id: &str) -> watch::Receiver<u64> {
        self.cells
            .entry(id.to_string())
            .or_insert_with(AgentCell::new)
            .tx
            .subscribe()
    }

    /// Block until any of `ids` signals, `deadline` elapses, or `cancel`
    /// fires. Cancellation is always reported distinctly from a timeout.
    ///
    /// A past-due deadline returns immediately with `timed_out = true`
    /// without enqueuing any wait.
    #[instrument(skip(self, cancel), fields(targets = ids.len()))]
    pub async fn wait_any(
        &self,
        ids: &[String],
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<WaitReport, SubAgentError> {
        // Cancellation and deadline are both checked before blocking.
        if cancel.is_cancelled() {
            return Err(SubAgentError::Cancelled);
        }
        if deadline <= Instant::now() {
            return Ok(self.report(ids, true));
        }

        let mut receivers: Vec<watch::Receiver<u64>> =
            ids.iter().map(|id| self.subscribe(id)).collect();
        // Mark current versions as seen so only signals that arrive after
        // this point wake the wait.
        for rx in &mut receivers {
            let _ = rx.borrow_and_update();
        }

        let timer = tokio::time::sleep_until(deadline);
        tokio::pin!(timer);

        if receivers.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SubAgentError::Cancelled),
                _ = &mut timer => return Ok(self.report(ids, true)),
            }
        }

        let any_signal =
            futures_util::future::select_all(receivers.iter_mut().map(|rx| Box::pin(rx.changed())));

        tokio::select! {
            _ = cancel.cancelled() => Err(SubAgentError::Cancelled),
            _ = &mut timer => Ok(self.report(ids, true)),
            _ = any_signal => Ok(self.report(ids, false)),
        }
    }

    fn report(&self, ids: &[String], timed_out: bool) -> WaitReport {
        let mut statuses = BTreeMap::new();
        let mut any_known = false;
        for id in ids {
            match self.status_of(id) {
                Some(status) => {
                    any_known = true;
                    statuses.insert(id.clone(), status);
                }
                None => {
                    statuses.insert(id.clone(), Value::String(IDLE_STATUS.to_string()));
                }
            }
        }
        let snapshot = match ids {
            [only] => self.status_of(only),
            _ => None,
        };
        WaitReport {
            timed_out,
            ready: !timed_out && any_known,
            statuses,
            snapshot,
        }
    }
}

impl Default for AgentSignals {
    fn default() -> Self {
        Self::new()
    }
}
