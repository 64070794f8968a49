//! Run-scoped, thread-safe owner of the trace tree.
//!
//! Submitters push events into an inbox. Whoever holds the tree lock
//! drains the inbox one event at a time; a submitter that finds the lock
//! taken leaves its event queued for the current holder instead of
//! applying it concurrently.

use super::node::TraceNode;
use super::tree::{Applied, TraceTree, TreeStats};
use crate::protocol::LifecycleEvent;
use crate::utils::config::{DEFAULT_ENTRY_POINT, DEFAULT_SWEEP_GRACE};
use crate::utils::error::ProtocolError;
use chrono::Utc;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    /// No event applied yet
    Empty,
    Building,
    /// Completion sentinel received or the run timed out
    Finished,
}

/// Where a snapshot's nodes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceSource {
    Events,
    /// Rebuilt from log text by the fallback recoverer
    Logs,
}

/// Read-only view of a run's tree
///
/// **Public** - what visualizers and the CLI consume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSnapshot {
    pub run_id: Option<String>,
    pub phase: RunPhase,
    pub source: TraceSource,
    pub root: Option<TraceNode>,
    /// Parentless subtrees other than the root's
    #[serde(default)]
    pub detached: Vec<TraceNode>,
    pub stats: TreeStats,
}

impl TraceSnapshot {
    pub fn node_count(&self) -> usize {
        self.root.iter().chain(self.detached.iter()).map(TraceNode::size).sum()
    }
}

struct RunState {
    run_id: Option<String>,
    tree: TraceTree,
    phase: RunPhase,
    sweep_due: Option<Instant>,
}

impl RunState {
    fn new(run_id: Option<String>, entry_point: &str) -> Self {
        Self {
            run_id,
            tree: TraceTree::new(entry_point),
            phase: RunPhase::Empty,
            sweep_due: None,
        }
    }
}

pub struct Reconstructor {
    entry_point: String,
    grace: Duration,
    /// Copy of the current run id for the lock-free stale check
    current: RwLock<Option<String>>,
    inbox: Mutex<VecDeque<(String, LifecycleEvent)>>,
    state: Mutex<RunState>,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::new(DEFAULT_ENTRY_POINT, DEFAULT_SWEEP_GRACE)
    }
}

impl Reconstructor {
    pub fn new(entry_point: impl Into<String>, grace: Duration) -> Self {
        let entry_point = entry_point.into();
        Self {
            state: Mutex::new(RunState::new(None, &entry_point)),
            entry_point,
            grace,
            current: RwLock::new(None),
            inbox: Mutex::new(VecDeque::new()),
        }
    }

    /// Discard all state and start accepting events for `run_id`
    pub fn reset(&self, run_id: &str) {
        let mut state = self.state.lock();
        *self.current.write() = Some(run_id.to_string());
        self.inbox.lock().clear();
        *state = RunState::new(Some(run_id.to_string()), &self.entry_point);
        debug!("Reconstructor reset for run {}", run_id);
    }

    /// Forget the current run; every later event is stale
    pub fn clear(&self) {
        let mut state = self.state.lock();
        *self.current.write() = None;
        self.inbox.lock().clear();
        *state = RunState::new(None, &self.entry_point);
    }

    pub fn run_id(&self) -> Option<String> {
        self.current.read().clone()
    }

    /// Queue an event and apply everything queued if the tree is free
    ///
    /// **Public** - called for every decoded `process-event`
    ///
    /// # Errors
    /// * `ProtocolError::StaleRun` - The event belongs to another run
    pub fn submit(&self, run_id: &str, event: LifecycleEvent) -> Result<(), ProtocolError> {
        self.check_run(run_id)?;
        self.inbox.lock().push_back((run_id.to_string(), event));
        self.drain();
        Ok(())
    }

    fn check_run(&self, run_id: &str) -> Result<(), ProtocolError> {
        match self.current.read().as_deref() {
            Some(current) if current == run_id => Ok(()),
            current => Err(ProtocolError::StaleRun {
                expected: current.unwrap_or("<none>").to_string(),
                found: run_id.to_string(),
            }),
        }
    }

    fn drain(&self) {
        loop {
            let Some(mut state) = self.state.try_lock() else {
                // The holder applies our event before releasing
                return;
            };
            loop {
                let next = self.inbox.lock().pop_front();
                let Some((run_id, event)) = next else {
                    break;
                };
                Self::apply(&mut state, &run_id, &event, self.grace);
            }
            drop(state);

            // Events queued between the last pop and the unlock
            if self.inbox.lock().is_empty() {
                return;
            }
        }
    }

    fn apply(state: &mut RunState, run_id: &str, event: &LifecycleEvent, grace: Duration) {
        if state.run_id.as_deref() != Some(run_id) {
            debug!("Dropping queued event {} of stale run {}", event.id, run_id);
            return;
        }
        if state.phase == RunPhase::Empty {
            state.phase = RunPhase::Building;
        }
        if let Applied::Ended { root: true } = state.tree.apply(event) {
            debug!("Root {} ended, sweep in {:?}", event.id, grace);
            state.sweep_due = Some(Instant::now() + grace);
        }
    }

    /// Mark the run finished (completion sentinel or timeout)
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.phase = RunPhase::Finished;
        info!(
            "Run {} finished with {} nodes",
            state.run_id.as_deref().unwrap_or("<none>"),
            state.tree.len()
        );
    }

    pub fn phase(&self) -> RunPhase {
        self.state.lock().phase
    }

    pub fn sweep_pending(&self) -> bool {
        self.state.lock().sweep_due.is_some()
    }

    /// Run the scheduled orphan sweep once its grace window has passed
    pub fn sweep_if_due(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        match state.sweep_due {
            Some(due) if due <= now => {
                state.sweep_due = None;
                state.tree.sweep_orphans(Utc::now().timestamp_millis())
            }
            _ => 0,
        }
    }

    /// Sweep immediately. After the run finished, or once the root ended,
    /// nothing below the root can still be in flight.
    pub fn force_sweep(&self) -> usize {
        let mut state = self.state.lock();
        let root_done = state
            .tree
            .root_id()
            .and_then(|id| state.tree.get(&id).map(|n| n.end_time.is_some()))
            .unwrap_or(false);
        if state.sweep_due.is_none() && !root_done && state.phase != RunPhase::Finished {
            return 0;
        }
        state.sweep_due = None;
        state.tree.sweep_orphans(Utc::now().timestamp_millis())
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().tree.is_empty()
    }

    pub fn snapshot(&self) -> TraceSnapshot {
        let state = self.state.lock();
        let (root, detached) = state.tree.snapshot();
        TraceSnapshot {
            run_id: state.run_id.clone(),
            phase: state.phase,
            source: TraceSource::Events,
            root,
            detached,
            stats: state.tree.stats().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EventKind;
    use std::sync::Arc;
    use std::thread;

    fn start(id: &str, parent: Option<&str>, at: i64) -> LifecycleEvent {
        LifecycleEvent::start(id, id.split('#').next().unwrap(), EventKind::Function, parent.map(str::to_string), at)
    }

    fn end(id: &str, at: i64) -> LifecycleEvent {
        LifecycleEvent::end(id, id.split('#').next().unwrap(), EventKind::Function, None, at)
    }

    #[test]
    fn test_stale_run_is_rejected() {
        let recon = Reconstructor::default();
        recon.reset("new");
        let err = recon.submit("old", start("main#1", None, 0)).unwrap_err();
        assert!(matches!(err, ProtocolError::StaleRun { .. }));
        assert!(recon.is_empty());
        assert_eq!(recon.phase(), RunPhase::Empty);
    }

    #[test]
    fn test_reset_discards_previous_run() {
        let recon = Reconstructor::default();
        recon.reset("a");
        recon.submit("a", start("main#1", None, 0)).unwrap();
        assert_eq!(recon.phase(), RunPhase::Building);
        recon.reset("b");
        assert!(recon.is_empty());
        assert_eq!(recon.snapshot().run_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_root_end_schedules_sweep() {
        let recon = Reconstructor::new("main", Duration::from_millis(0));
        recon.reset("r");
        recon.submit("r", start("main#1", None, 0)).unwrap();
        recon.submit("r", start("timer#2", Some("main#1"), 1)).unwrap();
        recon.submit("r", end("main#1", 2)).unwrap();
        assert!(recon.sweep_pending());

        assert_eq!(recon.sweep_if_due(Instant::now()), 1);
        let snapshot = recon.snapshot();
        assert!(snapshot.root.unwrap().children[0].is_completed());
    }

    #[test]
    fn test_sweep_waits_for_grace() {
        let recon = Reconstructor::new("main", Duration::from_secs(60));
        recon.reset("r");
        recon.submit("r", start("main#1", None, 0)).unwrap();
        recon.submit("r", start("late#2", Some("main#1"), 1)).unwrap();
        recon.submit("r", end("main#1", 2)).unwrap();
        assert_eq!(recon.sweep_if_due(Instant::now()), 0);
        assert_eq!(recon.force_sweep(), 1);
    }

    #[test]
    fn test_concurrent_submitters() {
        let recon = Arc::new(Reconstructor::default());
        recon.reset("r");
        recon.submit("r", start("main#1", None, 0)).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|w| {
                let recon = recon.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("f{}#{}", w, i + 2);
                        recon.submit("r", start(&id, Some("main#1"), i)).unwrap();
                        recon.submit("r", end(&id, i + 1)).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        // Whatever a racing submitter left queued is applied by the next one
        recon.submit("r", end("main#1", 100)).unwrap();

        let snapshot = recon.snapshot();
        assert_eq!(snapshot.node_count(), 201);
        assert_eq!(snapshot.stats.events_applied, 402);
    }
}
