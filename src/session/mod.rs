//! Host-side orchestration of a single active run.
//!
//! A session owns one long-lived message bus shared by every run it
//! starts. Each run gets a fresh uuid; anything arriving on the bus for an
//! older run is dropped by id. Starting a run tears down the previous one
//! first.

pub mod config;

pub use config::SessionConfig;

use crate::instrument::{instrument, Instrumented};
use crate::protocol::{decode, Message};
use crate::reconstruct::{Reconstructor, RunPhase, TraceSnapshot, TraceSource};
use crate::recover::recover_from_logs;
use crate::sandbox::{SandboxExecutor, SandboxHandle, SandboxRequest};
use crate::utils::config::{HOST_TIMEOUT_SLACK, PUMP_INTERVAL};
use crate::utils::error::SessionError;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use serde_json::Value as Json;
use std::time::{Duration, Instant};
use uuid::Uuid;

struct ActiveRun {
    id: String,
    handle: Option<SandboxHandle>,
    /// Done received or forced; later messages for this id are ignored
    closed: bool,
}

/// Drives runs from source text to a reconstructed tree
///
/// **Public** - the engine's entry point for embedders and the CLI
pub struct TraceSession {
    config: SessionConfig,
    bus_tx: Sender<Json>,
    bus_rx: Receiver<Json>,
    reconstructor: Reconstructor,
    run: Option<ActiveRun>,
    instrumented: Option<Instrumented>,
    /// Program console output only; feeds the log fallback
    logs: Vec<String>,
    /// One annotation per accepted lifecycle event
    annotations: Vec<String>,
    /// Console output and annotations interleaved in arrival order
    transcript: Vec<String>,
}

impl Default for TraceSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl TraceSession {
    pub fn new(config: SessionConfig) -> Self {
        let (bus_tx, bus_rx) = unbounded();
        Self {
            reconstructor: Reconstructor::new(config.entry_point.clone(), config.grace),
            config,
            bus_tx,
            bus_rx,
            run: None,
            instrumented: None,
            logs: Vec::new(),
            annotations: Vec::new(),
            transcript: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Instrument `source` and start executing it
    ///
    /// **Public** - aborts whatever run was active
    ///
    /// # Returns
    /// The new run id
    ///
    /// # Errors
    /// * `SessionError::Instrument` - The program does not parse; nothing runs
    /// * `SessionError::Sandbox` - The sandbox thread could not be started
    pub fn start_run(&mut self, source: &str) -> Result<String, SessionError> {
        self.abort();
        self.logs.clear();
        self.annotations.clear();
        self.transcript.clear();

        let instrumented = instrument(source)?;
        let run_id = Uuid::new_v4().to_string();
        self.reconstructor.reset(&run_id);

        let request = SandboxRequest {
            run_id: run_id.clone(),
            source: instrumented.source.clone(),
            timeout: self.config.timeout,
        };
        let handle = match SandboxExecutor::spawn(request, self.bus_tx.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                self.reconstructor.clear();
                return Err(e.into());
            }
        };

        info!("Run {} started", run_id);
        self.instrumented = Some(instrumented);
        self.run = Some(ActiveRun {
            id: run_id.clone(),
            handle: Some(handle),
            closed: false,
        });
        Ok(run_id)
    }

    /// Process bus traffic for up to `max_wait`
    ///
    /// Returns early once the run is finished and its sweep has run.
    pub fn pump(&mut self, max_wait: Duration) -> RunPhase {
        let until = Instant::now() + max_wait;
        loop {
            let wait = until
                .saturating_duration_since(Instant::now())
                .min(PUMP_INTERVAL);
            match self.bus_rx.recv_timeout(wait) {
                Ok(raw) => {
                    self.handle_message(&raw);
                    while let Ok(raw) = self.bus_rx.try_recv() {
                        self.handle_message(&raw);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                // The session holds a sender, so the bus cannot close
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let swept = self.reconstructor.sweep_if_due(Instant::now());
            if swept > 0 {
                debug!("Orphan sweep completed {} nodes", swept);
            }
            self.enforce_timeout();

            if self.run.is_none() || self.is_settled() || Instant::now() >= until {
                break;
            }
        }
        self.reconstructor.phase()
    }

    /// Finished and no sweep left to wait for
    pub fn is_settled(&self) -> bool {
        self.reconstructor.phase() == RunPhase::Finished && !self.reconstructor.sweep_pending()
    }

    /// Start a run and pump until it has settled
    ///
    /// **Public** - the blocking convenience used by the CLI
    pub fn run_to_completion(&mut self, source: &str) -> Result<TraceSnapshot, SessionError> {
        self.start_run(source)?;
        while !self.is_settled() {
            self.pump(PUMP_INTERVAL);
        }
        Ok(self.snapshot())
    }

    fn handle_message(&mut self, raw: &Json) {
        let Some(run) = self.run.as_mut() else {
            debug!("No active run, dropping bus message");
            return;
        };
        if run.closed {
            debug!("Run {} already closed, dropping bus message", run.id);
            return;
        }

        match decode(raw, &run.id) {
            Ok(Message::Event(event)) => {
                let annotation = event.annotation();
                debug!("{}", annotation);
                self.annotations.push(annotation.clone());
                self.transcript.push(annotation);
                if let Err(e) = self.reconstructor.submit(&run.id, event) {
                    debug!("Dropping event: {}", e);
                }
            }
            Ok(Message::Log(line)) => {
                self.transcript.push(line.clone());
                self.logs.push(line);
            }
            Ok(Message::Done) => {
                run.closed = true;
                if let Some(handle) = run.handle.take() {
                    handle.join();
                }
                self.reconstructor.finish();
            }
            Err(e) => debug!("Dropping bus message: {}", e),
        }
    }

    /// Backstop for a sandbox that overran its own deadline
    fn enforce_timeout(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        if run.closed {
            return;
        }
        let overran = run
            .handle
            .as_ref()
            .map_or(false, |h| h.elapsed() >= self.config.timeout + HOST_TIMEOUT_SLACK);
        if !overran {
            return;
        }

        warn!("Run {} did not report completion, terminating", run.id);
        if let Some(handle) = run.handle.take() {
            handle.cancel();
        }
        run.closed = true;
        let line = format!("Execution timed out after {}ms", self.config.timeout.as_millis());
        self.transcript.push(line.clone());
        self.logs.push(line);
        self.reconstructor.finish();
    }

    /// Stop the active run and forget it
    ///
    /// The sandbox is cancelled and detached. Its late messages, if any,
    /// are dropped as stale.
    pub fn abort(&mut self) {
        if let Some(run) = self.run.take() {
            if let Some(handle) = run.handle {
                handle.cancel();
            }
            info!("Run {} aborted", run.id);
        }
        self.instrumented = None;
        self.reconstructor.clear();
    }

    /// Current tree. Once the run is finished without any structured
    /// events, the tree recovered from log text is returned instead.
    pub fn snapshot(&self) -> TraceSnapshot {
        let snapshot = self.reconstructor.snapshot();
        if snapshot.phase == RunPhase::Finished {
            self.with_fallback(snapshot)
        } else {
            snapshot
        }
    }

    /// Force the orphan sweep and the log fallback now
    pub fn sync(&mut self) -> TraceSnapshot {
        let swept = self.reconstructor.force_sweep();
        debug!("Sync swept {} nodes", swept);
        let snapshot = self.reconstructor.snapshot();
        self.with_fallback(snapshot)
    }

    fn with_fallback(&self, snapshot: TraceSnapshot) -> TraceSnapshot {
        if snapshot.root.is_some() || !snapshot.detached.is_empty() {
            return snapshot;
        }
        match recover_from_logs(&self.logs) {
            Some(tree) => {
                info!("No structured events, recovered {} nodes from logs", tree.size());
                TraceSnapshot {
                    source: TraceSource::Logs,
                    root: Some(tree),
                    ..snapshot
                }
            }
            None => snapshot,
        }
    }

    /// Console output of the current run, in arrival order
    pub fn log_lines(&self) -> &[String] {
        &self.logs
    }

    /// Event-trace annotations of the current run, in arrival order
    pub fn trace_lines(&self) -> &[String] {
        &self.annotations
    }

    /// Console output and trace annotations of the current run, interleaved
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn current_run_id(&self) -> Option<&str> {
        self.run.as_ref().map(|run| run.id.as_str())
    }

    /// Instrumented form of the current run's program
    pub fn instrumented(&self) -> Option<&Instrumented> {
        self.instrumented.as_ref()
    }

    pub fn reconstructor(&self) -> &Reconstructor {
        &self.reconstructor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::InstrumentError;

    fn quick() -> TraceSession {
        TraceSession::new(
            SessionConfig::new()
                .with_timeout(Duration::from_secs(5))
                .with_grace(Duration::from_millis(10)),
        )
    }

    #[test]
    fn test_parse_error_blocks_run() {
        let mut session = quick();
        let err = session.start_run(")))").unwrap_err();
        assert!(matches!(err, SessionError::Instrument(InstrumentError::Parse(_))));
        assert!(session.current_run_id().is_none());
        assert_eq!(session.snapshot().phase, RunPhase::Empty);
    }

    #[test]
    fn test_abort_forgets_run() {
        let mut session = quick();
        let id = session.start_run("while (true) {}").unwrap();
        assert_eq!(session.current_run_id(), Some(id.as_str()));
        session.abort();
        assert!(session.current_run_id().is_none());
        assert_eq!(session.pump(Duration::from_millis(50)), RunPhase::Empty);
        assert!(session.snapshot().root.is_none());
    }

    #[test]
    fn test_runs_get_fresh_ids() {
        let mut session = quick();
        let first = session.start_run("1").unwrap();
        let second = session.start_run("2").unwrap();
        assert_ne!(first, second);
    }
}
