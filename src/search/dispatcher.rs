//! Search dispatch: one kernel invocation per request.
//!
//! A worker thread owns the compute buffers so the device session outlives
//! individual searches. The caller blocks for at most the configured timeout.
//! A search that overruns is left pending on its worker: the next request
//! first waits (within the same timeout) for that late reply and discards it,
//! so at most one kernel is ever in flight.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::compute::buffers::{ComputeBuffers, ResourceLimits};
use crate::compute::device::DeviceProvider;
use crate::compute::kernel_abi::SearchParams;
use crate::errors::EngineError;
use crate::game_state::chess_types::*;
use crate::moves::move_codec::Move;
use crate::utils::diagnostics::DiagnosticsLog;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub board: Board,
    pub side_to_move: Color,
    pub max_depth: u32,
    pub last_move: Move,
    pub limits: ResourceLimits,
    pub castling_rights: CastlingRights,
    pub ply: u16,
}

impl SearchRequest {
    pub fn from_game(game: &GameState, max_depth: u32, limits: ResourceLimits) -> Self {
        Self {
            board: game.board.clone(),
            side_to_move: game.side_to_move,
            max_depth,
            last_move: game.last_move,
            limits,
            castling_rights: game.castling_rights,
            ply: game.ply,
        }
    }

    pub fn params(&self) -> SearchParams {
        SearchParams {
            side_to_move: self.side_to_move.index() as u32,
            last_move: self.last_move.bits(),
            max_depth: self.max_depth,
            max_memory_mb: self.limits.max_memory_mb,
            max_cores: self.limits.max_cores,
            castling_rights: u32::from(self.castling_rights),
            ply: u32::from(self.ply),
            _pad: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResult {
    pub best_move: Move,
    pub nodes: u64,
    pub moves: u64,
    pub elapsed: Duration,
}

/// Totals over every search this dispatcher ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchCounters {
    pub searches: u64,
    pub nodes: u64,
    pub moves: u64,
    pub failures: u64,
    pub timeouts: u64,
}

enum WorkerCommand {
    Search { job: u64, request: Box<SearchRequest> },
    Shutdown,
}

struct WorkerReply {
    job: u64,
    outcome: Result<SearchResult, EngineError>,
}

struct Worker {
    commands: Sender<WorkerCommand>,
    replies: Receiver<WorkerReply>,
    handle: JoinHandle<()>,
}

pub struct SearchDispatcher {
    provider: Arc<dyn DeviceProvider>,
    timeout: Option<Duration>,
    diagnostics: Option<DiagnosticsLog>,
    worker: Option<Worker>,
    /// Job that timed out and whose kernel may still be running.
    pending: Option<u64>,
    next_job: u64,
    counters: SearchCounters,
}

impl SearchDispatcher {
    /// `timeout` of `None` waits for the kernel indefinitely.
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        timeout: Option<Duration>,
        diagnostics: Option<DiagnosticsLog>,
    ) -> Self {
        Self {
            provider,
            timeout,
            diagnostics,
            worker: None,
            pending: None,
            next_job: 0,
            counters: SearchCounters::default(),
        }
    }

    pub fn counters(&self) -> SearchCounters {
        self.counters
    }

    pub fn search(&mut self, request: &SearchRequest) -> Result<SearchResult, EngineError> {
        match self.run(request) {
            Ok(result) => {
                self.counters.searches += 1;
                self.counters.nodes += result.nodes;
                self.counters.moves += result.moves;
                info!(
                    nodes = result.nodes,
                    moves = result.moves,
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    "search complete"
                );
                if let Some(log) = &self.diagnostics {
                    if let Err(err) = log.append(result.nodes, result.moves, result.elapsed) {
                        warn!(path = %log.path().display(), %err, "diagnostics append failed");
                    }
                }
                Ok(result)
            }
            Err(err) => {
                match err {
                    EngineError::SearchTimedOut(_) => self.counters.timeouts += 1,
                    _ => self.counters.failures += 1,
                }
                warn!(%err, "search failed");
                Err(err)
            }
        }
    }

    /// Stop the worker and wait for it to release the device. A worker still
    /// running a timed-out kernel is detached instead; it releases the device
    /// itself once the kernel returns.
    pub fn shutdown(&mut self) {
        if self.settle_pending().is_err() {
            if let Some(worker) = self.worker.take() {
                let _ = worker.commands.send(WorkerCommand::Shutdown);
                warn!("detaching search worker with a kernel still in flight");
            }
            self.pending = None;
            return;
        }
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.commands.send(WorkerCommand::Shutdown);
        if worker.handle.join().is_err() {
            warn!("search worker panicked");
        }
        debug!("search worker joined");
    }

    fn run(&mut self, request: &SearchRequest) -> Result<SearchResult, EngineError> {
        self.settle_pending()?;

        self.next_job += 1;
        let job = self.next_job;
        let worker = self.worker_mut()?;
        let sent = worker.commands.send(WorkerCommand::Search {
            job,
            request: Box::new(request.clone()),
        });
        if sent.is_err() {
            self.worker = None;
            return Err(EngineError::DispatchFailure("search worker exited".to_owned()));
        }

        match self.await_reply(job) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                self.pending = Some(job);
                Err(EngineError::SearchTimedOut(self.timeout.unwrap_or_default()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.worker = None;
                Err(EngineError::DispatchFailure("search worker exited".to_owned()))
            }
        }
    }

    /// Wait out a timed-out job before anything else touches the device.
    fn settle_pending(&mut self) -> Result<(), EngineError> {
        let Some(stale) = self.pending else {
            return Ok(());
        };
        match self.await_reply(stale) {
            Ok(outcome) => {
                debug!(stale_job = stale, ok = outcome.is_ok(), "late search reply discarded");
                self.pending = None;
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(EngineError::DispatchFailure(
                "previous dispatch still in flight".to_owned(),
            )),
            Err(RecvTimeoutError::Disconnected) => {
                self.worker = None;
                self.pending = None;
                Ok(())
            }
        }
    }

    fn worker_mut(&mut self) -> Result<&mut Worker, EngineError> {
        if self.worker.is_none() {
            self.worker = Some(spawn_worker(Arc::clone(&self.provider))?);
        }
        self.worker
            .as_mut()
            .ok_or_else(|| EngineError::DispatchFailure("search worker unavailable".to_owned()))
    }

    fn await_reply(&self, job: u64) -> Result<Result<SearchResult, EngineError>, RecvTimeoutError> {
        let Some(worker) = self.worker.as_ref() else {
            return Err(RecvTimeoutError::Disconnected);
        };
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let reply = match deadline {
                Some(deadline) => {
                    worker.replies.recv_timeout(deadline.saturating_duration_since(Instant::now()))?
                }
                None => worker.replies.recv().map_err(|_| RecvTimeoutError::Disconnected)?,
            };
            if reply.job == job {
                return Ok(reply.outcome);
            }
            debug!(stale_job = reply.job, "discarding stale search reply");
        }
    }
}

impl Drop for SearchDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(provider: Arc<dyn DeviceProvider>) -> Result<Worker, EngineError> {
    let (command_tx, command_rx) = mpsc::channel::<WorkerCommand>();
    let (reply_tx, reply_rx) = mpsc::channel::<WorkerReply>();

    let handle = thread::Builder::new()
        .name("search-dispatch".to_owned())
        .spawn(move || worker_loop(ComputeBuffers::new(provider), command_rx, reply_tx))
        .map_err(|err| EngineError::DispatchFailure(format!("spawn search worker: {err}")))?;

    Ok(Worker {
        commands: command_tx,
        replies: reply_rx,
        handle,
    })
}

fn worker_loop(mut buffers: ComputeBuffers, commands: Receiver<WorkerCommand>, replies: Sender<WorkerReply>) {
    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::Search { job, request } => {
                let outcome = dispatch(&mut buffers, &request);
                if let Err(EngineError::DispatchFailure(_)) = &outcome {
                    buffers.release();
                }
                if replies.send(WorkerReply { job, outcome }).is_err() {
                    debug!(job, "search abandoned by caller");
                    break;
                }
            }
            WorkerCommand::Shutdown => break,
        }
    }
    buffers.release();
}

fn dispatch(buffers: &mut ComputeBuffers, request: &SearchRequest) -> Result<SearchResult, EngineError> {
    let start = Instant::now();
    buffers.initialize(&request.board, request.limits)?;
    buffers.upload_params(&request.params())?;
    buffers.launch(request.limits.max_cores)?;
    let results = buffers.read_results()?;
    let elapsed = start.elapsed();

    debug!(device = buffers.provider_name(), best_move = ?results.best_move, "kernel results read");
    Ok(SearchResult {
        best_move: results.best_move,
        nodes: results.nodes,
        moves: results.moves,
        elapsed,
    })
}
