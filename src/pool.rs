//! Bounded pool of scanning threads.
//!
//! Scanning a large buffer can be moved off the caller's thread. A
//! [`PooledScanner`] owns one buffer; the first request moves the buffer to a
//! worker taken from the [`ScanPool`], later requests go to the same worker
//! while it holds the buffer. A worker that sees no request for
//! [`PoolConfig::idle_grace`] hands the buffer back and returns to the pool.
//!
//! ```text
//! PooledScanner ──Assignment(buffer)──▶ worker thread
//!       │  ──Request{id, task}──▶            │
//!       │  ◀──Response{id, outcome}──        │
//!       ◀──────── buffer (idle grace) ───────┘ ──▶ back to idle list
//! ```
//!
//! Requests are synchronous: a scanner never has more than one request in
//! flight, so two workers can never hold the same logical buffer.
//!
//! ```ignore
//! use pdf_delta::pool::{PooledScanner, ScanPool};
//!
//! let pool = ScanPool::new(Default::default());
//! let mut scanner = PooledScanner::new(pool.clone(), data);
//! let chain = scanner.parse_xref_chain(&ParserOptions::default())?;
//! ```

use crate::error::{Error, Result};
use crate::parser_config::ParserOptions;
use crate::scanner::{ByteScanner, ParserBounds, SearchOptions};
use crate::xref::XRefChain;
use bytes::Bytes;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

/// Pool sizing and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on worker threads
    pub max_workers: usize,
    /// How long a worker keeps a buffer with no pending request
    pub idle_grace: Duration,
    /// How long acquiring a worker may wait before failing
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            idle_grace: Duration::from_millis(250),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Work a pooled worker can run against its buffer.
#[derive(Debug, Clone)]
pub enum ScanTask {
    /// [`ByteScanner::find_subarray_index`]
    FindSubarray {
        /// Byte sequence to look for
        needle: Vec<u8>,
        /// Direction, range and delimiter rules
        options: SearchOptions,
    },
    /// [`ByteScanner::get_dict_bounds_at`]
    DictBounds {
        /// Search start
        start: usize,
        /// Skip leading whitespace and comments
        skip_empty: bool,
    },
    /// [`ByteScanner::get_array_bounds_at`]
    ArrayBounds {
        /// Search start
        start: usize,
        /// Skip leading whitespace and comments
        skip_empty: bool,
    },
    /// [`ByteScanner::get_literal_bounds_at`]
    LiteralBounds {
        /// Search start
        start: usize,
        /// Skip leading whitespace and comments
        skip_empty: bool,
    },
    /// [`ByteScanner::get_indirect_object_bounds_at`]
    IndirectObjectBounds {
        /// Search start
        start: usize,
        /// Skip leading whitespace and comments
        skip_empty: bool,
    },
    /// [`XRefChain::parse`]
    ParseXRefChain {
        /// Parser limits and strictness
        options: ParserOptions,
    },
}

/// Result of a [`ScanTask`].
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// Bounds lookups; `None` when the construct was not found
    Bounds(Option<ParserBounds>),
    /// A walked cross-reference chain
    XRefChain(Box<XRefChain>),
}

fn run_task(data: &Bytes, task: &ScanTask) -> Result<ScanOutcome> {
    let scanner = ByteScanner::new(data);
    let outcome = match task {
        ScanTask::FindSubarray { needle, options } => {
            ScanOutcome::Bounds(scanner.find_subarray_index(needle, *options))
        },
        ScanTask::DictBounds { start, skip_empty } => {
            ScanOutcome::Bounds(scanner.get_dict_bounds_at(*start, *skip_empty))
        },
        ScanTask::ArrayBounds { start, skip_empty } => {
            ScanOutcome::Bounds(scanner.get_array_bounds_at(*start, *skip_empty))
        },
        ScanTask::LiteralBounds { start, skip_empty } => {
            ScanOutcome::Bounds(scanner.get_literal_bounds_at(*start, *skip_empty))
        },
        ScanTask::IndirectObjectBounds { start, skip_empty } => {
            ScanOutcome::Bounds(scanner.get_indirect_object_bounds_at(*start, *skip_empty))
        },
        ScanTask::ParseXRefChain { options } => ScanOutcome::XRefChain(Box::new(XRefChain::parse(data, options)?)),
    };
    Ok(outcome)
}

struct Request {
    id: u64,
    task: ScanTask,
    reply: Sender<Response>,
}

struct Response {
    request_id: u64,
    outcome: Result<ScanOutcome>,
}

/// Hands a buffer to an idle worker for one lease.
struct Assignment {
    data: Bytes,
    requests: Receiver<Request>,
    release: Sender<Bytes>,
}

/// The scanner's side of a lease.
struct Lease {
    worker: usize,
    requests: Sender<Request>,
    release: Receiver<Bytes>,
}

#[derive(Default)]
struct PoolState {
    workers: Vec<Sender<Assignment>>,
    idle: Vec<usize>,
}

struct Shared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl Shared {
    fn release(&self, worker: usize) {
        match self.state.lock() {
            Ok(mut state) => {
                state.idle.push(worker);
                self.available.notify_one();
            },
            Err(_) => log::error!("scan pool state poisoned, worker {} lost", worker),
        }
    }
}

fn worker_main(index: usize, control: Receiver<Assignment>, shared: Weak<Shared>, idle_grace: Duration) {
    while let Ok(assignment) = control.recv() {
        let Assignment { data, requests, release } = assignment;
        loop {
            match requests.recv_timeout(idle_grace) {
                Ok(request) => {
                    let outcome = run_task(&data, &request.task);
                    let _ = request.reply.send(Response {
                        request_id: request.id,
                        outcome,
                    });
                },
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        // The buffer goes back before the request channel closes, so a
        // scanner that raced the timeout always finds it on `release`.
        let _ = release.send(data);
        drop(requests);
        log::debug!("scan worker {} idle", index);
        match shared.upgrade() {
            Some(shared) => shared.release(index),
            None => break,
        }
    }
}

/// Bounded set of scanning threads, cheap to clone.
#[derive(Clone)]
pub struct ScanPool {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ScanPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanPool")
            .field("config", &self.shared.config)
            .field("workers", &self.worker_count())
            .field("idle", &self.idle_count())
            .finish()
    }
}

impl ScanPool {
    /// Create an empty pool; threads are spawned on demand.
    pub fn new(config: PoolConfig) -> Self {
        let config = PoolConfig {
            max_workers: config.max_workers.max(1),
            ..config
        };
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(PoolState::default()),
                available: Condvar::new(),
            }),
        }
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Threads spawned so far.
    pub fn worker_count(&self) -> usize {
        self.shared.state.lock().map_or(0, |s| s.workers.len())
    }

    /// Threads waiting for an assignment.
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().map_or(0, |s| s.idle.len())
    }

    fn poisoned() -> Error {
        Error::Worker("scan pool state poisoned".to_string())
    }

    /// Take an idle worker, spawning one while below the bound, or wait
    /// until `acquire_timeout` runs out.
    fn acquire(&self) -> Result<(usize, Sender<Assignment>)> {
        let config = self.shared.config;
        let deadline = Instant::now() + config.acquire_timeout;
        let mut state = self.shared.state.lock().map_err(|_| Self::poisoned())?;
        loop {
            if let Some(index) = state.idle.pop() {
                return Ok((index, state.workers[index].clone()));
            }
            if state.workers.len() < config.max_workers {
                let index = state.workers.len();
                let (control_tx, control_rx) = mpsc::channel();
                let weak = Arc::downgrade(&self.shared);
                std::thread::Builder::new()
                    .name(format!("pdf-scan-{}", index))
                    .spawn(move || worker_main(index, control_rx, weak, config.idle_grace))?;
                log::debug!("spawned scan worker {}", index);
                state.workers.push(control_tx.clone());
                return Ok((index, control_tx));
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!("scan pool saturated ({} workers)", config.max_workers);
                return Err(Error::PoolTimeout(config.acquire_timeout));
            }
            let (guard, _) = self
                .shared
                .available
                .wait_timeout(state, deadline - now)
                .map_err(|_| Self::poisoned())?;
            state = guard;
        }
    }
}

/// One logical buffer scanned on the pool.
pub struct PooledScanner {
    pool: ScanPool,
    buffer: Option<Bytes>,
    lease: Option<Lease>,
    next_request_id: u64,
}

impl std::fmt::Debug for PooledScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledScanner")
            .field("holds_buffer", &self.buffer.is_some())
            .field("worker", &self.lease.as_ref().map(|l| l.worker))
            .field("next_request_id", &self.next_request_id)
            .finish_non_exhaustive()
    }
}

impl PooledScanner {
    /// Wrap `data` for scanning on `pool`.
    pub fn new(pool: ScanPool, data: Bytes) -> Self {
        Self {
            pool,
            buffer: Some(data),
            lease: None,
            next_request_id: 0,
        }
    }

    /// Whether the buffer is back with this scanner rather than a worker.
    pub fn holds_buffer(&mut self) -> bool {
        self.poll_release();
        self.buffer.is_some()
    }

    /// Worker currently holding the buffer.
    pub fn worker(&mut self) -> Option<usize> {
        self.poll_release();
        self.lease.as_ref().map(|l| l.worker)
    }

    /// Collect the buffer if the worker gave it back on its own.
    fn poll_release(&mut self) {
        let Some(lease) = &self.lease else { return };
        match lease.release.try_recv() {
            Ok(data) => {
                self.buffer = Some(data);
                self.lease = None;
            },
            Err(TryRecvError::Empty) => {},
            Err(TryRecvError::Disconnected) => {
                log::error!("scan worker {} exited holding the buffer", lease.worker);
                self.lease = None;
            },
        }
    }

    fn reclaim(&mut self, lease: Lease) -> Result<()> {
        let data = lease
            .release
            .recv()
            .map_err(|_| Error::Worker(format!("worker {} exited without returning the buffer", lease.worker)))?;
        self.buffer = Some(data);
        Ok(())
    }

    fn lease(&mut self) -> Result<Lease> {
        self.poll_release();
        if let Some(lease) = self.lease.take() {
            return Ok(lease);
        }
        let (worker, control) = self.pool.acquire()?;
        let data = match self.buffer.take() {
            Some(data) => data,
            None => {
                self.pool.shared.release(worker);
                return Err(Error::Worker("buffer lost by an earlier worker".to_string()));
            },
        };
        let (requests_tx, requests_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let assignment = Assignment {
            data,
            requests: requests_rx,
            release: release_tx,
        };
        if let Err(mpsc::SendError(assignment)) = control.send(assignment) {
            self.buffer = Some(assignment.data);
            return Err(Error::Worker(format!("worker {} is gone", worker)));
        }
        Ok(Lease {
            worker,
            requests: requests_tx,
            release: release_rx,
        })
    }

    /// Run `task` on a worker and wait for its outcome.
    ///
    /// A worker that released the buffer while the request was queued
    /// causes one retry on a fresh worker.
    pub fn run(&mut self, task: ScanTask) -> Result<ScanOutcome> {
        for _ in 0..2 {
            let lease = self.lease()?;
            self.next_request_id += 1;
            let id = self.next_request_id;
            let (reply_tx, reply_rx) = mpsc::channel();
            let request = Request {
                id,
                task: task.clone(),
                reply: reply_tx,
            };
            if lease.requests.send(request).is_err() {
                self.reclaim(lease)?;
                continue;
            }
            match reply_rx.recv() {
                Ok(response) if response.request_id == id => {
                    self.lease = Some(lease);
                    return response.outcome;
                },
                Ok(response) => {
                    return Err(Error::Worker(format!(
                        "response {} does not answer request {}",
                        response.request_id, id
                    )));
                },
                Err(_) => {
                    log::debug!("request {} dropped by idle worker {}, retrying", id, lease.worker);
                    self.reclaim(lease)?;
                },
            }
        }
        Err(Error::Worker("no worker accepted the request".to_string()))
    }

    fn bounds(&mut self, task: ScanTask) -> Result<Option<ParserBounds>> {
        match self.run(task)? {
            ScanOutcome::Bounds(bounds) => Ok(bounds),
            other => Err(Error::Worker(format!("unexpected outcome {:?}", other))),
        }
    }

    /// Pooled [`ByteScanner::find_subarray_index`].
    pub fn find_subarray_index(&mut self, needle: &[u8], options: SearchOptions) -> Result<Option<ParserBounds>> {
        self.bounds(ScanTask::FindSubarray {
            needle: needle.to_vec(),
            options,
        })
    }

    /// Pooled [`ByteScanner::get_dict_bounds_at`].
    pub fn get_dict_bounds_at(&mut self, start: usize, skip_empty: bool) -> Result<Option<ParserBounds>> {
        self.bounds(ScanTask::DictBounds { start, skip_empty })
    }

    /// Pooled [`ByteScanner::get_array_bounds_at`].
    pub fn get_array_bounds_at(&mut self, start: usize, skip_empty: bool) -> Result<Option<ParserBounds>> {
        self.bounds(ScanTask::ArrayBounds { start, skip_empty })
    }

    /// Pooled [`ByteScanner::get_literal_bounds_at`].
    pub fn get_literal_bounds_at(&mut self, start: usize, skip_empty: bool) -> Result<Option<ParserBounds>> {
        self.bounds(ScanTask::LiteralBounds { start, skip_empty })
    }

    /// Pooled [`ByteScanner::get_indirect_object_bounds_at`].
    pub fn get_indirect_object_bounds_at(&mut self, start: usize, skip_empty: bool) -> Result<Option<ParserBounds>> {
        self.bounds(ScanTask::IndirectObjectBounds { start, skip_empty })
    }

    /// Pooled [`XRefChain::parse`].
    pub fn parse_xref_chain(&mut self, options: &ParserOptions) -> Result<XRefChain> {
        match self.run(ScanTask::ParseXRefChain { options: *options })? {
            ScanOutcome::XRefChain(chain) => Ok(*chain),
            other => Err(Error::Worker(format!("unexpected outcome {:?}", other))),
        }
    }

    /// Take the buffer back, ending any lease.
    pub fn into_buffer(mut self) -> Result<Bytes> {
        self.poll_release();
        if let Some(lease) = self.lease.take() {
            let Lease { worker, requests, release } = lease;
            drop(requests);
            let data = release
                .recv()
                .map_err(|_| Error::Worker(format!("worker {} exited without returning the buffer", worker)))?;
            self.buffer = Some(data);
        }
        self.buffer
            .take()
            .ok_or_else(|| Error::Worker("buffer lost by an earlier worker".to_string()))
    }
}
