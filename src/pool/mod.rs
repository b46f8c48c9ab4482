//! Bounded worker pool with an ordered result sink.
//!
//! The driver iterates the input on the caller thread and submits each item
//! to a fixed-size pool of worker threads through a bounded queue;
//! submission blocks when the queue is full, which is the backpressure
//! mechanism preventing unbounded queuing of native resources. Completions
//! arrive out of order and are re-serialized by a reorder buffer that
//! flushes the longest contiguous prefix of submission indices to a single
//! sink, so output order is independent of thread scheduling.
//!
//! Cancellation is cooperative: the driver polls the progress port every
//! `cancel_check_interval` submissions. A sink that returns
//! [`SinkDirective::Stop`] (paired iteration ran off the end of the
//! secondary stream) also stops submission; in-flight and queued work still
//! finishes. A worker error is fatal: submission stops, queued items are
//! drained without computing, and the error surfaces with its submission
//! index.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{bounded, unbounded};

use crate::report::ProgressPort;

/// Pool sizing and cancellation cadence.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub cancel_check_interval: u64,
}

impl PoolConfig {
    /// Sizes the pool from the machine: `ceil(1.5 x available cores)`
    /// workers behind a queue of ten items per worker.
    pub fn from_available_parallelism() -> Self {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        let workers = ((cores as f64) * 1.5).ceil() as usize;
        PoolConfig::with_workers(workers)
    }

    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        PoolConfig { workers, queue_capacity: 10 * workers, cancel_check_interval: 20 }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig::from_available_parallelism()
    }
}

/// Pool lifecycle, tracked for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Idle,
    Running,
    Cancelling,
    Draining,
    Terminated,
}

/// How a pool run ended, fatal errors aside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOutcome {
    /// The input iterator was exhausted and everything was flushed.
    Completed,
    /// The progress port requested cancellation.
    Cancelled,
    /// The sink requested a stop; submission ended early.
    EarlyEnd,
}

/// Returned by the sink for each in-order completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkDirective {
    Continue,
    /// Stop submitting further work; treated as a normal early end.
    Stop,
}

/// A fatal error from one work item, with its submission index.
#[derive(Debug)]
pub struct WorkerFailure<E> {
    pub index: u64,
    pub error: E,
}

/// Statistics of a finished pool run.
#[derive(Debug, Clone, Copy)]
pub struct PoolRun {
    pub outcome: PoolOutcome,
    pub submitted: u64,
    pub flushed: u64,
}

/// Runs `compute` over `inputs` on a bounded worker pool, delivering results
/// to `sink` strictly in submission order.
pub fn run_ordered<T, R, E, I, F, S, P>(
    config: &PoolConfig,
    inputs: I,
    progress: &P,
    compute: F,
    sink: S,
) -> Result<PoolRun, WorkerFailure<E>>
where
    T: Send,
    R: Send,
    E: Send,
    I: Iterator<Item = T>,
    F: Fn(u64, T) -> Result<R, E> + Sync,
    S: FnMut(u64, R) -> SinkDirective + Send,
    P: ProgressPort + ?Sized,
{
    let workers = config.workers.max(1);
    let interval = config.cancel_check_interval.max(1);

    let (work_tx, work_rx) = bounded::<(u64, T)>(config.queue_capacity.max(1));
    let (result_tx, result_rx) = unbounded::<(u64, Result<R, E>)>();

    // Set by the sink thread on a fatal worker error; workers then drain
    // the queue without computing.
    let abort = AtomicBool::new(false);
    // Set by the sink thread when the sink asks for an early end.
    let stop = AtomicBool::new(false);

    let mut state = PoolState::Idle;
    let mut submitted: u64 = 0;
    let mut cancelled = false;
    let mut flushed: u64 = 0;
    let mut fatal: Option<WorkerFailure<E>> = None;

    log::debug!(
        "worker pool: {:?}, {} worker(s), queue capacity {}",
        state,
        workers,
        config.queue_capacity
    );

    thread::scope(|scope| {
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let compute = &compute;
            let abort = &abort;
            scope.spawn(move || {
                for (index, item) in work_rx.iter() {
                    if abort.load(Ordering::Acquire) {
                        continue;
                    }
                    let result = compute(index, item);
                    if result.is_err() {
                        abort.store(true, Ordering::Release);
                    }
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
        // Only the worker clones keep the channels open: results close when
        // the last worker exits, and submission fails fast instead of
        // blocking forever if every worker died.
        drop(result_tx);
        drop(work_rx);

        let stop_flag = &stop;
        let sink_handle = scope.spawn(move || {
            let mut sink = sink;
            let mut pending: BTreeMap<u64, R> = BTreeMap::new();
            let mut next_flush: u64 = 0;
            let mut flushed: u64 = 0;
            let mut fatal: Option<WorkerFailure<E>> = None;
            let mut stopping = false;

            for (index, result) in result_rx.iter() {
                match result {
                    Ok(value) => {
                        pending.insert(index, value);
                    }
                    Err(error) => {
                        // Keep the failure with the smallest index so the
                        // reported context is deterministic.
                        if fatal.as_ref().map_or(true, |f| index < f.index) {
                            fatal = Some(WorkerFailure { index, error });
                        }
                    }
                }
                if fatal.is_some() {
                    continue;
                }
                while let Some(value) = pending.remove(&next_flush) {
                    if !stopping {
                        flushed += 1;
                        if sink(next_flush, value) == SinkDirective::Stop {
                            stopping = true;
                            stop_flag.store(true, Ordering::Release);
                        }
                    }
                    next_flush += 1;
                }
            }
            (flushed, fatal)
        });

        // Driver: submit on the caller thread so a full queue blocks the
        // producer, not a worker.
        state = PoolState::Running;
        let mut inputs = inputs;
        loop {
            if abort.load(Ordering::Acquire) || stop.load(Ordering::Acquire) {
                state = PoolState::Cancelling;
                break;
            }
            if submitted > 0 && submitted % interval == 0 && progress.is_cancelled() {
                cancelled = true;
                state = PoolState::Cancelling;
                break;
            }
            let Some(item) = inputs.next() else {
                state = PoolState::Draining;
                break;
            };
            if work_tx.send((submitted, item)).is_err() {
                break;
            }
            submitted += 1;
        }
        log::debug!("worker pool: submission ended in state {:?}", state);
        drop(work_tx);

        let (sink_flushed, sink_fatal) =
            sink_handle.join().expect("ordered result sink thread panicked");
        flushed = sink_flushed;
        fatal = sink_fatal;
    });

    state = PoolState::Terminated;
    log::debug!("worker pool: {:?}, {} submitted, {} flushed", state, submitted, flushed);

    if let Some(failure) = fatal {
        return Err(failure);
    }

    let outcome = if cancelled {
        PoolOutcome::Cancelled
    } else if stop.load(Ordering::Acquire) {
        PoolOutcome::EarlyEnd
    } else {
        PoolOutcome::Completed
    };

    Ok(PoolRun { outcome, submitted, flushed })
}
