use super::{
    worker::{RecoveryWorker, WorkerState},
    RecoveryPackage, StopToken,
};
use crate::error::StageError;
use parking_lot::{Condvar, Mutex};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tracing::{error, trace, warn};

/// State shared between the pool owner and the completion signals of its
/// workers.
#[derive(Debug)]
pub(crate) struct PoolShared {
    state: Mutex<PoolState>,
    completed: Condvar,
    stop: StopToken,
}

#[derive(Debug, Default)]
struct PoolState {
    /// Ids of workers whose batches await harvest, in completion order.
    harvestable: VecDeque<usize>,
    /// The number of dispatched batches not yet completed.
    in_flight: u32,
    /// Latched when any worker reports a failure.
    exception: bool,
}

impl PoolShared {
    /// The stop signal shared by the farm, the pool, and its workers.
    pub(crate) fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Completion signal: the given worker finished its batch and is ready
    /// for harvest.
    pub(crate) fn task_completed(&self, id: usize) {
        let mut state = self.state.lock();
        state.harvestable.push_back(id);
        state.in_flight = state.in_flight.saturating_sub(1);
        self.completed.notify_one();
    }

    /// Termination signal: the given worker stopped. A failed worker latches
    /// the global stop so the whole farm shuts down.
    pub(crate) fn worker_stopped(&self, id: usize, exception: bool) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if exception {
            trace!(target: "sync::stages::senders", id, "recovery worker reported a failure");
            state.exception = true;
            self.stop.stop();
        }
        self.completed.notify_one();
    }
}

/// Provisions recovery workers on demand, up to a hardware-derived ceiling,
/// and tracks the completion of the batches dispatched to them.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    workers: Vec<RecoveryWorker>,
    shared: Arc<PoolShared>,
    max_workers: usize,
}

impl WorkerPool {
    pub(crate) fn new(max_workers: usize, stop: StopToken) -> Self {
        Self {
            workers: Vec::new(),
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState::default()),
                completed: Condvar::new(),
                stop,
            }),
            max_workers: max_workers.max(1),
        }
    }

    /// The number of dispatched batches not yet completed.
    pub(crate) fn in_flight(&self) -> u32 {
        self.shared.state.lock().in_flight
    }

    /// Whether any worker reported a failure.
    pub(crate) fn has_exception(&self) -> bool {
        self.shared.state.lock().exception
    }

    /// Find a worker awaiting a kick.
    pub(crate) fn find_free(&self) -> Option<usize> {
        self.workers.iter().position(|worker| worker.state() == WorkerState::KickWaiting)
    }

    /// Install the staging batch into worker `id` and account it as in
    /// flight.
    ///
    /// Returns `false`, leaving the batch untouched, if the worker was not
    /// awaiting work.
    pub(crate) fn dispatch_to(&self, id: usize, batch: &mut Vec<RecoveryPackage>) -> bool {
        // account the batch before the kick so the completion signal always
        // observes the increment
        self.shared.state.lock().in_flight += 1;
        let dispatched =
            self.workers.get(id).map(|worker| worker.dispatch(batch)).unwrap_or_default();
        if !dispatched {
            let mut state = self.shared.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        dispatched
    }

    /// Move the completed batch out of worker `id`.
    pub(crate) fn harvest(&self, id: usize) -> Option<Vec<RecoveryPackage>> {
        self.workers.get(id)?.harvest()
    }

    /// Pop the oldest harvestable worker id, if any.
    pub(crate) fn pop_harvestable(&self) -> Option<usize> {
        self.shared.state.lock().harvestable.pop_front()
    }

    /// Spawn an additional worker if the ceiling allows.
    ///
    /// Returns the new worker's id, or `None` if the pool is at its ceiling.
    /// A spawn failure permanently caps the ceiling at the current size and
    /// is only fatal when no worker exists at all.
    pub(crate) fn try_spawn(&mut self) -> Result<Option<usize>, StageError> {
        if self.workers.len() >= self.max_workers {
            return Ok(None)
        }

        let id = self.workers.len();
        trace!(target: "sync::stages::senders", id, "spawning recovery worker");
        match RecoveryWorker::spawn(id, self.shared.clone()) {
            Ok(worker) => {
                self.workers.push(worker);
                Ok(Some(id))
            }
            Err(err) => {
                if self.workers.is_empty() {
                    error!(target: "sync::stages::senders", %err, "unable to spawn any recovery worker");
                    return Err(StageError::Unexpected(format!(
                        "unable to spawn any recovery worker: {err}"
                    )))
                }
                warn!(
                    target: "sync::stages::senders",
                    %err,
                    max_workers = self.workers.len(),
                    "recovery worker spawn failed, capping the pool"
                );
                self.max_workers = self.workers.len();
                Ok(None)
            }
        }
    }

    /// Block until any completion signal arrives, up to `timeout`.
    pub(crate) fn wait_completion(&self, timeout: Duration) {
        let mut state = self.shared.state.lock();
        let _ = self.shared.completed.wait_for(&mut state, timeout);
    }

    /// Stop all workers. With `wait` the call blocks until every worker
    /// thread is joined. Idempotent.
    pub(crate) fn stop_all(&mut self, wait: bool) {
        for worker in &mut self.workers {
            trace!(target: "sync::stages::senders", id = worker.id(), "stopping recovery worker");
            worker.stop(wait);
        }
    }
}
