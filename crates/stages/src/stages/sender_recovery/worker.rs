use super::{pool::PoolShared, RecoveryPackage, StopToken};
use parking_lot::{Condvar, Mutex};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::{error, trace};
use weft_primitives::transaction::util;

/// The lifecycle state of a recovery worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum WorkerState {
    /// The worker thread is not up yet.
    #[default]
    Idle,
    /// The worker is ready to accept a batch.
    KickWaiting,
    /// The worker owns a batch and is recovering it.
    Working,
    /// The worker's batch is fully recovered and awaits harvest.
    Completed,
    /// The worker terminated.
    Stopped,
}

#[derive(Debug, Default)]
struct WorkerInner {
    state: WorkerState,
    /// The batch slot. Ownership of its contents moves into the worker on a
    /// kick and back out on harvest.
    slot: Vec<RecoveryPackage>,
    kick: bool,
    stop: bool,
}

#[derive(Debug)]
struct WorkerShared {
    inner: Mutex<WorkerInner>,
    signal: Condvar,
}

/// A long-lived executor owning one OS thread that converts batches of
/// recovery packages into signer addresses.
///
/// The worker either recovers a complete batch or reports a failure; a
/// partially recovered batch is never observable from the outside.
#[derive(Debug)]
pub(crate) struct RecoveryWorker {
    id: usize,
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

impl RecoveryWorker {
    /// Spawn a new worker and block until its thread is up.
    pub(crate) fn spawn(id: usize, pool: Arc<PoolShared>) -> std::io::Result<Self> {
        let shared = Arc::new(WorkerShared {
            inner: Mutex::new(WorkerInner::default()),
            signal: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(format!("recovery.{id}"))
            .spawn(move || run(id, thread_shared, pool))?;

        let mut inner = shared.inner.lock();
        while inner.state == WorkerState::Idle {
            shared.signal.wait(&mut inner);
        }
        drop(inner);

        Ok(Self { id, shared, handle: Some(handle) })
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn state(&self) -> WorkerState {
        self.shared.inner.lock().state
    }

    /// Install a batch into the worker's slot and kick it.
    ///
    /// Returns `false`, leaving the batch untouched, if the worker was not
    /// awaiting work.
    pub(crate) fn dispatch(&self, batch: &mut Vec<RecoveryPackage>) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.state != WorkerState::KickWaiting {
            return false
        }
        inner.slot = std::mem::take(batch);
        inner.kick = true;
        inner.state = WorkerState::Working;
        self.shared.signal.notify_all();
        true
    }

    /// Move the completed batch out of the worker's slot, returning the
    /// worker to the kick-waiting state.
    ///
    /// Returns `None` if the worker has nothing to harvest.
    pub(crate) fn harvest(&self) -> Option<Vec<RecoveryPackage>> {
        let mut inner = self.shared.inner.lock();
        if inner.state != WorkerState::Completed {
            return None
        }
        inner.state = WorkerState::KickWaiting;
        Some(std::mem::take(&mut inner.slot))
    }

    /// Request the worker to finish its current batch and terminate.
    ///
    /// With `wait` the call blocks until the thread is joined. Idempotent.
    pub(crate) fn stop(&mut self, wait: bool) {
        {
            let mut inner = self.shared.inner.lock();
            inner.stop = true;
            self.shared.signal.notify_all();
        }
        if wait {
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for RecoveryWorker {
    fn drop(&mut self) {
        self.stop(true);
    }
}

enum BatchError {
    /// The stop signal latched between packages.
    Cancelled,
    /// The recovery primitive rejected a package.
    Recovery(util::Error),
}

fn run(id: usize, shared: Arc<WorkerShared>, pool: Arc<PoolShared>) {
    {
        let mut inner = shared.inner.lock();
        inner.state = WorkerState::KickWaiting;
        shared.signal.notify_all();
    }
    trace!(target: "sync::stages::senders", id, "recovery worker started");

    loop {
        let mut batch = {
            let mut inner = shared.inner.lock();
            loop {
                if inner.kick {
                    inner.kick = false;
                    break std::mem::take(&mut inner.slot)
                }
                if inner.stop {
                    inner.state = WorkerState::Stopped;
                    drop(inner);
                    trace!(target: "sync::stages::senders", id, "recovery worker stopped");
                    pool.worker_stopped(id, false);
                    return
                }
                shared.signal.wait(&mut inner);
            }
        };

        match recover_batch(&mut batch, pool.stop_token()) {
            Ok(()) => {
                let mut inner = shared.inner.lock();
                inner.slot = batch;
                inner.state = WorkerState::Completed;
                drop(inner);
                pool.task_completed(id);
            }
            Err(err) => {
                let exception = match err {
                    BatchError::Cancelled => false,
                    BatchError::Recovery(err) => {
                        error!(target: "sync::stages::senders", id, %err, "sender recovery failed");
                        true
                    }
                };
                shared.inner.lock().state = WorkerState::Stopped;
                pool.worker_stopped(id, exception);
                return
            }
        }
    }
}

/// Recover the signer address of every package in place.
///
/// The stop signal is honored between packages; a cancelled batch is
/// abandoned as a whole.
fn recover_batch(batch: &mut [RecoveryPackage], stop: &StopToken) -> Result<(), BatchError> {
    for package in batch.iter_mut() {
        if stop.is_stopping() {
            return Err(BatchError::Cancelled)
        }

        let mut sig = [0u8; 65];
        sig[..64].copy_from_slice(&package.signature);
        sig[64] = package.odd_y_parity as u8;
        package.tx_from = util::recover_signer_unchecked(&sig, &package.tx_hash.0)
            .map_err(BatchError::Recovery)?;
    }
    Ok(())
}
