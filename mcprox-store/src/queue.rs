//! `AsyncQueue` — serializes mutating store operations through a single
//! worker (spec §4.2).
//!
//! Rationale (spec §4.2/§9): funnelling every mutation through one worker
//! eliminates the deadlock risk of a process-level read-then-write lock
//! re-entering the store's own write lock. Readers bypass the queue entirely
//! and go straight to `Store`.

use std::time::Duration;

use mcprox_core::model::UpstreamRecord;
use mcprox_core::{Error, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::containers;
use crate::store::Store;

/// One of the four mutating operations the queue accepts (spec §4.2).
#[derive(Debug)]
pub enum OperationPayload {
    EnableServer { name: String, enabled: bool },
    QuarantineServer { name: String, quarantined: bool },
    SaveServer { record: Box<UpstreamRecord> },
    DeleteServer { name: String },
}

impl OperationPayload {
    fn tag(&self) -> &'static str {
        match self {
            Self::EnableServer { .. } => "enable-server",
            Self::QuarantineServer { .. } => "quarantine-server",
            Self::SaveServer { .. } => "save-server",
            Self::DeleteServer { .. } => "delete-server",
        }
    }
}

struct Operation {
    payload: OperationPayload,
    reply: Option<oneshot::Sender<Result<()>>>,
}

/// Handle used by callers to submit operations; cheap to clone.
#[derive(Clone)]
pub struct AsyncQueue {
    sender: mpsc::Sender<Operation>,
}

/// Owns the worker task and lets callers request an orderly shutdown.
pub struct AsyncQueueHandle {
    queue: AsyncQueue,
    worker: tokio::task::JoinHandle<()>,
    shutdown: mpsc::Sender<()>,
}

impl AsyncQueue {
    /// `Start`: spawns the single worker and returns a cloneable handle plus
    /// the join/shutdown controller. Capacity defaults to 100 per spec §4.2.
    pub fn start(store: Store, capacity: usize) -> AsyncQueueHandle {
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let worker = tokio::spawn(worker_loop(store, rx, shutdown_rx));
        AsyncQueueHandle {
            queue: AsyncQueue { sender: tx },
            worker,
            shutdown: shutdown_tx,
        }
    }

    /// Fire-and-forget enqueue. Drops the operation with a warning log if the
    /// channel is full, per spec §4.2/§5 backpressure policy.
    pub fn enqueue(&self, payload: OperationPayload) {
        let tag = payload.tag();
        let op = Operation {
            payload,
            reply: None,
        };
        if let Err(mpsc::error::TrySendError::Full(_)) = self.sender.try_send(op) {
            warn!(operation = tag, "async queue full, dropping fire-and-forget operation");
        } else if self.sender.is_closed() {
            warn!(operation = tag, "async queue closed, dropping operation");
        }
    }

    /// Synchronous variant: waits up to `timeout` for the worker to apply the
    /// operation. Returns `QueueFull` immediately if the channel is full at
    /// submission, `Timeout` if the worker does not answer in time.
    pub async fn submit_sync(&self, payload: OperationPayload, timeout: Duration) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let op = Operation {
            payload,
            reply: Some(reply_tx),
        };
        if let Err(mpsc::error::TrySendError::Full(_)) = self.sender.try_send(op) {
            return Err(Error::QueueFull);
        }
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::internal("async queue worker dropped the reply channel")),
            Err(_) => Err(Error::Timeout { waited: timeout }),
        }
    }
}

impl AsyncQueueHandle {
    pub fn queue(&self) -> AsyncQueue {
        self.queue.clone()
    }

    /// `Stop`: cancels the worker's context; the worker drains whatever is
    /// already queued before exiting (spec §4.2).
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(()).await;
        self.worker
            .await
            .map_err(|e| Error::internal(format!("async queue worker panicked: {e}")))
    }
}

async fn worker_loop(
    store: Store,
    mut rx: mpsc::Receiver<Operation>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                debug!("async queue worker received stop signal, draining remaining operations");
                drain_remaining(&store, &mut rx);
                return;
            }
            maybe_op = rx.recv() => {
                match maybe_op {
                    Some(op) => apply(&store, op),
                    None => return,
                }
            }
        }
    }
}

fn drain_remaining(store: &Store, rx: &mut mpsc::Receiver<Operation>) {
    while let Ok(op) = rx.try_recv() {
        apply(store, op);
    }
}

fn apply(store: &Store, op: Operation) {
    let result = apply_payload(store, &op.payload);
    if let Err(ref e) = result {
        warn!(operation = op.payload.tag(), error = %e, "async queue operation failed");
    }
    if let Some(reply) = op.reply {
        let _ = reply.send(result);
    }
}

fn apply_payload(store: &Store, payload: &OperationPayload) -> Result<()> {
    match payload {
        OperationPayload::EnableServer { name, enabled } => {
            mutate_server(store, name, |record| record.enabled = *enabled)
        }
        OperationPayload::QuarantineServer { name, quarantined } => {
            mutate_server(store, name, |record| record.quarantined = *quarantined)
        }
        OperationPayload::SaveServer { record } => {
            let mut record = (**record).clone();
            record.updated = chrono::Utc::now();
            store.put(containers::UPSTREAMS, &record.name, &record)
        }
        OperationPayload::DeleteServer { name } => store.delete(containers::UPSTREAMS, name),
    }
}

fn mutate_server(
    store: &Store,
    name: &str,
    mutate: impl FnOnce(&mut UpstreamRecord),
) -> Result<()> {
    let mut record: UpstreamRecord = store
        .get(containers::UPSTREAMS, name)?
        .ok_or_else(|| Error::not_found(format!("upstream server `{name}`")))?;
    mutate(&mut record);
    record.updated = chrono::Utc::now();
    store.put(containers::UPSTREAMS, name, &record)
}
