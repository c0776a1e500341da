use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::RequestQueueConfig;
use crate::error::{Error, Result};
use crate::natives::request::{RequestConfig, Transport};

const MAX_LOGGED_BODY_BYTES: usize = 1024;

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<RequestConfig>>>;

/// Bounded fire-and-forget request queue drained by a fixed pool of workers.
///
/// Responses are not returned to the poster; failures and non-200 statuses
/// are logged. [`terminate`](Self::terminate) discards whatever is still
/// queued; [`drain`](Self::drain) sends it first.
pub struct RequestQueue {
    tx: Mutex<Option<mpsc::Sender<RequestConfig>>>,
    terminated: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
}

impl RequestQueue {
    /// Spawn the workers on the current tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, config: &RequestQueueConfig) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::Config(format!("request queue requires a tokio runtime: {e}"))
        })?;

        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel::<RequestConfig>(capacity);
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let terminated = Arc::new(AtomicBool::new(false));

        let workers = (0..config.pool_size.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let transport = Arc::clone(&transport);
                let terminated = Arc::clone(&terminated);
                handle.spawn(run_worker(worker, rx, transport, terminated))
            })
            .collect();

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            terminated,
            workers: Mutex::new(workers),
            capacity,
        })
    }

    /// Enqueue a request. Returns `false` when the queue is full or terminated.
    pub fn post(&self, request: RequestConfig) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        match tx.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(capacity = self.capacity, "request queue full; dropping request");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Requests waiting for a worker.
    pub fn queued(&self) -> usize {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    /// Stop accepting requests and discard queued ones. A request already
    /// being sent completes.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        if self.close() {
            tracing::debug!("request queue terminated");
        }
    }

    /// Whether the queue stopped accepting requests, through `terminate` or `drain`.
    pub fn is_terminated(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Terminate and wait for the workers to exit.
    pub async fn shutdown(&self) {
        self.terminate();
        self.join().await;
    }

    /// Stop accepting requests, then wait until every queued request is sent.
    pub async fn drain(&self) {
        if self.close() {
            tracing::debug!("request queue draining");
        }
        self.join().await;
    }

    fn close(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    async fn join(&self) {
        let workers: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "request queue worker panicked");
            }
        }
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("capacity", &self.capacity)
            .field("queued", &self.queued())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

async fn run_worker(
    worker: usize,
    rx: SharedReceiver,
    transport: Arc<dyn Transport>,
    terminated: Arc<AtomicBool>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(request) = next else {
            break;
        };
        if terminated.load(Ordering::SeqCst) {
            tracing::debug!(worker, url = %request.url, "request queue terminated; discarding request");
            break;
        }

        match transport.send(&request).await {
            Err(e) => {
                tracing::warn!(worker, error = %e, "queue request failed");
            }
            Ok(resp) if resp.status != 200 => {
                tracing::warn!(
                    worker,
                    status = resp.status,
                    body = %truncate(&resp.data, MAX_LOGGED_BODY_BYTES),
                    "queue request status"
                );
            }
            Ok(_) => {}
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
