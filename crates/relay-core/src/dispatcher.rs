//! Routing of events to their topic workers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use relay_protocol::Event;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionPolicy;
use crate::contracts::{SharedNotifier, SharedSessionClient};
use crate::error::DispatchError;
use crate::worker::TopicWorker;

struct WorkerHandle {
    queue: mpsc::UnboundedSender<Event>,
    task: JoinHandle<()>,
}

struct Inner {
    // None once shut down
    workers: Mutex<Option<HashMap<String, WorkerHandle>>>,
    policy: SessionPolicy,
    client: SharedSessionClient,
    notifier: SharedNotifier,
}

/// Keeps one live [`TopicWorker`] per topic and feeds it that topic's events.
///
/// Cheap to clone; clones share the same workers.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(policy: SessionPolicy, client: SharedSessionClient, notifier: SharedNotifier) -> Self {
        Self {
            inner: Arc::new(Inner {
                workers: Mutex::new(Some(HashMap::new())),
                policy,
                client,
                notifier,
            }),
        }
    }

    /// Enqueue `event` on its topic's worker, spawning the worker on first
    /// sight of the topic. Never waits for the worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn route(&self, event: Event) -> Result<(), DispatchError> {
        let mut guard = self.inner.workers.lock();
        let workers = guard.as_mut().ok_or(DispatchError::Closed)?;

        let event = match workers.get(&event.topic) {
            Some(handle) => match handle.queue.send(event) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(event)) => {
                    warn!(topic = %event.topic, "topic worker died, starting a new one");
                    event
                }
            },
            None => event,
        };

        let topic = event.topic.clone();
        let handle = self.spawn_worker(&topic);
        // the receiver was just created, so this cannot fail
        let _ = handle.queue.send(event);
        workers.insert(topic, handle);
        Ok(())
    }

    fn spawn_worker(&self, topic: &str) -> WorkerHandle {
        debug!(topic, "spawning topic worker");
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = TopicWorker::new(
            topic,
            self.inner.policy,
            self.inner.client.clone(),
            self.inner.notifier.clone(),
        );
        WorkerHandle {
            queue: tx,
            task: tokio::spawn(worker.run(rx)),
        }
    }

    /// Known topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let guard = self.inner.workers.lock();
        let mut topics: Vec<String> = guard
            .as_ref()
            .map(|w| w.keys().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    pub fn worker_count(&self) -> usize {
        self.inner
            .workers
            .lock()
            .as_ref()
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Stop accepting events and wait for every worker to finish its queue.
    ///
    /// Remote calls already in flight run to completion.
    pub async fn shutdown(&self) {
        let taken = self.inner.workers.lock().take();
        let Some(workers) = taken else {
            return;
        };
        info!(workers = workers.len(), "draining topic workers");
        for (topic, handle) in workers {
            drop(handle.queue);
            if let Err(err) = handle.task.await {
                warn!(%topic, "topic worker ended abnormally: {err}");
            }
        }
    }
}
