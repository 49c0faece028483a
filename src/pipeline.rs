//! Background learning pipeline.
//!
//! Producers call the three `ingest_*` methods, which enqueue a task and
//! return immediately. A pool of worker tasks drains the queue: each task
//! is parsed, classified, turned into records, and upserted into the
//! [`PatternStore`].
//!
//! # Failure isolation
//!
//! Every task runs in its own spawned tokio task. An error or a panic ends
//! that task only; it is logged at `warn` and counted in [`failed`], and
//! the worker moves on to the next queued task.
//!
//! # Lifecycle
//!
//! [`LearningPipeline::spawn`] must be called inside a tokio runtime.
//! [`shutdown`] closes the queue and waits until every queued task has
//! been processed.
//!
//! [`failed`]: LearningPipeline::failed
//! [`shutdown`]: LearningPipeline::shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use usage_learn_core::classifier::Classifier;
use usage_learn_core::learning::{
    generation_records, observation_record, replacement_records, Generation, Observation,
    Replacement,
};
use usage_learn_core::store::PatternStore;

use crate::config::PipelineConfig;
use crate::model_registry::OFFLINE_MODEL_NAME;

/// Who consumes the generated output an ingestion event describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumer {
    /// A remote model produced the output.
    RemoteModel(String),
    /// This engine produced the output; learning from it would reinforce
    /// unverified results, so such events are dropped.
    OfflineEngine,
}

impl Consumer {
    pub fn from_model_name(name: &str) -> Self {
        if name == OFFLINE_MODEL_NAME {
            Consumer::OfflineEngine
        } else {
            Consumer::RemoteModel(name.to_string())
        }
    }
}

/// One unit of queued work.
#[derive(Debug)]
enum Task {
    Generation(Generation),
    Replacement(Replacement),
    Observation(Observation),
}

impl Task {
    fn kind(&self) -> &'static str {
        match self {
            Task::Generation(_) => "generation",
            Task::Replacement(_) => "replacement",
            Task::Observation(_) => "observation",
        }
    }
}

enum TaskSender {
    Bounded(mpsc::Sender<Task>),
    Unbounded(mpsc::UnboundedSender<Task>),
}

enum TaskReceiver {
    Bounded(mpsc::Receiver<Task>),
    Unbounded(mpsc::UnboundedReceiver<Task>),
}

impl TaskReceiver {
    async fn recv(&mut self) -> Option<Task> {
        match self {
            TaskReceiver::Bounded(rx) => rx.recv().await,
            TaskReceiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    records_written: AtomicU64,
}

pub struct LearningPipeline {
    sender: StdMutex<Option<TaskSender>>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl LearningPipeline {
    /// Start `config.workers` workers draining one shared queue.
    ///
    /// With `config.enabled == false` no workers start and every ingest
    /// call is a no-op.
    pub fn spawn(
        store: Arc<dyn PatternStore>,
        classifier: Classifier,
        config: &PipelineConfig,
    ) -> Self {
        let counters = Arc::new(Counters::default());

        if !config.enabled {
            debug!("Learning pipeline disabled");
            return Self {
                sender: StdMutex::new(None),
                workers: StdMutex::new(Vec::new()),
                counters,
            };
        }

        let (sender, receiver) = match config.queue_capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity);
                (TaskSender::Bounded(tx), TaskReceiver::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (TaskSender::Unbounded(tx), TaskReceiver::Unbounded(rx))
            }
        };
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&receiver),
                    Arc::clone(&store),
                    classifier.clone(),
                    Arc::clone(&counters),
                ))
            })
            .collect();

        debug!(
            workers = config.workers,
            capacity = ?config.queue_capacity,
            "Learning pipeline started"
        );

        Self {
            sender: StdMutex::new(Some(sender)),
            workers: StdMutex::new(workers),
            counters,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Learn from a completed generation.
    pub fn ingest_complete_generation(&self, consumer: &Consumer, event: Generation) -> bool {
        self.enqueue(consumer, Task::Generation(event))
    }

    /// Learn from code that replaced an earlier version for a reason.
    pub fn ingest_reasoned_replacement(&self, consumer: &Consumer, event: Replacement) -> bool {
        self.enqueue(consumer, Task::Replacement(event))
    }

    /// Learn from a raw object/property observation.
    pub fn ingest_object_observation(&self, consumer: &Consumer, event: Observation) -> bool {
        self.enqueue(consumer, Task::Observation(event))
    }

    /// Queue a task without blocking. Returns whether it was accepted.
    fn enqueue(&self, consumer: &Consumer, task: Task) -> bool {
        if *consumer == Consumer::OfflineEngine {
            debug!(task = task.kind(), "Skipping event produced by the offline engine");
            return false;
        }

        let Ok(guard) = self.sender.lock() else {
            return false;
        };
        let Some(sender) = guard.as_ref() else {
            return false;
        };

        let kind = task.kind();
        let accepted = match sender {
            TaskSender::Unbounded(tx) => tx.send(task).is_ok(),
            TaskSender::Bounded(tx) => match tx.try_send(task) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(task = kind, "Learning queue full; dropping task");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
        };

        if accepted {
            self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    /// Close the queue and wait for every queued task to finish.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Learning worker exited abnormally");
            }
        }
    }

    pub fn enqueued(&self) -> u64 {
        self.counters.enqueued.load(Ordering::Relaxed)
    }

    /// Tasks rejected because the queue was full or already closed.
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.counters.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    pub fn records_written(&self) -> u64 {
        self.counters.records_written.load(Ordering::Relaxed)
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<TaskReceiver>>,
    store: Arc<dyn PatternStore>,
    classifier: Classifier,
    counters: Arc<Counters>,
) {
    loop {
        let task = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let Some(task) = task else {
            break;
        };

        let kind = task.kind();
        let outcome = tokio::spawn(process_task(
            Arc::clone(&store),
            classifier.clone(),
            task,
        ))
        .await;

        match outcome {
            Ok(Ok(written)) => {
                counters.processed.fetch_add(1, Ordering::Relaxed);
                counters
                    .records_written
                    .fetch_add(written as u64, Ordering::Relaxed);
                debug!(worker = worker_id, task = kind, records = written, "Learned");
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker = worker_id, task = kind, error = %format!("{:#}", e), "Learning task failed");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker = worker_id, task = kind, error = %e, "Learning task panicked");
            }
        }
    }
    debug!(worker = worker_id, "Learning worker stopped");
}

/// Build the task's records and upsert them in order.
///
/// The first failed write abandons the rest of this task.
async fn process_task(
    store: Arc<dyn PatternStore>,
    classifier: Classifier,
    task: Task,
) -> Result<usize> {
    let records = match &task {
        Task::Generation(event) => generation_records(event, &classifier),
        Task::Replacement(event) => replacement_records(event),
        Task::Observation(event) => vec![observation_record(event)],
    };

    for record in &records {
        store
            .upsert(record)
            .await
            .with_context(|| format!("Failed to store {} record from {}", record.kind, task.kind()))?;
    }
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_sentinel_maps_to_offline_engine() {
        assert_eq!(
            Consumer::from_model_name(OFFLINE_MODEL_NAME),
            Consumer::OfflineEngine
        );
        assert_eq!(
            Consumer::from_model_name("gpt"),
            Consumer::RemoteModel("gpt".to_string())
        );
    }
}
