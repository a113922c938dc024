use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::StreamKind;

use super::{IngestWorker, RecordSource};

/// Fixed set of workers consuming one stream
pub struct WorkerPool {
    stream: StreamKind,
    shutdown: watch::Sender<bool>,
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Spawns every worker onto the runtime
    pub fn spawn<S>(stream: StreamKind, workers: Vec<IngestWorker<S>>) -> Self
    where
        S: RecordSource + 'static,
    {
        let (shutdown, signal) = watch::channel(false);
        let mut set = JoinSet::new();

        for worker in workers {
            set.spawn(worker.run(signal.clone()));
        }

        tracing::info!(stream = %stream, workers = set.len(), "Worker pool started");

        Self {
            stream,
            shutdown,
            workers: set,
        }
    }

    /// Signals every worker and waits for in-flight batches to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.wait().await;
    }

    /// Waits for every worker to stop on its own, e.g. once its source closes
    pub async fn wait(mut self) {
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(stream = %self.stream, error = %e, "Ingestion worker panicked");
            }
        }

        tracing::info!(stream = %self.stream, "Worker pool stopped");
    }
}
