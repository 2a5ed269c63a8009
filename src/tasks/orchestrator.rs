use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    detection::PostInspector,
    domain::{Post, QueueSnapshot, SeenIds, SpamVerdict},
    infrastructure::shutdown::Shutdown,
    platform::{PlatformClient, PlatformError, SessionFactory},
    tasks::{penalizer::Penalizer, queue::WorkQueue, scanner::Scanner, ScanSettings},
};

const WORKER_GRACE: Duration = Duration::from_secs(5);
const QUEUED_HISTORY: usize = 5_000;

pub struct Orchestrator {
    work: Arc<WorkQueue<String>>,
    spam: Arc<WorkQueue<SpamVerdict>>,
    settings: Arc<ScanSettings>,
    shutdown: Shutdown,
    seen: Mutex<SeenIds>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(settings: ScanSettings, shutdown: Shutdown) -> Self {
        Self::with_history(settings, shutdown, QUEUED_HISTORY)
    }

    fn with_history(settings: ScanSettings, shutdown: Shutdown, history: usize) -> Self {
        Self {
            work: Arc::new(WorkQueue::new()),
            spam: Arc::new(WorkQueue::new()),
            settings: Arc::new(settings),
            shutdown,
            seen: Mutex::new(SeenIds::with_capacity(history)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawns `threads` scanners and one penalizer, each on its own session.
    /// Every session is opened before any worker starts, so a login failure
    /// leaves nothing running.
    pub async fn start(
        &self,
        threads: usize,
        sessions: &dyn SessionFactory,
        inspector: Arc<dyn PostInspector>,
    ) -> Result<(), PlatformError> {
        let mut scanner_clients = Vec::with_capacity(threads);
        for _ in 0..threads {
            scanner_clients.push(sessions.open_session().await?);
        }
        let penalizer_client = sessions.open_session().await?;

        let mut handles = Vec::with_capacity(threads + 1);
        for (worker, client) in scanner_clients.into_iter().enumerate() {
            let scanner = Scanner::new(
                worker,
                client,
                inspector.clone(),
                self.work.clone(),
                self.spam.clone(),
                self.settings.clone(),
            );
            handles.push(scanner.spawn(self.shutdown.subscribe()));
        }
        let penalizer = Penalizer::new(penalizer_client, self.spam.clone(), self.settings.clone());
        handles.push(penalizer.spawn(self.shutdown.subscribe()));

        self.workers.lock().extend(handles);
        tracing::info!(target: "orchestrator", scanners = threads, "workers started");
        Ok(())
    }

    pub fn enqueue(&self, post: &Post) -> bool {
        if self.shutdown.is_triggered() {
            return false;
        }
        if !post.is_scannable() {
            tracing::debug!(target: "orchestrator", post = %post.short_url(), "not a scannable image post");
            return false;
        }
        if !self.seen.lock().insert(&post.id) {
            return false;
        }
        tracing::debug!(target: "orchestrator", post = %post.short_url(), "queued");
        self.work.push(post.id.clone());
        true
    }

    pub async fn run_batch(
        &self,
        client: &dyn PlatformClient,
        sources: &[String],
        limit: usize,
    ) -> Result<usize, PlatformError> {
        let posts = client.fetch_new_posts(sources, limit).await?;
        let fetched = posts.len();
        let queued = posts.iter().filter(|post| self.enqueue(post)).count();
        tracing::info!(target: "orchestrator", fetched, queued, "batch enqueued");
        Ok(queued)
    }

    pub async fn run_forever(
        &self,
        client: &dyn PlatformClient,
        sources: &[String],
    ) -> Result<(), PlatformError> {
        let mut listener = self.shutdown.subscribe();
        let mut stream = client.stream_new_posts(sources);
        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = listener.notified() => break,
            };
            match next {
                None => break,
                Some(Ok(post)) => {
                    self.enqueue(&post);
                }
                Some(Err(err @ PlatformError::Auth(_))) => return Err(err),
                Some(Err(err)) if err.is_rate_limited() => {
                    let backoff = err.retry_after().unwrap_or(self.settings.scanner_backoff);
                    tracing::warn!(
                        target: "orchestrator",
                        backoff_secs = backoff.as_secs(),
                        "stream rate limited"
                    );
                    if !listener.sleep(backoff).await {
                        break;
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(target: "orchestrator", error = %err, "stream error; polling again");
                }
            }
        }
        tracing::info!(target: "orchestrator", "stream stopped");
        Ok(())
    }

    /// Resolves once every queued post and every verdict it produced has been
    /// handled, or as soon as shutdown begins.
    pub async fn wait(&self) {
        let mut listener = self.shutdown.subscribe();
        tokio::select! {
            _ = async {
                self.work.wait_drained().await;
                self.spam.wait_drained().await;
            } => {}
            _ = listener.notified() => {}
        }
    }

    pub async fn close(&self) {
        self.shutdown.trigger();
        let mut dropped = self.work.purge() + self.spam.purge();

        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            let abort = handle.abort_handle();
            match tokio::time::timeout(WORKER_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.is_panic() => {
                    tracing::error!(target: "orchestrator", error = %err, "worker panicked");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    tracing::warn!(target: "orchestrator", "worker did not stop in time; aborting");
                    abort.abort();
                }
            }
        }

        // A scanner finishing mid-shutdown may still have pushed a verdict.
        dropped += self.work.purge() + self.spam.purge();
        tracing::info!(target: "orchestrator", dropped, "orchestrator closed");
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            work: self.work.len(),
            spam: self.spam.len(),
        }
    }
}
