use crate::Outcome;
use ahash::AHashMap as HashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tracing::{info_span, Instrument};

/// A per-proxy unit of work.
#[async_trait::async_trait]
pub trait Job: Send + Sync + 'static {
    async fn run(&self, id: &str) -> Outcome;
}

/// Runs jobs per proxy.
///
/// At most one job runs for a proxy at a time. A trigger that arrives while
/// a job runs queues one more run; further triggers coalesce into it. Jobs
/// that ask to be retried are triggered again after an exponential backoff
/// that resets once a job completes without asking. A proxy's slot is
/// released once its job completes with nothing queued or pending.
pub struct Scheduler<J> {
    inner: Arc<Inner<J>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Backoff {
    min: Duration,
    max: Duration,
}

struct Inner<J> {
    job: J,
    backoff: Backoff,
    slots: Mutex<HashMap<String, Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    running: bool,
    queued: bool,

    /// The last retry delay, while jobs keep asking to be retried.
    retry: Option<Duration>,
    retry_pending: bool,
}

// === impl Scheduler ===

impl<J: Job> Scheduler<J> {
    pub fn new(job: J, backoff: Backoff) -> Self {
        Self {
            inner: Arc::new(Inner {
                job,
                backoff,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn job(&self) -> &J {
        &self.inner.job
    }

    pub fn trigger(&self, id: &str) {
        self.inner.trigger(id);
    }

    pub fn trigger_all<I>(&self, ids: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for id in ids {
            self.inner.trigger(id.as_ref());
        }
    }
}

impl<J> Clone for Scheduler<J> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<J> std::fmt::Debug for Scheduler<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("backoff", &self.inner.backoff)
            .finish_non_exhaustive()
    }
}

// === impl Inner ===

impl<J: Job> Inner<J> {
    fn trigger(self: &Arc<Self>, id: &str) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(id.to_string()).or_default();
        if slot.running {
            slot.queued = true;
            return;
        }
        slot.running = true;
        drop(slots);

        let inner = self.clone();
        let id = id.to_string();
        let span = info_span!("job", proxy = %id);
        tokio::spawn(inner.drive(id).instrument(span));
    }

    async fn drive(self: Arc<Self>, id: String) {
        loop {
            let outcome = match AssertUnwindSafe(self.job.run(&id)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::error!("Job panicked");
                    Outcome::Failed
                }
            };

            let mut slots = self.slots.lock();
            if outcome == Outcome::Disconnected {
                slots.remove(&id);
                return;
            }
            let Some(slot) = slots.get_mut(&id) else {
                return;
            };

            if outcome.should_retry() {
                let delay = self.backoff.next(slot.retry);
                slot.retry = Some(delay);
                if !slot.retry_pending {
                    slot.retry_pending = true;
                    tracing::debug!(?delay, "Retrying");
                    tokio::spawn(self.clone().retry(id.clone(), delay));
                }
            } else {
                slot.retry = None;
            }

            if !slot.queued {
                if slot.retry_pending {
                    slot.running = false;
                } else {
                    slots.remove(&id);
                }
                return;
            }
            slot.queued = false;
        }
    }

    async fn retry(self: Arc<Self>, id: String, delay: Duration) {
        tokio::time::sleep(delay).await;
        if let Some(slot) = self.slots.lock().get_mut(&id) {
            slot.retry_pending = false;
        }
        self.trigger(&id);
    }
}

// === impl Backoff ===

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    fn next(&self, prev: Option<Duration>) -> Duration {
        match prev {
            None => self.min,
            Some(prev) => prev.saturating_mul(2).clamp(self.min, self.max),
        }
    }
}
