//! Per-job deadline slots.
//!
//! Each job owns at most one armed deadline. Arming again replaces the slot and
//! the replaced timer can no longer fire: every arm gets a fresh token and a
//! timer only runs its callback if it can remove the slot carrying its own
//! token. Aborting the sleeping task is an optimization on top of that check.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::debug;

use super::domain::JobId;

/// Which deadline a slot represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineKind {
    DecisionWindow,
    PrintingEstimate,
    PickupWindow,
}

impl DeadlineKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::DecisionWindow => "decision_window",
            Self::PrintingEstimate => "printing_estimate",
            Self::PickupWindow => "pickup_window",
        }
    }
}

impl fmt::Display for DeadlineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Context handed to a callback when its deadline elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredDeadline {
    pub job_id: JobId,
    pub kind: DeadlineKind,
    pub token: u64,
}

/// Receipt for an `arm` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedDeadline {
    pub kind: DeadlineKind,
    pub token: u64,
    /// Kind of the deadline this arm displaced, if one was still pending.
    pub replaced: Option<DeadlineKind>,
}

struct Slot {
    kind: DeadlineKind,
    token: u64,
    task: Option<AbortHandle>,
}

impl Slot {
    fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

struct SchedulerInner {
    runtime: Handle,
    slots: DashMap<JobId, Slot>,
    sequence: AtomicU64,
}

/// Arms, replaces and cancels one deferred callback per job.
#[derive(Clone)]
pub struct TimeoutScheduler {
    inner: Arc<SchedulerInner>,
}

impl fmt::Debug for TimeoutScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutScheduler")
            .field("armed", &self.inner.slots.len())
            .finish()
    }
}

impl TimeoutScheduler {
    /// Timers are spawned on `runtime`, so the scheduler can be driven from
    /// synchronous code.
    pub fn new(runtime: Handle) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                runtime,
                slots: DashMap::new(),
                sequence: AtomicU64::new(1),
            }),
        }
    }

    /// Arm `callback` to run once after `delay`, replacing any deadline
    /// already armed for `job_id`.
    pub fn arm<F>(
        &self,
        job_id: JobId,
        kind: DeadlineKind,
        delay: Duration,
        callback: F,
    ) -> ArmedDeadline
    where
        F: FnOnce(FiredDeadline) + Send + 'static,
    {
        let token = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .inner
            .slots
            .insert(
                job_id,
                Slot {
                    kind,
                    token,
                    task: None,
                },
            )
            .map(|previous| {
                previous.abort();
                previous.kind
            });

        let inner = Arc::clone(&self.inner);
        let task = self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let owned = inner
                .slots
                .remove_if(&job_id, |_, slot| slot.token == token)
                .is_some();
            if owned {
                callback(FiredDeadline {
                    job_id,
                    kind,
                    token,
                });
            } else {
                debug!(%job_id, deadline = %kind, token, "superseded deadline elapsed");
            }
        });

        if let Some(mut slot) = self.inner.slots.get_mut(&job_id) {
            if slot.token == token {
                slot.task = Some(task.abort_handle());
            }
        }

        ArmedDeadline {
            kind,
            token,
            replaced,
        }
    }

    /// Cancel whatever is armed for `job_id`. Returns the cancelled kind.
    pub fn cancel(&self, job_id: &JobId) -> Option<DeadlineKind> {
        self.inner.slots.remove(job_id).map(|(_, slot)| {
            slot.abort();
            slot.kind
        })
    }

    pub fn pending(&self, job_id: &JobId) -> Option<DeadlineKind> {
        self.inner.slots.get(job_id).map(|slot| slot.kind)
    }

    pub fn armed_count(&self) -> usize {
        self.inner.slots.len()
    }

    /// Drop every armed deadline, e.g. on shutdown.
    pub fn cancel_all(&self) {
        self.inner.slots.retain(|_, slot| {
            slot.abort();
            false
        });
    }
}
