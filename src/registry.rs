use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;

use crate::action::{Channel, Sequence};

pub type RunId = u32;

const MAX_ID: RunId = 1_000_000_000;

/// Cooperative cancellation flag shared between the registry and one run.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Run {
    sequence: Arc<Sequence>,
    channels: BTreeSet<Channel>,
    cancel: CancelToken,
}

pub struct Admission {
    pub id: RunId,
    pub cancel: CancelToken,
    /// Older runs cancelled because they claimed overlapping channels.
    pub preempted: Vec<RunId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunStatus {
    pub id: RunId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub channels: Vec<Channel>,
    pub cancelled: bool,
}

/// Every run between admission and retirement.
pub struct Registry {
    runs: Mutex<HashMap<RunId, Run>>,
    len: watch::Sender<usize>,
    stopping: AtomicUsize,
}

impl Registry {
    pub fn new() -> Self {
        let (len, _) = watch::channel(0);
        Self { runs: Mutex::new(HashMap::new()), len, stopping: AtomicUsize::new(0) }
    }

    /// Registers `sequence`, cancelling every live run whose channels overlap
    /// it. Empty sequences are not registered. While a stop-all is draining,
    /// the new run is registered already cancelled.
    pub fn admit(&self, sequence: Arc<Sequence>) -> Option<Admission> {
        if sequence.actions.is_empty() {
            return None;
        }
        let channels = sequence.affected_channels();

        let mut runs = self.runs.lock();
        let mut preempted = Vec::new();
        for (id, run) in runs.iter() {
            if !run.cancel.is_cancelled() && !run.channels.is_disjoint(&channels) {
                run.cancel.cancel();
                preempted.push(*id);
            }
        }
        preempted.sort_unstable();

        let mut rng = rand::thread_rng();
        let id = loop {
            let id = rng.gen_range(0..MAX_ID);
            if !runs.contains_key(&id) {
                break id;
            }
        };
        for old in &preempted {
            log::info!("run {} preempted by run {}", old, id);
        }

        let cancel = CancelToken::default();
        // a stop-all only returns once the registry is empty
        if self.stop_in_progress() {
            log::info!("run {} admitted during stop-all, cancelling", id);
            cancel.cancel();
        }
        runs.insert(id, Run { sequence, channels, cancel: cancel.clone() });
        self.len.send_replace(runs.len());
        log::debug!("admitted run {}", id);

        Some(Admission { id, cancel, preempted })
    }

    /// Cancels one run. Unknown ids are ignored, since a run may retire
    /// between a status query and the stop request.
    pub fn cancel(&self, id: RunId) -> bool {
        match self.runs.lock().get(&id) {
            Some(run) => {
                run.cancel.cancel();
                log::debug!("cancelled run {}", id);
                true
            }
            None => {
                log::debug!("cancel for unknown run {}", id);
                false
            }
        }
    }

    pub fn cancel_all(&self) {
        for run in self.runs.lock().values() {
            run.cancel.cancel();
        }
    }

    /// Cancels everything and waits until every run has retired.
    pub async fn stop_all(&self) {
        self.stopping.fetch_add(1, Ordering::SeqCst);
        self.cancel_all();
        self.wait_idle().await;
        self.stopping.fetch_sub(1, Ordering::SeqCst);
        log::info!("all runs stopped");
    }

    /// Waits until the registry is empty without cancelling anything.
    pub async fn wait_idle(&self) {
        let mut rx = self.len.subscribe();
        let _ = rx.wait_for(|len| *len == 0).await;
    }

    pub fn stop_in_progress(&self) -> bool {
        self.stopping.load(Ordering::SeqCst) > 0
    }

    pub fn retire(&self, id: RunId) {
        let mut runs = self.runs.lock();
        if runs.remove(&id).is_some() {
            log::debug!("retired run {}", id);
        }
        self.len.send_replace(runs.len());
    }

    pub fn len(&self) -> usize {
        self.runs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<RunStatus> {
        let mut runs: Vec<_> = self
            .runs
            .lock()
            .iter()
            .map(|(id, run)| RunStatus {
                id: *id,
                name: run.sequence.name.clone(),
                channels: run.channels.iter().copied().collect(),
                cancelled: run.cancel.is_cancelled(),
            })
            .collect();
        runs.sort_by_key(|run| run.id);
        runs
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Retires its run when the interpreter task finishes, however it finishes.
pub struct RunGuard {
    registry: Arc<Registry>,
    id: RunId,
}

impl RunGuard {
    pub fn new(registry: Arc<Registry>, id: RunId) -> Self {
        Self { registry, id }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.retire(self.id);
    }
}
