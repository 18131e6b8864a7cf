use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use rand::seq::SliceRandom;
use tokio::time::{self, Instant};

use crate::action::{Action, Sequence};
use crate::channels::Store;
use crate::fade;
use crate::registry::CancelToken;
use crate::tempo::Tempo;

/// Walks one run's action tree, checking for cancellation before every
/// action and every loop pass.
pub struct Player {
    store: Store,
    tempo: Arc<Tempo>,
    cancel: CancelToken,
}

impl Player {
    pub fn new(store: Store, tempo: Arc<Tempo>, cancel: CancelToken) -> Self {
        Self { store, tempo, cancel }
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn play(&self, sequence: &Sequence) {
        if sequence.endless {
            while !self.cancelled() {
                self.run_all(&sequence.actions).await;
                // passes without a suspension point still yield
                tokio::task::yield_now().await;
            }
        } else {
            for _ in 0..sequence.count.unwrap_or(1) {
                if self.cancelled() {
                    break;
                }
                self.run_all(&sequence.actions).await;
            }
        }
    }

    fn run_all<'a>(&'a self, actions: &'a [Action]) -> BoxFuture<'a, ()> {
        async move {
            for action in actions {
                if self.cancelled() {
                    return;
                }
                self.run(action).await;
            }
        }
        .boxed()
    }

    async fn run(&self, action: &Action) {
        match action {
            Action::Fade { channels, time } => {
                fade::fade(&self.store, &self.tempo, &self.cancel, channels, time).await;
            }
            Action::Set { channels } => {
                fade::set(&self.store, &self.tempo, &self.cancel, channels).await;
            }
            Action::Wait { time } => self.wait(time.duration(&self.tempo.get())).await,
            Action::Repeat { count, actions } => {
                let count = count.resolve(&mut rand::thread_rng());
                self.repeat(count, actions).await;
            }
            Action::Choice { options } => {
                let choice = options.choose(&mut rand::thread_rng());
                if let Some(option) = choice {
                    self.repeat(0, std::slice::from_ref(option)).await;
                }
            }
        }
    }

    /// Sleeps in tick-sized steps so a cancelled run doesn't sit out a long
    /// wait before retiring.
    async fn wait(&self, length: Duration) {
        let deadline = Instant::now().checked_add(length);
        loop {
            if self.cancelled() {
                return;
            }
            let now = Instant::now();
            let step = match deadline {
                Some(deadline) if deadline <= now => return,
                Some(deadline) => (deadline - now).min(fade::TICK),
                None => fade::TICK,
            };
            time::sleep(step).await;
        }
    }

    /// Runs `actions` `count + 1` times: a count of zero is a single pass.
    async fn repeat(&self, count: u64, actions: &[Action]) {
        for _ in 0..=count {
            if self.cancelled() {
                break;
            }
            self.run_all(actions).await;
            tokio::task::yield_now().await;
        }
    }
}
