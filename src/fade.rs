use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};

use crate::action::{Channel, ChannelTargets, TimeSpec};
use crate::channels::Store;
use crate::registry::CancelToken;
use crate::tempo::{Tempo, TempoState};

/// Fade sampling interval.
pub const TICK: Duration = Duration::from_millis(20);
/// Pause after a set before the next action runs.
pub const SET_DELAY: Duration = Duration::from_millis(10);

fn resolve(targets: &ChannelTargets, tempo: &TempoState) -> Vec<(Channel, f64)> {
    let mut rng = rand::thread_rng();
    targets.iter().map(|(channel, value)| (*channel, value.resolve(tempo, &mut rng))).collect()
}

/// Writes `values` and commits one frame, unless the run was cancelled.
/// The check happens under the store lock, so a preempted run can't slip a
/// frame in after its successor started writing.
fn commit(store: &Store, cancel: &CancelToken, values: impl IntoIterator<Item = (Channel, f64)>) -> bool {
    let mut channels = store.lock();
    if cancel.is_cancelled() {
        return false;
    }
    for (channel, value) in values {
        channels.write(channel, value);
    }
    channels.commit_frame();
    true
}

pub async fn set(store: &Store, tempo: &Tempo, cancel: &CancelToken, targets: &ChannelTargets) {
    let values = resolve(targets, &tempo.get());
    if commit(store, cancel, values) {
        time::sleep(SET_DELAY).await;
    }
}

/// Linear fade from the committed levels to `targets` over `time`.
/// Targets are resolved once up front and held for the whole fade.
pub async fn fade(store: &Store, tempo: &Tempo, cancel: &CancelToken, targets: &ChannelTargets, time: &TimeSpec) {
    let state = tempo.get();
    let length = time.duration(&state);
    if length.is_zero() {
        return set(store, tempo, cancel, targets).await;
    }

    let end = resolve(targets, &state);
    let start: Vec<f64> = {
        let channels = store.lock();
        end.iter().map(|(channel, _)| f64::from(channels.level(*channel))).collect()
    };
    log::trace!("fade {} channels over {:?}", end.len(), length);

    let t0 = Instant::now();
    let mut interval = time::interval(TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let elapsed = t0.elapsed();
        if elapsed >= length {
            break;
        }

        let progress = (elapsed.as_secs_f64() / length.as_secs_f64()).clamp(0.0, 1.0);
        let frame = start
            .iter()
            .zip(&end)
            .map(|(from, (channel, to))| (*channel, (from + (to - from) * progress).round()));
        if !commit(store, cancel, frame) {
            return;
        }
    }

    // land exactly on target, whatever the last tick rounded to
    commit(store, cancel, end);
}
