use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::action::Sequence;
use crate::channels::{Channels, Frame, Store};
use crate::interpreter::Player;
use crate::registry::{Registry, RunGuard, RunId, RunStatus};
use crate::tempo::{ReportOutcome, Tempo, TempoReport};

#[derive(Debug, Serialize)]
pub struct Status {
    pub channels: Vec<u8>,
    pub beat_ms: f64,
    pub bpm: f64,
    pub volume: f64,
    pub runs: Vec<RunStatus>,
    pub stop_in_progress: bool,
    pub analyzer_enabled: bool,
    pub last_sequence: Option<Sequence>,
}

/// Owns the channel store, tempo state and run registry, and spawns one
/// playback task per admitted sequence.
pub struct Engine {
    store: Store,
    tempo: Arc<Tempo>,
    registry: Arc<Registry>,
    last: Mutex<Option<Arc<Sequence>>>,
}

impl Engine {
    pub fn new(frames: mpsc::Sender<Frame>, tempo: Tempo) -> Self {
        Self {
            store: Channels::shared(frames),
            tempo: Arc::new(tempo),
            registry: Arc::new(Registry::new()),
            last: Mutex::new(None),
        }
    }

    /// Admits `sequence` and starts playing it in the background. Returns
    /// `None` for an empty sequence, which plays nothing.
    pub fn submit(&self, sequence: Sequence) -> Option<RunId> {
        let sequence = Arc::new(sequence);
        *self.last.lock() = Some(sequence.clone());

        let admission = match self.registry.admit(sequence.clone()) {
            Some(admission) => admission,
            None => {
                log::debug!("empty sequence, nothing to play");
                return None;
            }
        };
        let id = admission.id;
        log::info!("playing run {} ({})", id, sequence.name.as_deref().unwrap_or("unnamed"));

        let guard = RunGuard::new(self.registry.clone(), id);
        let player = Player::new(self.store.clone(), self.tempo.clone(), admission.cancel);
        tokio::spawn(async move {
            let _guard = guard;
            player.play(&sequence).await;
            log::debug!("run {} finished", id);
        });

        Some(id)
    }

    pub fn stop(&self, id: RunId) -> bool {
        self.registry.cancel(id)
    }

    /// Cancels every run and returns once all of them have retired.
    pub async fn stop_all(&self) {
        self.registry.stop_all().await;
    }

    /// Returns once no run is registered.
    pub async fn idle(&self) {
        self.registry.wait_idle().await;
    }

    pub fn report_tempo(&self, report: TempoReport, force: bool) -> ReportOutcome {
        self.tempo.report(report, force)
    }

    pub fn set_analyzer(&self, enabled: bool) {
        self.tempo.set_analyzer(enabled);
    }

    pub fn analyzer_enabled(&self) -> bool {
        self.tempo.analyzer_enabled()
    }

    pub fn levels(&self) -> Frame {
        self.store.lock().levels()
    }

    pub fn runs(&self) -> Vec<RunStatus> {
        self.registry.snapshot()
    }

    pub fn status(&self) -> Status {
        let tempo = self.tempo.get();
        Status {
            channels: self.levels().to_vec(),
            beat_ms: tempo.beat_ms,
            bpm: tempo.bpm(),
            volume: tempo.volume,
            runs: self.registry.snapshot(),
            stop_in_progress: self.registry.stop_in_progress(),
            analyzer_enabled: self.tempo.analyzer_enabled(),
            last_sequence: self.last.lock().as_deref().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;
    use tokio::time;

    use crate::action::{parse_sequence, Action, Channel, ChannelTargets, ChannelValue, TimeSpec};
    use crate::channels::frame_channel;
    use crate::fade::TICK;

    fn engine() -> (Engine, mpsc::Receiver<Frame>) {
        let (tx, rx) = frame_channel();
        (Engine::new(tx, Tempo::default()), rx)
    }

    fn show(doc: serde_json::Value) -> Sequence {
        parse_sequence(&doc).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn set_then_fade_end_to_end() {
        let (engine, _rx) = engine();

        engine.submit(show(json!({ "actions": [{ "type": "set", "channels": { "0": 255 } }] }))).unwrap();
        time::sleep(TICK).await;
        assert_eq!(engine.levels()[0], 255);

        engine.submit(show(json!({ "actions": [{ "type": "fade", "time": 1000, "channels": { "0": 0 } }] }))).unwrap();
        time::sleep(Duration::from_millis(500)).await;
        let mid = engine.levels()[0];
        assert!((120..=135).contains(&mid), "midpoint was {}", mid);

        engine.idle().await;
        assert_eq!(engine.levels()[0], 0);
        assert!(engine.runs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_run_takes_over_channel() {
        let (engine, _rx) = engine();

        let a = engine
            .submit(show(json!({ "name": "a", "endless": true, "actions": [
                { "type": "set", "channels": { "5": 10 } },
                { "type": "wait", "time": 100 },
                { "type": "set", "channels": { "5": 20 } },
                { "type": "wait", "time": 100 },
            ]})))
            .unwrap();
        time::sleep(Duration::from_millis(150)).await;

        let b = engine
            .submit(show(json!({ "name": "b", "endless": true, "actions": [
                { "type": "set", "channels": { "5": 200 } },
                { "type": "wait", "time": 50 },
            ]})))
            .unwrap();

        let runs = engine.runs();
        assert!(runs.iter().any(|r| r.id == b && !r.cancelled));
        assert!(runs.iter().all(|r| r.id != a || r.cancelled));

        time::sleep(Duration::from_millis(200)).await;
        let runs = engine.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, b);
        assert_eq!(engine.levels()[5], 200);

        engine.stop_all().await;
        assert!(engine.runs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn preempted_run_never_writes_after_successor() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            let (engine, mut rx) = engine();
            let a: BTreeSet<Channel> = (0..rng.gen_range(1..6)).map(|_| rng.gen_range(0..12)).collect();
            let mut b: BTreeSet<Channel> = (0..rng.gen_range(1..6)).map(|_| rng.gen_range(0..12)).collect();
            b.insert(*a.iter().next().unwrap());

            let fade_to = |channels: &BTreeSet<Channel>, level: f64| Action::Fade {
                channels: channels.iter().map(|c| (*c, ChannelValue::Level(level))).collect::<ChannelTargets>(),
                time: TimeSpec::Millis(90.0),
            };
            engine.submit(Sequence::new(vec![fade_to(&a, 100.0), fade_to(&a, 0.0)]).endless());
            time::sleep(Duration::from_millis(rng.gen_range(0..200))).await;
            while rx.try_recv().is_ok() {}

            engine.submit(Sequence::new(vec![fade_to(&b, 255.0), fade_to(&b, 250.0)]).endless());
            time::sleep(Duration::from_millis(300)).await;
            engine.stop_all().await;

            // the successor only ever fades upward from its start level at
            // first, then stays within 250..=255; nothing else may drag its
            // channels back toward A's range once it has reached 250
            let frames: Vec<Frame> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
            let settled = frames.iter().position(|f| b.iter().all(|c| f[*c as usize] >= 250)).unwrap();
            for frame in &frames[settled..] {
                assert!(b.iter().all(|c| frame[*c as usize] >= 250));
            }
            let untouched: Vec<_> = a.difference(&b).collect();
            let last = frames.last().unwrap();
            let before = frames[settled];
            assert!(untouched.iter().all(|c| last[**c as usize] == before[**c as usize]));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let (engine, _rx) = engine();
        let id = engine
            .submit(show(json!({ "endless": true, "actions": [{ "type": "wait", "time": 30 }, { "type": "set", "channels": { "1": 1 } }] })))
            .unwrap();

        assert!(engine.stop(id));
        engine.idle().await;
        assert!(!engine.stop(id));

        engine.stop_all().await;
        engine.stop_all().await;
        assert!(engine.runs().is_empty());
        assert!(!engine.status().stop_in_progress);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_show_is_a_no_op() {
        let (engine, mut rx) = engine();
        assert_eq!(engine.submit(show(json!({ "actions": [] }))), None);
        time::sleep(TICK).await;
        assert!(rx.try_recv().is_err());
        assert!(engine.runs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_everything() {
        let (engine, _rx) = engine();
        engine.report_tempo(TempoReport { ms: Some(500.0), rms: Some(0.5) }, false);
        let id = engine
            .submit(show(json!({ "name": "glow", "endless": true, "actions": [
                { "type": "set", "channels": { "3": { "factor": 1 } } },
                { "type": "wait", "time": { "factor": 1 } },
            ]})))
            .unwrap();
        time::sleep(TICK).await;

        let status = engine.status();
        assert_eq!(status.channels.len(), 512);
        assert_eq!(status.channels[3], 128);
        assert_eq!(status.bpm, 120.0);
        assert_eq!(status.volume, 0.5);
        assert_eq!(status.runs.len(), 1);
        assert_eq!(status.runs[0].id, id);
        assert_eq!(status.runs[0].channels, vec![3]);
        assert_eq!(status.last_sequence.as_ref().and_then(|s| s.name.as_deref()), Some("glow"));
        assert!(status.analyzer_enabled);

        engine.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn show_submitted_during_stop_all_does_not_hang_it() {
        let (engine, _rx) = engine();
        let engine = Arc::new(engine);
        let endless_on = |channel: Channel| {
            Sequence::new(vec![
                Action::Set { channels: ChannelTargets::from([(channel, ChannelValue::Level(50.0))]) },
                Action::Wait { time: TimeSpec::Millis(40.0) },
            ])
            .endless()
        };
        engine.submit(endless_on(1)).unwrap();
        time::sleep(TICK).await;

        let stop = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.stop_all().await })
        };
        while !engine.status().stop_in_progress {
            tokio::task::yield_now().await;
        }
        engine.submit(endless_on(2)).unwrap();

        time::timeout(Duration::from_secs(60), stop).await.unwrap().unwrap();
        assert!(engine.runs().is_empty());
        assert!(!engine.status().stop_in_progress);
        assert_eq!(engine.levels()[2], 0);
    }
}
