use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::action::{Channel, CHANNELS};

pub type Frame = [u8; CHANNELS];

/// Frames the sink may fall behind by before new ones are dropped.
pub const BACKLOG: usize = 256;

pub fn frame_channel() -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
    mpsc::channel(BACKLOG)
}

/// Shared handle to the channel store. Every tick takes the lock once, so
/// frames from different runs never interleave.
pub type Store = Arc<Mutex<Channels>>;

/// Clamps to `0..=255` and rounds to the nearest level.
pub fn level(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

/// Last committed level of every channel in the universe.
pub struct Channels {
    levels: Frame,
    out: mpsc::Sender<Frame>,
    overflowing: bool,
}

impl Channels {
    pub fn new(out: mpsc::Sender<Frame>) -> Self {
        Self { levels: [0; CHANNELS], out, overflowing: false }
    }

    pub fn shared(out: mpsc::Sender<Frame>) -> Store {
        Arc::new(Mutex::new(Self::new(out)))
    }

    pub fn write(&mut self, channel: Channel, value: f64) {
        match self.levels.get_mut(channel as usize) {
            Some(slot) => *slot = level(value),
            None => log::warn!("write to channel {} outside the universe", channel),
        }
    }

    pub fn level(&self, channel: Channel) -> u8 {
        self.levels.get(channel as usize).copied().unwrap_or(0)
    }

    pub fn levels(&self) -> Frame {
        self.levels
    }

    /// Hands the full frame to the sink. A sink that has fallen `BACKLOG`
    /// frames behind loses frames until it catches up.
    pub fn commit_frame(&mut self) {
        match self.out.try_send(self.levels) {
            Ok(()) => {
                if self.overflowing {
                    log::info!("sink caught up");
                    self.overflowing = false;
                }
            }
            Err(TrySendError::Full(_)) => {
                if !self.overflowing {
                    log::warn!("sink is {} frames behind, dropping frames", self.out.max_capacity());
                    self.overflowing = true;
                }
            }
            Err(TrySendError::Closed(_)) => log::trace!("sink closed, dropped frame"),
        }
    }
}
