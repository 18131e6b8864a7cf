use crate::action::{Channel, ChannelTargets, ChannelValue};
use crate::color::{Color, Paint};

use super::Fixture;

/// Three-channel fixture. Channel order varies between models, so each
/// color gets its own address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: Channel,
    pub g: Channel,
    pub b: Channel,
}

impl Rgb {
    pub const fn new(r: Channel, g: Channel, b: Channel) -> Self {
        Self { r, g, b }
    }

    /// Raw per-channel values, for levels a `Color` can't express.
    pub fn values(&self, [r, g, b]: [ChannelValue; 3]) -> ChannelTargets {
        ChannelTargets::from([(self.r, r), (self.g, g), (self.b, b)])
    }
}

impl Fixture for Rgb {
    fn targets(&self, color: Color, paint: Paint) -> ChannelTargets {
        self.values(color.levels(paint))
    }
}
