use std::ops::RangeInclusive;

use crate::action::{Channel, ChannelTargets, ChannelValue, CHANNELS};
use crate::color::{Color, Paint};

use super::Fixture;

/// A contiguous channel range driven to one level, with fixtures that keep
/// their own color.
pub struct Universe<'a> {
    range: RangeInclusive<Channel>,
    ignore: Vec<(&'a dyn Fixture, Color)>,
}

impl<'a> Universe<'a> {
    pub fn all() -> Self {
        Self::range(0..=(CHANNELS - 1) as Channel)
    }

    pub fn range(range: RangeInclusive<Channel>) -> Self {
        let end = (*range.end()).min((CHANNELS - 1) as Channel);
        Self { range: *range.start()..=end, ignore: Vec::new() }
    }

    /// Keeps `fixture` at `color` instead of the range level.
    pub fn ignore(mut self, fixture: &'a dyn Fixture, color: Color) -> Self {
        self.ignore.push((fixture, color));
        self
    }

    pub fn value(&self, value: ChannelValue) -> ChannelTargets {
        let mut targets: ChannelTargets = self.range.clone().map(|c| (c, value)).collect();
        for (fixture, color) in &self.ignore {
            targets.extend(fixture.targets(*color, Paint::Level));
        }
        targets
    }
}

impl Fixture for Universe<'_> {
    /// Every channel follows the color's brightest component.
    fn targets(&self, color: Color, paint: Paint) -> ChannelTargets {
        let fr = color.r.max(color.g).max(color.b) * color.a;
        self.value(paint.value(fr.clamp(0.0, 1.0)))
    }
}
