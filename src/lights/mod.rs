mod rgb; pub use rgb::*;
mod group; pub use group::*;
mod universe; pub use universe::*;
pub mod sync;

use crate::action::{Action, ChannelTargets, ChannelValue, CountSpec, Range, Sequence, TimeSpec};
use crate::color::{Color, Paint};

/// Anything that can turn a color into channel targets. Everything else a
/// show needs from a fixture is built on top of that.
pub trait Fixture {
    fn targets(&self, color: Color, paint: Paint) -> ChannelTargets;

    fn set(&self, color: Color) -> Action {
        Action::Set { channels: self.targets(color, Paint::Level) }
    }

    fn fade(&self, color: Color, time: TimeSpec) -> Action {
        Action::Fade { channels: self.targets(color, Paint::Level), time }
    }

    /// Follows the analyzer's loudness, scaled by `color`.
    fn pulse(&self, color: Color) -> Action {
        Action::Set { channels: self.targets(color, Paint::Volume) }
    }

    /// Each channel lands somewhere between `floor` and full of `color`,
    /// drawn again every time the set plays.
    fn flicker(&self, color: Color, floor: f64) -> Action {
        Action::Set { channels: self.targets(color, Paint::Random { floor }) }
    }

    fn blackout(&self) -> Action {
        self.set(Color::OFF)
    }

    fn full_on(&self) -> Action {
        self.set(Color::WHITE)
    }

    fn fade_in(&self, color: Color, time: TimeSpec) -> Action {
        self.fade(color, time)
    }

    fn fade_out(&self, time: TimeSpec) -> Action {
        self.fade(Color::OFF, time)
    }

    /// On/off flashes, `count + 1` of them.
    fn strobe(&self, color: Color, time: TimeSpec, count: CountSpec) -> Action {
        Action::Repeat {
            count,
            actions: vec![self.set(color), Action::Wait { time }, self.blackout(), Action::Wait { time }],
        }
    }

    /// One fade through each palette color.
    fn rainbow(&self, palette: &[Color], time: TimeSpec) -> Action {
        once(palette.iter().map(|color| self.fade(*color, time)).collect())
    }

    fn color_strobe(&self, palette: &[Color], time: TimeSpec, count: CountSpec) -> Action {
        let actions = palette
            .iter()
            .flat_map(|color| [self.set(*color), Action::Wait { time }, self.blackout(), Action::Wait { time }])
            .collect();
        Action::Repeat { count, actions }
    }
}

/// A single pass over `actions`.
pub fn once(actions: Vec<Action>) -> Action {
    Action::Repeat { count: CountSpec::Fixed(0), actions }
}

pub fn one_of(options: Vec<Action>) -> Action {
    Action::Choice { options }
}

pub fn random(min: f64, max: f64) -> ChannelValue {
    ChannelValue::Random(Range::new(min, max))
}

pub fn wait(ms: f64) -> Action {
    Action::Wait { time: TimeSpec::Millis(ms) }
}

/// The fixtures on the rig.
pub struct Lights {
    pub middle: Rgb,
    pub team_a: Rgb,
    pub team_b: Rgb,
    pub stripes: Rgb,
}

impl Default for Lights {
    fn default() -> Self {
        Self {
            middle: Rgb::new(1, 0, 2),
            team_a: Rgb::new(4, 3, 5),
            team_b: Rgb::new(7, 6, 8),
            stripes: Rgb::new(10, 9, 11),
        }
    }
}

impl Lights {
    pub fn all(&self) -> Group<'_> {
        Group::new([
            &self.middle as &dyn Fixture,
            &self.team_a as &dyn Fixture,
            &self.team_b as &dyn Fixture,
            &self.stripes as &dyn Fixture,
        ])
    }
}

/// Lamp test played on startup: the whole universe up and down twice.
pub fn boot_show() -> Sequence {
    let universe = Universe::all();
    let mut show = Sequence::new(vec![
        Action::Fade { channels: universe.value(ChannelValue::Level(255.0)), time: TimeSpec::Millis(1000.0) },
        Action::Fade { channels: universe.value(ChannelValue::Level(0.0)), time: TimeSpec::Millis(1000.0) },
    ])
    .count(2);
    show.name = Some("boot".into());
    show
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::action::{parse_sequence, CHANNELS};
    use crate::color::opacity;

    fn level(v: f64) -> ChannelValue {
        ChannelValue::Level(v)
    }

    #[test]
    fn rgb_fixture_addresses_its_channels() {
        let lights = Lights::default();
        let Action::Set { channels } = lights.middle.set(Color::RED) else { panic!("expected set") };
        assert_eq!(channels, ChannelTargets::from([(1, level(255.0)), (0, level(0.0)), (2, level(0.0))]));
    }

    #[test]
    fn group_merges_members() {
        let lights = Lights::default();
        let Action::Fade { channels, time } = lights.all().fade(Color::BLUE, TimeSpec::Millis(300.0)) else {
            panic!("expected fade")
        };
        assert_eq!(time, TimeSpec::Millis(300.0));
        assert_eq!(channels.len(), 12);
        assert_eq!(channels[&11], level(255.0));
        assert_eq!(channels[&10], level(0.0));
    }

    #[test]
    fn pulse_follows_volume() {
        let lights = Lights::default();
        let Action::Set { channels } = lights.team_a.pulse(Color::WHITE.a(0.5)) else { panic!("expected set") };
        assert!(channels.values().all(|v| *v == ChannelValue::Volume { factor: 0.5 }));
    }

    #[test]
    fn strobe_shape() {
        let lights = Lights::default();
        let strobe = lights.stripes.strobe(Color::WHITE, TimeSpec::Millis(50.0), CountSpec::Fixed(4));
        let Action::Repeat { count, actions } = strobe else { panic!("expected repeat") };
        assert_eq!(count, CountSpec::Fixed(4));
        assert_eq!(actions.len(), 4);
        assert_eq!(actions[2], lights.stripes.blackout());

        let rainbow = lights.stripes.rainbow(&Color::RAINBOW, TimeSpec::Beats { factor: 1.0 });
        let Action::Repeat { count, actions } = rainbow else { panic!("expected repeat") };
        assert_eq!(count, CountSpec::Fixed(0));
        assert_eq!(actions.len(), Color::RAINBOW.len());

        let color_strobe = lights.all().color_strobe(&[Color::RED, Color::BLUE], TimeSpec::Millis(75.0), CountSpec::Fixed(1));
        let Action::Repeat { actions, .. } = color_strobe else { panic!("expected repeat") };
        assert_eq!(actions.len(), 8);
    }

    #[test]
    fn flicker_and_raw_values_are_random() {
        let lights = Lights::default();
        let Action::Set { channels } = lights.team_b.flicker(Color::WHITE, 0.2) else { panic!("expected set") };
        assert!(channels.values().all(|v| *v == random(51.0, 255.0)));

        let channels = lights.middle.values(opacity([random(0.0, 200.0), level(40.0), level(0.0)], 0.5));
        assert_eq!(channels[&1], random(0.0, 100.0));
        assert_eq!(channels[&0], level(20.0));

        let show = Sequence::new(vec![Action::Set { channels }]);
        let json = serde_json::to_value(&show).unwrap();
        assert_eq!(json["actions"][0]["channels"]["1"], serde_json::json!({ "min": 0.0, "max": 100.0 }));
    }

    #[test]
    fn universe_keeps_ignored_fixtures() {
        let lights = Lights::default();
        let targets = Universe::range(0..=20).ignore(&lights.middle, Color::LIME).value(level(9.0));
        assert_eq!(targets.len(), 21);
        assert_eq!(targets[&0], level(255.0));
        assert_eq!(targets[&1], level(0.0));
        assert_eq!(targets[&20], level(9.0));
    }

    #[test]
    fn boot_show_covers_universe() {
        let show = boot_show();
        assert_eq!(show.affected_channels().len(), CHANNELS);
        let json = serde_json::to_value(&show).unwrap();
        assert_eq!(parse_sequence(&json).unwrap(), show);
    }

    #[test]
    fn builders_compose_into_a_show() {
        let lights = Lights::default();
        let show = Sequence::new(vec![
            one_of(vec![lights.team_a.full_on(), lights.team_b.full_on()]),
            wait(200.0),
            lights.all().fade_out(TimeSpec::Millis(500.0)),
        ]);
        let channels = show.affected_channels();
        assert_eq!(channels.len(), 12);
    }
}
