//! Merging actions built for separate fixtures so they play side by side
//! instead of one after another.

use crate::action::{Action, ChannelTargets, CountSpec, TimeSpec};

/// One set covering every channel of `actions`. Later actions win where
/// channels overlap.
pub fn set(actions: &[Action]) -> Action {
    Action::Set { channels: channels(actions.iter()) }
}

/// One fade over every channel of `actions`, taking as long as the longest.
pub fn fade(actions: &[Action]) -> Action {
    let time = longest(actions.iter()).unwrap_or(TimeSpec::Millis(0.0));
    Action::Fade { channels: channels(actions.iter()), time }
}

/// Steps through the bodies of `subsequences` in lockstep, merging the n-th
/// action of each into one step. Nested repeats and choices are left out.
pub fn subsequence(subsequences: &[Action]) -> Action {
    let bodies: Vec<&[Action]> = subsequences
        .iter()
        .map(|action| match action {
            Action::Repeat { actions, .. } => actions.as_slice(),
            other => std::slice::from_ref(other),
        })
        .collect();
    let steps = bodies.iter().map(|body| body.len()).max().unwrap_or(0);

    let actions = (0..steps)
        .filter_map(|i| {
            let step: Vec<&Action> = bodies
                .iter()
                .filter_map(|body| body.get(i))
                .filter(|action| !matches!(action, Action::Repeat { .. } | Action::Choice { .. }))
                .collect();
            merge(&step)
        })
        .collect();

    Action::Repeat { count: CountSpec::Fixed(0), actions }
}

/// Sets alone stay a set. Anything timed turns the step into a fade (or a
/// wait when no channel is touched) as long as its longest part.
fn merge(step: &[&Action]) -> Option<Action> {
    if step.is_empty() {
        return None;
    }
    let timed = step.iter().any(|action| matches!(action, Action::Fade { .. } | Action::Wait { .. }));
    if !timed {
        return Some(Action::Set { channels: channels(step.iter().copied()) });
    }

    let time = longest(step.iter().copied()).unwrap_or(TimeSpec::Millis(0.0));
    let channels = channels(step.iter().copied());
    if channels.is_empty() {
        Some(Action::Wait { time })
    } else {
        Some(Action::Fade { channels, time })
    }
}

fn channels<'a>(actions: impl Iterator<Item = &'a Action>) -> ChannelTargets {
    let mut merged = ChannelTargets::new();
    for action in actions {
        if let Action::Set { channels } | Action::Fade { channels, .. } = action {
            merged.extend(channels.iter().map(|(c, v)| (*c, *v)));
        }
    }
    merged
}

/// Fixed times compare directly. Beat-relative times can't be compared with
/// them up front, so the first one found wins.
fn longest<'a>(actions: impl Iterator<Item = &'a Action>) -> Option<TimeSpec> {
    let times: Vec<TimeSpec> = actions
        .filter_map(|action| match action {
            Action::Fade { time, .. } | Action::Wait { time } => Some(*time),
            _ => None,
        })
        .collect();

    if let Some(beats) = times.iter().find(|t| matches!(t, TimeSpec::Beats { .. })) {
        return Some(*beats);
    }
    times
        .iter()
        .filter_map(|t| match t {
            TimeSpec::Millis(ms) => Some(*ms),
            TimeSpec::Beats { .. } => None,
        })
        .reduce(f64::max)
        .map(TimeSpec::Millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::color::Color;
    use crate::lights::{once, one_of, wait, Fixture, Lights};

    #[test]
    fn sets_merge_into_one() {
        let lights = Lights::default();
        let Action::Set { channels } = set(&[lights.team_a.set(Color::RED), lights.team_b.set(Color::BLUE)]) else {
            panic!("expected set")
        };
        assert_eq!(channels.len(), 6);
        assert_eq!(channels[&3], lights.team_a.targets(Color::RED, Default::default())[&3]);
        assert_eq!(channels[&8], lights.team_b.targets(Color::BLUE, Default::default())[&8]);
    }

    #[test]
    fn fade_takes_the_longest_time() {
        let lights = Lights::default();
        let merged = fade(&[
            lights.team_a.fade(Color::RED, TimeSpec::Millis(200.0)),
            lights.team_b.fade(Color::BLUE, TimeSpec::Millis(750.0)),
        ]);
        let Action::Fade { channels, time } = merged else { panic!("expected fade") };
        assert_eq!(time, TimeSpec::Millis(750.0));
        assert_eq!(channels.len(), 6);

        let beat = fade(&[
            lights.team_a.fade(Color::RED, TimeSpec::Millis(200.0)),
            lights.team_b.fade(Color::BLUE, TimeSpec::Beats { factor: 2.0 }),
        ]);
        assert!(matches!(beat, Action::Fade { time: TimeSpec::Beats { factor } , .. } if factor == 2.0));
    }

    #[test]
    fn subsequences_step_in_lockstep() {
        let lights = Lights::default();
        let a = once(vec![lights.team_a.set(Color::RED), wait(100.0), lights.team_a.blackout()]);
        let b = once(vec![
            lights.team_b.set(Color::BLUE),
            lights.team_b.fade(Color::LIME, TimeSpec::Millis(300.0)),
            one_of(vec![wait(10.0)]),
            lights.team_b.full_on(),
        ]);

        let Action::Repeat { count, actions } = subsequence(&[a, b]) else { panic!("expected repeat") };
        assert_eq!(count, CountSpec::Fixed(0));
        assert_eq!(actions.len(), 4);

        assert!(matches!(&actions[0], Action::Set { channels } if channels.len() == 6));
        // a set alongside a wait becomes a fade over the same span
        let Action::Fade { channels, time } = &actions[1] else { panic!("expected fade") };
        assert_eq!(*time, TimeSpec::Millis(300.0));
        assert_eq!(channels.len(), 3);
        // the choice is dropped, leaving team a's blackout on its own
        assert_eq!(actions[2], set(&[lights.team_a.blackout()]));
        assert_eq!(actions[3], lights.team_b.full_on());
    }

    #[test]
    fn waits_alone_stay_waits() {
        let Action::Repeat { actions, .. } = subsequence(&[once(vec![wait(40.0)]), once(vec![wait(90.0)])]) else {
            panic!("expected repeat")
        };
        assert_eq!(actions, vec![wait(90.0)]);
    }
}
