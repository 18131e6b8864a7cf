use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ShowError;
use crate::tempo::TempoState;

/// Number of addressable channels in one DMX universe.
pub const CHANNELS: usize = 512;

const MISSING: &str = "<missing>";

pub type Channel = u16;
pub type ChannelTargets = BTreeMap<Channel, ChannelValue>;

/// Uniform `[min, max)` range, floored on sampling.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if !self.min.is_finite() || !self.max.is_finite() {
            return 0.0;
        }
        if self.max <= self.min {
            return self.min.floor();
        }
        rng.gen_range(self.min..self.max).floor()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChannelValue {
    Level(f64),
    Random(Range),
    /// Fraction of full level, scaled by the current volume.
    Volume { factor: f64 },
}

impl ChannelValue {
    pub fn resolve<R: Rng + ?Sized>(&self, tempo: &TempoState, rng: &mut R) -> f64 {
        match self {
            ChannelValue::Level(v) => *v,
            ChannelValue::Random(range) => range.sample(rng),
            ChannelValue::Volume { factor } => (factor * 255.0 * tempo.volume).round(),
        }
    }

    /// Scales the value. A random range keeps its lower bound.
    pub fn scale(self, m: f64) -> Self {
        match self {
            ChannelValue::Level(v) => ChannelValue::Level(v * m),
            ChannelValue::Random(range) => ChannelValue::Random(Range::new(range.min, range.max * m)),
            ChannelValue::Volume { factor } => ChannelValue::Volume { factor: factor * m },
        }
    }
}

impl From<f64> for ChannelValue {
    fn from(v: f64) -> Self {
        ChannelValue::Level(v)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TimeSpec {
    Millis(f64),
    /// Multiple of the current beat period.
    Beats { factor: f64 },
}

impl TimeSpec {
    /// Duration in milliseconds, never negative.
    pub fn resolve(&self, tempo: &TempoState) -> f64 {
        let ms = match self {
            TimeSpec::Millis(ms) => *ms,
            TimeSpec::Beats { factor } => factor * tempo.beat_ms,
        };
        if ms.is_finite() { ms.max(0.0) } else { 0.0 }
    }

    pub fn duration(&self, tempo: &TempoState) -> Duration {
        Duration::try_from_secs_f64(self.resolve(tempo) / 1000.0).unwrap_or(Duration::MAX)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CountSpec {
    Fixed(u64),
    Random(Range),
}

impl CountSpec {
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        match self {
            CountSpec::Fixed(n) => *n,
            CountSpec::Random(range) => range.sample(rng).max(0.0) as u64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Fade { channels: ChannelTargets, time: TimeSpec },
    Wait { time: TimeSpec },
    Set { channels: ChannelTargets },
    /// Runs `actions` `count + 1` times.
    #[serde(rename = "subsequence")]
    Repeat { count: CountSpec, actions: Vec<Action> },
    /// Runs one uniformly chosen option once.
    #[serde(rename = "option")]
    Choice { options: Vec<Action> },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Sequence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    pub endless: bool,
    pub actions: Vec<Action>,
}

impl Sequence {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions, ..Default::default() }
    }

    pub fn endless(mut self) -> Self {
        self.endless = true;
        self
    }

    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Every channel any fade or set in the tree may touch, whichever
    /// branches a choice ends up taking.
    pub fn affected_channels(&self) -> BTreeSet<Channel> {
        let mut channels = BTreeSet::new();
        collect_channels(&self.actions, &mut channels);
        channels
    }
}

fn collect_channels(actions: &[Action], out: &mut BTreeSet<Channel>) {
    for action in actions {
        match action {
            Action::Fade { channels, .. } | Action::Set { channels } => out.extend(channels.keys()),
            Action::Wait { .. } => {}
            Action::Repeat { actions, .. } => collect_channels(actions, out),
            Action::Choice { options } => collect_channels(options, out),
        }
    }
}

pub fn parse_sequence(data: &Value) -> Result<Sequence, ShowError> {
    let obj = data
        .as_object()
        .ok_or_else(|| ShowError::malformed("sequence", "expected an object"))?;

    let name = match obj.get("name") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(ShowError::malformed("sequence", "name must be a string")),
    };
    let count = match obj.get("count").or_else(|| obj.get("repeatCount")) {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            whole(v).ok_or_else(|| ShowError::malformed("sequence", "count must be a non-negative number"))?,
        ),
    };
    let endless = match obj.get("endless") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(ShowError::malformed("sequence", "endless must be a boolean")),
    };
    let actions = parse_list(obj, "sequence", "actions")?;

    Ok(Sequence { name, count, endless, actions })
}

pub fn parse_action(data: &Value) -> Result<Action, ShowError> {
    let obj = data
        .as_object()
        .ok_or_else(|| ShowError::malformed(MISSING, "action must be an object"))?;
    let tag = match obj.get("type") {
        Some(Value::String(tag)) => tag.as_str(),
        _ => return Err(ShowError::malformed(MISSING, "action has no type")),
    };

    match tag {
        "fade" => Ok(Action::Fade {
            channels: parse_channels(tag, obj.get("channels"))?,
            time: parse_time(tag, obj.get("time"))?,
        }),
        "wait" => Ok(Action::Wait { time: parse_time(tag, obj.get("time"))? }),
        "set" => Ok(Action::Set { channels: parse_channels(tag, obj.get("channels"))? }),
        "subsequence" | "repeat" => Ok(Action::Repeat {
            count: parse_count(tag, obj.get("count"))?,
            actions: parse_list(obj, tag, "actions")?,
        }),
        "option" | "choice" => Ok(Action::Choice { options: parse_list(obj, tag, "options")? }),
        other => Err(ShowError::malformed(other, "unknown action type")),
    }
}

fn parse_list(obj: &Map<String, Value>, tag: &str, key: &str) -> Result<Vec<Action>, ShowError> {
    match obj.get(key) {
        Some(Value::Array(items)) => items.iter().map(parse_action).collect(),
        _ => Err(ShowError::malformed(tag, format!("{} must be a list", key))),
    }
}

fn parse_channels(tag: &str, data: Option<&Value>) -> Result<ChannelTargets, ShowError> {
    let obj = match data {
        Some(Value::Object(obj)) => obj,
        _ => return Err(ShowError::malformed(tag, "channels must be an object")),
    };

    let mut channels = ChannelTargets::new();
    for (key, value) in obj {
        let channel = key
            .trim()
            .parse::<Channel>()
            .ok()
            .filter(|c| (*c as usize) < CHANNELS)
            .ok_or_else(|| ShowError::malformed(tag, format!("invalid channel {:?}", key)))?;
        channels.insert(channel, parse_channel_value(tag, key, value)?);
    }
    Ok(channels)
}

fn parse_channel_value(tag: &str, key: &str, data: &Value) -> Result<ChannelValue, ShowError> {
    match data {
        Value::Number(n) => n
            .as_f64()
            .map(ChannelValue::Level)
            .ok_or_else(|| ShowError::malformed(tag, format!("channel {} is not a number", key))),
        Value::Object(obj) if obj.contains_key("min") || obj.contains_key("max") => {
            parse_range(obj).map(ChannelValue::Random).ok_or_else(|| {
                ShowError::malformed(tag, format!("channel {} needs numeric min and max", key))
            })
        }
        Value::Object(obj) => match obj.get("factor").and_then(Value::as_f64) {
            Some(factor) => Ok(ChannelValue::Volume { factor }),
            None => Err(ShowError::malformed(tag, format!("channel {} has no value", key))),
        },
        _ => Err(ShowError::malformed(tag, format!("channel {} is not a number", key))),
    }
}

fn parse_time(tag: &str, data: Option<&Value>) -> Result<TimeSpec, ShowError> {
    match data {
        Some(Value::Number(n)) => n
            .as_f64()
            .map(TimeSpec::Millis)
            .ok_or_else(|| ShowError::malformed(tag, "time is not a number")),
        Some(Value::Object(obj)) => match obj.get("factor").and_then(Value::as_f64) {
            Some(factor) => Ok(TimeSpec::Beats { factor }),
            None => Err(ShowError::malformed(tag, "time needs a numeric factor")),
        },
        _ => Err(ShowError::malformed(tag, "time must be a number or {factor}")),
    }
}

fn parse_count(tag: &str, data: Option<&Value>) -> Result<CountSpec, ShowError> {
    match data {
        None | Some(Value::Null) => Ok(CountSpec::Fixed(1)),
        Some(Value::Object(obj)) => parse_range(obj)
            .map(CountSpec::Random)
            .ok_or_else(|| ShowError::malformed(tag, "count needs numeric min and max")),
        Some(v) => whole(v)
            .map(CountSpec::Fixed)
            .ok_or_else(|| ShowError::malformed(tag, "count must be a non-negative number")),
    }
}

fn parse_range(obj: &Map<String, Value>) -> Option<Range> {
    let min = obj.get("min")?.as_f64()?;
    let max = obj.get("max")?.as_f64()?;
    Some(Range::new(min, max))
}

fn whole(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    v.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f.floor() as u64)
}
