use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::tempo::TempoState;

pub const SINK: &str = "DMXSHOW_SINK";
pub const UNIVERSE: &str = "DMXSHOW_UNIVERSE";
pub const ANALYZER: &str = "DMXSHOW_ANALYZER";
pub const BOOT_SHOW: &str = "DMXSHOW_BOOT_SHOW";
pub const BEAT_MS: &str = "DMXSHOW_BEAT_MS";
pub const VOLUME: &str = "DMXSHOW_VOLUME";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkKind {
    /// Pipe frames into `ola_streaming_client`.
    Ola,
    /// Discard frames.
    Null,
}

impl FromStr for SinkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ola" => Ok(SinkKind::Ola),
            "null" | "none" => Ok(SinkKind::Null),
            other => bail!("unknown sink {:?}, expected ola or null", other),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub sink: SinkKind,
    pub universe: u16,
    pub analyzer: bool,
    pub boot_show: bool,
    pub tempo: TempoState,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // ola is only packaged for linux
            sink: if cfg!(target_os = "linux") { SinkKind::Ola } else { SinkKind::Null },
            universe: 0,
            analyzer: true,
            boot_show: true,
            tempo: TempoState::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            sink: parse(&lookup, SINK, defaults.sink, |s| s.parse())?,
            universe: parse(&lookup, UNIVERSE, defaults.universe, |s| Ok(s.trim().parse()?))?,
            analyzer: parse(&lookup, ANALYZER, defaults.analyzer, flag)?,
            boot_show: parse(&lookup, BOOT_SHOW, defaults.boot_show, flag)?,
            tempo: TempoState {
                beat_ms: parse(&lookup, BEAT_MS, defaults.tempo.beat_ms, positive)?,
                volume: parse(&lookup, VOLUME, defaults.tempo.volume, positive)?,
            },
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    f: impl Fn(&str) -> Result<T>,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => f(&raw).with_context(|| format!("invalid {}={:?}", key, raw)),
        None => Ok(default),
    }
}

fn flag(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {:?}", other),
    }
}

fn positive(s: &str) -> Result<f64> {
    let v: f64 = s.trim().parse()?;
    if !(v.is_finite() && v > 0.0) {
        bail!("expected a positive number");
    }
    Ok(v)
}
