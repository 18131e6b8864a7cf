use crate::action::{ChannelValue, Range};

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Color {
    pub a: f64,
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const OFF:     Self = Self::argb(0.0, 0.0, 0.0, 0.0);
    pub const WHITE:   Self = Self::rgb(1.0,   1.0,   1.0);

    pub const RED:     Self = Self::rgb(1.0,   0.0,   0.0);
    pub const ORANGE:  Self = Self::rgb(1.0,   0.196, 0.0);
    pub const GOLD:    Self = Self::rgb(1.0,   0.451, 0.0);
    pub const YELLOW:  Self = Self::rgb(1.0,   1.0,   0.0);
    pub const LIME:    Self = Self::rgb(0.0,   1.0,   0.0);
    pub const MINT:    Self = Self::rgb(0.196, 1.0,   0.353);
    pub const CYAN:    Self = Self::rgb(0.0,   0.8,   1.0);
    pub const BLUE:    Self = Self::rgb(0.0,   0.0,   1.0);
    pub const INDIGO:  Self = Self::rgb(0.294, 0.0,   0.51);
    pub const VIOLET:  Self = Self::rgb(0.533, 0.0,   1.0);
    pub const MAGENTA: Self = Self::rgb(1.0,   0.0,   1.0);
    pub const PINK:    Self = Self::rgb(1.0,   0.0,   0.137);

    /// Nine steps around the color wheel.
    pub const RAINBOW: [Self; 9] = [
        Self::rgb(1.0,   0.0,   0.0),
        Self::rgb(1.0,   0.502, 0.0),
        Self::rgb(0.502, 1.0,   0.0),
        Self::rgb(0.0,   1.0,   0.0),
        Self::rgb(0.0,   1.0,   0.502),
        Self::rgb(0.0,   0.502, 1.0),
        Self::rgb(0.0,   0.0,   1.0),
        Self::rgb(0.502, 0.0,   1.0),
        Self::rgb(1.0,   0.0,   0.502),
    ];

    pub const fn argb(a: f64, r: f64, g: f64, b: f64) -> Self { Self { a, r, g, b } }
    pub const fn rgb(r: f64, g: f64, b: f64) -> Self { Self::argb(1.0, r, g, b) }

    pub fn hsv(h: f64, s: f64, v: f64) -> Self {
        let mix = |x: f64, y: f64, t: f64| x + (y - x) * t;
        let r = v * mix(1.0, (((h + 1.0      ).fract() * 6.0 - 3.0).abs() - 1.0).clamp(0.0, 1.0), s);
        let g = v * mix(1.0, (((h + 0.6666666).fract() * 6.0 - 3.0).abs() - 1.0).clamp(0.0, 1.0), s);
        let b = v * mix(1.0, (((h + 0.3333333).fract() * 6.0 - 3.0).abs() - 1.0).clamp(0.0, 1.0), s);
        Self::rgb(r, g, b)
    }

    /// Parses `#rrggbb`.
    pub fn hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix('#').unwrap_or(s);
        if s.len() != 6 || !s.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&s[i..i + 2], 16).ok().map(|v| f64::from(v) / 255.0);
        Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?))
    }
}

impl Color {
    pub fn a(self, a: f64) -> Self {
        Self { a, ..self }
    }

    pub fn a_mul(self, a: f64) -> Self {
        Self { a: self.a * a, ..self }
    }

    /// Red, green, blue as channel values.
    pub fn levels(self, paint: Paint) -> [ChannelValue; 3] {
        [self.r, self.g, self.b].map(|c| paint.value((c * self.a).clamp(0.0, 1.0)))
    }
}

/// How a color becomes channel values.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub enum Paint {
    /// Fixed levels.
    #[default]
    Level,
    /// Levels that follow the analyzer's loudness.
    Volume,
    /// A fresh random level on every play, between `floor` times the
    /// color's level and the level itself.
    Random { floor: f64 },
}

impl Paint {
    pub fn value(self, fr: f64) -> ChannelValue {
        match self {
            Paint::Level => ChannelValue::Level((fr * 255.0).round()),
            Paint::Volume => ChannelValue::Volume { factor: fr },
            Paint::Random { floor } => {
                let top = (fr * 255.0).round();
                ChannelValue::Random(Range::new((top * floor.clamp(0.0, 1.0)).round(), top))
            }
        }
    }
}

/// Dims raw channel values, whatever kind they are.
pub fn opacity(values: [ChannelValue; 3], opacity: f64) -> [ChannelValue; 3] {
    values.map(|v| v.scale(opacity))
}
