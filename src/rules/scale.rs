use serde::Deserialize;

/// Inclusive numeric range, written `[min, max]` in rule files.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "[f64; 2]")]
pub struct LinearRange {
    pub min: f64,
    pub max: f64,
}

impl LinearRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Position of `value` within the range as 0.0..=1.0.
    ///
    /// The value is clamped into the range first. A range with equal bounds
    /// maps everything at or below the bound to 0.0 and the rest to 1.0.
    pub fn normalize(&self, value: f64) -> f64 {
        if self.max == self.min {
            return if value <= self.min { 0.0 } else { 1.0 };
        }
        let lo = self.min.min(self.max);
        let hi = self.min.max(self.max);
        (value.clamp(lo, hi) - self.min) / (self.max - self.min)
    }

    pub fn lerp(&self, t: f64) -> f64 {
        t * (self.max - self.min) + self.min
    }
}

impl From<[f64; 2]> for LinearRange {
    fn from([min, max]: [f64; 2]) -> Self {
        Self { min, max }
    }
}

/// Maps a controller value onto a tempo.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TempoScale {
    #[serde(default = "TempoScale::default_range_in")]
    pub range_in: LinearRange,
    #[serde(default = "TempoScale::default_range_out")]
    pub range_out: LinearRange,
}

impl Default for TempoScale {
    fn default() -> Self {
        Self {
            range_in: Self::default_range_in(),
            range_out: Self::default_range_out(),
        }
    }
}

impl TempoScale {
    fn default_range_in() -> LinearRange {
        LinearRange::new(0.0, 127.0)
    }

    fn default_range_out() -> LinearRange {
        LinearRange::new(60.0, 180.0)
    }

    /// The tempo for controller `value`. The result is not clamped to the
    /// tempo bounds; the transport does that on commit.
    pub fn apply(&self, value: u8) -> f64 {
        self.range_out.lerp(self.range_in.normalize(f64::from(value)))
    }
}
