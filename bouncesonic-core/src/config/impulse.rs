/// Maps a collision impulse to playback gain and rate.
///
/// Gain rises linearly in decibels from `min_gain_db` at zero impulse to 0 dB at
/// `impulse_max`. Rate rises linearly from `rate_min` at `rate_impulse_min` to
/// `rate_max` at `impulse_max`, so soft bounces sound slightly lower in pitch.
/// Both mappings clamp outside their impulse range and are monotonic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpulseCurve {
    /// Gain in dB applied to a zero impulse (negative)
    pub min_gain_db: f32,
    /// Impulse at and above which gain and rate saturate
    pub impulse_max: f32,
    /// Impulse at and below which rate stays at `rate_min`
    pub rate_impulse_min: f32,
    pub rate_min: f32,
    pub rate_max: f32,
}

impl Default for ImpulseCurve {
    fn default() -> Self {
        Self {
            min_gain_db: -20.0,
            impulse_max: 12.0,
            rate_impulse_min: 0.6,
            rate_min: 0.95,
            rate_max: 1.2,
        }
    }
}

impl ImpulseCurve {
    /// Linear gain for `impulse`. Negative and NaN impulses count as zero.
    pub fn gain(&self, impulse: f32) -> f32 {
        let impulse = self.sanitize(impulse).min(self.impulse_max);
        let gain_db = impulse / self.impulse_max * -self.min_gain_db + self.min_gain_db;
        10f32.powf(gain_db / 20.0)
    }

    /// Playback rate (pitch) for `impulse`.
    pub fn rate(&self, impulse: f32) -> f32 {
        let impulse = self
            .sanitize(impulse)
            .clamp(self.rate_impulse_min, self.impulse_max);
        let impulse_range = self.impulse_max - self.rate_impulse_min;
        (impulse - self.rate_impulse_min) / impulse_range * (self.rate_max - self.rate_min)
            + self.rate_min
    }

    pub fn min_gain(&self) -> f32 {
        10f32.powf(self.min_gain_db / 20.0)
    }

    pub fn max_gain(&self) -> f32 {
        1.0
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !(self.min_gain_db < 0.0) {
            return Err(format!("min_gain_db must be negative, got {}", self.min_gain_db));
        }
        if !(self.impulse_max > self.rate_impulse_min && self.rate_impulse_min >= 0.0) {
            return Err(format!(
                "impulse range must satisfy 0 <= rate_impulse_min < impulse_max, got {}..{}",
                self.rate_impulse_min, self.impulse_max
            ));
        }
        if !(self.rate_min > 0.0 && self.rate_max >= self.rate_min) {
            return Err(format!(
                "rate range must satisfy 0 < rate_min <= rate_max, got {}..{}",
                self.rate_min, self.rate_max
            ));
        }
        Ok(())
    }

    fn sanitize(&self, impulse: f32) -> f32 {
        if impulse.is_nan() { 0.0 } else { impulse.max(0.0) }
    }
}
