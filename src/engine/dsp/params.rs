/// Limiter settings as the render thread sees them.
///
/// Values are stored exactly as supplied; clamping to usable ranges happens
/// once per block through [`Parameters::sanitized`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    /// Saturation ceiling in dBFS.
    pub threshold_db: f32,
    /// Width of the soft knee in dB. `0` is a hard knee.
    pub knee_width_db: f32,
    /// Gain applied after reduction, in dB.
    pub makeup_gain_db: f32,
    /// Dry-path delay in milliseconds.
    pub lookahead_ms: f32,
    /// Floor of the adaptive release time in milliseconds.
    pub min_recovery_ms: f32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            threshold_db: -8.0,
            knee_width_db: 6.0,
            makeup_gain_db: 8.0,
            lookahead_ms: 1.5,
            min_recovery_ms: 150.0,
        }
    }
}

/// Shortest release floor accepted at point of use.
const MIN_RECOVERY_FLOOR_MS: f32 = 0.1;

impl Parameters {
    /// Merges every field present in `update`, leaving the rest untouched.
    pub fn apply(&mut self, update: &ParamUpdate) {
        if let Some(v) = update.threshold_db {
            self.threshold_db = v;
        }
        if let Some(v) = update.knee_width_db {
            self.knee_width_db = v;
        }
        if let Some(v) = update.makeup_gain_db {
            self.makeup_gain_db = v;
        }
        if let Some(v) = update.lookahead_ms {
            self.lookahead_ms = v;
        }
        if let Some(v) = update.min_recovery_ms {
            self.min_recovery_ms = v;
        }
    }

    /// Copy with every field forced into a range the DSP can use.
    /// Non-finite values fall back to the defaults.
    pub fn sanitized(&self, max_lookahead_ms: f32) -> Self {
        let defaults = Self::default();
        Self {
            threshold_db: finite_or(self.threshold_db, defaults.threshold_db),
            knee_width_db: finite_or(self.knee_width_db, defaults.knee_width_db).max(0.0),
            makeup_gain_db: finite_or(self.makeup_gain_db, defaults.makeup_gain_db),
            lookahead_ms: finite_or(self.lookahead_ms, defaults.lookahead_ms)
                .clamp(0.0, max_lookahead_ms),
            min_recovery_ms: finite_or(self.min_recovery_ms, defaults.min_recovery_ms)
                .max(MIN_RECOVERY_FLOOR_MS),
        }
    }

    pub(crate) fn to_array(self) -> [f32; 5] {
        [
            self.threshold_db,
            self.knee_width_db,
            self.makeup_gain_db,
            self.lookahead_ms,
            self.min_recovery_ms,
        ]
    }

    pub(crate) fn from_array(values: [f32; 5]) -> Self {
        let [threshold_db, knee_width_db, makeup_gain_db, lookahead_ms, min_recovery_ms] = values;
        Self {
            threshold_db,
            knee_width_db,
            makeup_gain_db,
            lookahead_ms,
            min_recovery_ms,
        }
    }
}

/// Sparse parameter change. Fields left as `None` keep their previous value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParamUpdate {
    pub threshold_db: Option<f32>,
    pub knee_width_db: Option<f32>,
    pub makeup_gain_db: Option<f32>,
    pub lookahead_ms: Option<f32>,
    pub min_recovery_ms: Option<f32>,
}

impl ParamUpdate {
    pub fn threshold_db(mut self, value: f32) -> Self {
        self.threshold_db = Some(value);
        self
    }

    pub fn knee_width_db(mut self, value: f32) -> Self {
        self.knee_width_db = Some(value);
        self
    }

    pub fn makeup_gain_db(mut self, value: f32) -> Self {
        self.makeup_gain_db = Some(value);
        self
    }

    pub fn lookahead_ms(mut self, value: f32) -> Self {
        self.lookahead_ms = Some(value);
        self
    }

    pub fn min_recovery_ms(mut self, value: f32) -> Self {
        self.min_recovery_ms = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<Parameters> for ParamUpdate {
    fn from(p: Parameters) -> Self {
        Self {
            threshold_db: Some(p.threshold_db),
            knee_width_db: Some(p.knee_width_db),
            makeup_gain_db: Some(p.makeup_gain_db),
            lookahead_ms: Some(p.lookahead_ms),
            min_recovery_ms: Some(p.min_recovery_ms),
        }
    }
}

/// Coarse description of the program material, produced off the audio
/// thread. Always replaced as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpectralFeatures {
    /// Spectral centroid in Hz.
    pub centroid_hz: f32,
    /// Normalized energy below 200 Hz, `0..=1`.
    pub low_band_energy: f32,
    /// Normalized RMS level, `0..=1`.
    pub rms_level: f32,
}

impl SpectralFeatures {
    pub fn sanitized(&self) -> Self {
        Self {
            centroid_hz: finite_or(self.centroid_hz, 0.0).max(0.0),
            low_band_energy: finite_or(self.low_band_energy, 0.0).clamp(0.0, 1.0),
            rms_level: finite_or(self.rms_level, 0.0).clamp(0.0, 1.0),
        }
    }

    pub(crate) fn to_array(self) -> [f32; 3] {
        [self.centroid_hz, self.low_band_energy, self.rms_level]
    }

    pub(crate) fn from_array(values: [f32; 3]) -> Self {
        let [centroid_hz, low_band_energy, rms_level] = values;
        Self {
            centroid_hz,
            low_band_energy,
            rms_level,
        }
    }
}

#[inline]
fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
