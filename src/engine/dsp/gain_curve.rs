/// Smallest amplitude the level detector distinguishes from silence.
pub const LEVEL_FLOOR: f32 = 1e-5;

/// Level reported for silence, `20 * log10(LEVEL_FLOOR)`.
pub const SILENCE_DB: f32 = -100.0;

/// Converts a linear amplitude to dBFS, flooring at [`SILENCE_DB`].
#[inline]
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude.is_nan() || amplitude <= LEVEL_FLOOR {
        return SILENCE_DB;
    }
    let db = 20.0 * amplitude.log10();
    if db.is_finite() {
        db
    } else {
        SILENCE_DB
    }
}

#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Gain reduction in dB (always `<= 0`) for a detected level.
///
/// Below `threshold - knee/2` nothing happens, above `threshold + knee/2`
/// the output is pinned to the threshold, and in between a quadratic joins
/// the two with matching value and slope.
pub fn reduction_db(level_db: f32, threshold_db: f32, knee_width_db: f32) -> f32 {
    let half_knee = knee_width_db / 2.0;

    let reduction = if knee_width_db <= 0.0 || level_db < threshold_db - half_knee {
        (threshold_db - level_db).min(0.0)
    } else if level_db > threshold_db + half_knee {
        threshold_db - level_db
    } else {
        let x = level_db - (threshold_db - half_knee);
        -(x * x) / (2.0 * knee_width_db)
    };

    if reduction.is_finite() {
        reduction.min(0.0)
    } else {
        0.0
    }
}

/// The curve parameters for one block, with makeup gain already linear.
#[derive(Debug, Clone, Copy)]
pub struct GainCurve {
    threshold_db: f32,
    knee_width_db: f32,
    makeup: f32,
}

impl GainCurve {
    pub fn new(threshold_db: f32, knee_width_db: f32, makeup_gain_db: f32) -> Self {
        Self {
            threshold_db,
            knee_width_db: knee_width_db.max(0.0),
            makeup: db_to_gain(makeup_gain_db),
        }
    }

    /// Linear gain to apply for an envelope amplitude.
    #[inline]
    pub fn gain(&self, envelope: f32) -> f32 {
        let level_db = amplitude_to_db(envelope);
        db_to_gain(reduction_db(level_db, self.threshold_db, self.knee_width_db)) * self.makeup
    }
}
