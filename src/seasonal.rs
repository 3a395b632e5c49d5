//! Wall-clock seasonal pattern detection: hourly/daily/weekly profiles plus
//! a naive DFT over each profile for dominant-frequency reconstruction.
//!
//! Grounded in the source's `SeasonalModel`. The hourly profile is
//! normalized by its own global mean; the daily and weekly profiles are not
//! (see `get_seasonal_factor`, which normalizes them at the point of use).
//! This asymmetry is intentional.

use chrono::{Datelike, TimeZone, Timelike};

const PATTERN_UPDATE_INTERVAL_MS: u64 = 3_600_000;

#[derive(Debug, Clone, Default)]
pub struct FourierCoefficients {
    pub real: Vec<f64>,
    pub imaginary: Vec<f64>,
    pub magnitude: Vec<f64>,
    pub phase: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct SeasonalPattern {
    pub hourly_pattern: [f64; 24],
    pub hourly_confidence: [f64; 24],
    pub daily_pattern: [f64; 7],
    pub daily_confidence: [f64; 7],
    pub weekly_pattern: [f64; 4],
    pub weekly_confidence: [f64; 4],
    pub hourly_fourier: FourierCoefficients,
    pub daily_fourier: FourierCoefficients,
    pub weekly_fourier: FourierCoefficients,
    pub dominant_hourly_frequencies: Vec<usize>,
    pub dominant_daily_frequencies: Vec<usize>,
    pub dominant_weekly_frequencies: Vec<usize>,
    pub hourly_stability: f64,
    pub daily_stability: f64,
    pub weekly_stability: f64,
    pub confidence_score: f64,
    pub last_updated: u64,
    pub observation_count: usize,
}

impl Default for SeasonalPattern {
    fn default() -> Self {
        Self {
            hourly_pattern: [1.0; 24],
            hourly_confidence: [0.0; 24],
            daily_pattern: [0.0; 7],
            daily_confidence: [0.0; 7],
            weekly_pattern: [0.0; 4],
            weekly_confidence: [0.0; 4],
            hourly_fourier: FourierCoefficients::default(),
            daily_fourier: FourierCoefficients::default(),
            weekly_fourier: FourierCoefficients::default(),
            dominant_hourly_frequencies: Vec::new(),
            dominant_daily_frequencies: Vec::new(),
            dominant_weekly_frequencies: Vec::new(),
            hourly_stability: 0.0,
            daily_stability: 0.0,
            weekly_stability: 0.0,
            confidence_score: 0.0,
            last_updated: 0,
            observation_count: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeasonalModel {
    min_samples_for_pattern: usize,
    observations: Vec<(u64, f64)>,
    pattern: SeasonalPattern,
    last_pattern_update_ms: u64,
}

impl SeasonalModel {
    pub fn new(min_samples_for_pattern: usize) -> Self {
        let min_samples_for_pattern = if min_samples_for_pattern == 0 {
            1000
        } else {
            min_samples_for_pattern
        };
        Self {
            min_samples_for_pattern,
            observations: Vec::new(),
            pattern: SeasonalPattern::default(),
            last_pattern_update_ms: 0,
        }
    }

    pub fn add_observation(&mut self, ts_ms: u64, value: f64) {
        self.observations.push((ts_ms, value));
        let cap = self.min_samples_for_pattern * 2;
        while self.observations.len() > cap {
            self.observations.remove(0);
        }
        if ts_ms.saturating_sub(self.last_pattern_update_ms) > PATTERN_UPDATE_INTERVAL_MS {
            self.update_pattern(ts_ms, false);
        }
    }

    pub fn is_pattern_established(&self) -> bool {
        self.observations.len() >= self.min_samples_for_pattern
    }

    pub fn get_current_pattern(&self) -> &SeasonalPattern {
        &self.pattern
    }

    /// Expected absolute value at `ts_ms`, reconstructed from the hourly
    /// Fourier series. Neutral `1.0` when the pattern is not established.
    pub fn get_expected_value(&self, ts_ms: u64) -> f64 {
        if !self.is_pattern_established() {
            return 1.0;
        }
        let hour = hour_of_day(ts_ms) as f64;
        let normalized_hour = hour / 24.0;
        Self::reconstruct_from_fourier(&self.pattern.hourly_fourier, normalized_hour)
    }

    /// Weighted blend of hourly/daily/weekly deviation from average at
    /// `ts_ms`, each blended toward neutral `1.0` by its own confidence and
    /// weighted by profile stability. Neutral `1.0` when not established.
    pub fn get_seasonal_factor(&mut self, ts_ms: u64) -> f64 {
        if !self.is_pattern_established() {
            return 1.0;
        }

        let hour = hour_of_day(ts_ms);
        let day = day_of_week(ts_ms);
        let week = week_of_month(ts_ms).min(3);

        let hourly_factor = blend_toward_neutral(
            self.pattern.hourly_pattern[hour],
            self.pattern.hourly_confidence[hour],
        );

        let daily_mean = mean_nonzero(&self.pattern.daily_pattern);
        let daily_raw = self.pattern.daily_pattern[day] / daily_mean;
        let daily_factor = blend_toward_neutral(daily_raw, self.pattern.daily_confidence[day]);

        let weekly_mean = mean_nonzero(&self.pattern.weekly_pattern);
        let weekly_factor = self.pattern.weekly_pattern[week] / weekly_mean;

        let (hourly_fc, daily_fc, weekly_fc) = self.refresh_stability();

        let mut total_weight = hourly_fc + daily_fc + weekly_fc;
        let (wh, wd, ww) = if total_weight < 0.1 {
            total_weight = 1.0;
            (0.7, 0.2, 0.1)
        } else {
            (hourly_fc, daily_fc, weekly_fc)
        };

        (hourly_factor * wh + daily_factor * wd + weekly_factor * ww) / total_weight
    }

    /// `0.7*hour_confidence + 0.3*day_confidence`, scaled by the pattern's
    /// overall confidence score. `0.0` when not established.
    pub fn get_time_context_confidence(&self, ts_ms: u64) -> f64 {
        if !self.is_pattern_established() {
            return 0.0;
        }
        let hour = hour_of_day(ts_ms);
        let day = day_of_week(ts_ms);
        let raw = 0.7 * self.pattern.hourly_confidence[hour] + 0.3 * self.pattern.daily_confidence[day];
        raw * self.pattern.confidence_score
    }

    pub fn reset(&mut self) {
        self.observations.clear();
        self.pattern = SeasonalPattern::default();
        self.last_pattern_update_ms = 0;
    }

    pub fn get_memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.observations.capacity() * std::mem::size_of::<(u64, f64)>()
    }

    pub fn update_pattern(&mut self, now_ms: u64, force: bool) {
        if !force && now_ms.saturating_sub(self.last_pattern_update_ms) <= PATTERN_UPDATE_INTERVAL_MS
            && self.last_pattern_update_ms != 0
        {
            return;
        }
        self.last_pattern_update_ms = now_ms;

        let (hourly_pattern, hourly_confidence) = self.compute_hourly_pattern();
        let (daily_pattern, daily_confidence) = self.compute_daily_pattern();
        let (weekly_pattern, weekly_confidence) = self.compute_weekly_pattern();

        self.pattern.hourly_pattern = hourly_pattern;
        self.pattern.hourly_confidence = hourly_confidence;
        self.pattern.daily_pattern = daily_pattern;
        self.pattern.daily_confidence = daily_confidence;
        self.pattern.weekly_pattern = weekly_pattern;
        self.pattern.weekly_confidence = weekly_confidence;

        self.pattern.hourly_fourier = Self::compute_fourier_transform(&self.pattern.hourly_pattern);
        self.pattern.daily_fourier = Self::compute_fourier_transform(&self.pattern.daily_pattern);
        self.pattern.weekly_fourier = Self::compute_fourier_transform(&self.pattern.weekly_pattern);

        self.pattern.dominant_hourly_frequencies =
            Self::find_dominant_frequencies(&self.pattern.hourly_fourier, 3);
        self.pattern.dominant_daily_frequencies =
            Self::find_dominant_frequencies(&self.pattern.daily_fourier, 2);
        self.pattern.dominant_weekly_frequencies =
            Self::find_dominant_frequencies(&self.pattern.weekly_fourier, 2);

        self.pattern.observation_count = self.observations.len();
        self.pattern.last_updated = now_ms;
        self.pattern.confidence_score = self.calculate_pattern_confidence();
    }

    fn refresh_stability(&mut self) -> (f64, f64, f64) {
        let hourly_fc = spectral_fraction(&self.pattern.hourly_fourier, &self.pattern.dominant_hourly_frequencies);
        let daily_fc = spectral_fraction(&self.pattern.daily_fourier, &self.pattern.dominant_daily_frequencies);
        let weekly_fc = spectral_fraction(&self.pattern.weekly_fourier, &self.pattern.dominant_weekly_frequencies);
        self.pattern.hourly_stability = hourly_fc;
        self.pattern.daily_stability = daily_fc;
        self.pattern.weekly_stability = weekly_fc;
        (hourly_fc, daily_fc, weekly_fc)
    }

    fn calculate_pattern_confidence(&mut self) -> f64 {
        let base_confidence =
            (self.observations.len() as f64 / (self.min_samples_for_pattern * 2) as f64).min(1.0);
        let (hourly_fc, daily_fc, weekly_fc) = self.refresh_stability();
        let fourier_confidence = 0.6 * hourly_fc + 0.3 * daily_fc + 0.1 * weekly_fc;
        base_confidence * (0.7 + 0.3 * fourier_confidence)
    }

    fn compute_hourly_pattern(&self) -> ([f64; 24], [f64; 24]) {
        bucket_pattern(
            &self.observations,
            24,
            |ts| hour_of_day(ts),
            self.min_samples_for_pattern as f64 / 24.0,
            true,
        )
    }

    fn compute_daily_pattern(&self) -> ([f64; 7], [f64; 7]) {
        bucket_pattern(
            &self.observations,
            7,
            |ts| day_of_week(ts),
            self.min_samples_for_pattern as f64 / 7.0,
            false,
        )
    }

    fn compute_weekly_pattern(&self) -> ([f64; 4], [f64; 4]) {
        bucket_pattern(
            &self.observations,
            4,
            |ts| week_of_month(ts).min(3),
            self.min_samples_for_pattern as f64 / 4.0,
            false,
        )
    }

    fn compute_fourier_transform(profile: &[f64]) -> FourierCoefficients {
        let n = profile.len();
        let mut real = vec![0.0; n];
        let mut imaginary = vec![0.0; n];
        let mut magnitude = vec![0.0; n];
        let mut phase = vec![0.0; n];

        for k in 0..n {
            let mut real_sum = 0.0;
            let mut imag_sum = 0.0;
            for (t, &value) in profile.iter().enumerate() {
                let angle = 2.0 * std::f64::consts::PI * k as f64 * t as f64 / n as f64;
                real_sum += value * angle.cos();
                imag_sum -= value * angle.sin();
            }
            real[k] = real_sum / n as f64;
            imaginary[k] = imag_sum / n as f64;
            magnitude[k] = (real[k] * real[k] + imaginary[k] * imaginary[k]).sqrt();
            phase[k] = imaginary[k].atan2(real[k]);
        }

        FourierCoefficients {
            real,
            imaginary,
            magnitude,
            phase,
        }
    }

    fn reconstruct_from_fourier(fourier: &FourierCoefficients, t: f64) -> f64 {
        if fourier.real.is_empty() {
            return 1.0;
        }
        let n = fourier.real.len();
        let mut result = fourier.real[0];
        let limit = (n / 2).min(5);
        for k in 1..limit.max(1) {
            if k >= fourier.magnitude.len() {
                break;
            }
            if fourier.magnitude[k] > 0.1 * fourier.magnitude[0] {
                let angle = 2.0 * std::f64::consts::PI * k as f64 * t + fourier.phase[k];
                result += 2.0 * fourier.magnitude[k] * angle.cos();
            }
        }
        result.max(0.1)
    }

    fn find_dominant_frequencies(fourier: &FourierCoefficients, max_components: usize) -> Vec<usize> {
        if fourier.magnitude.len() <= 1 {
            return Vec::new();
        }
        let mut indexed: Vec<(usize, f64)> = fourier
            .magnitude
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, &m)| (i, m))
            .collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        indexed.into_iter().take(max_components).map(|(i, _)| i).collect()
    }
}

fn spectral_fraction(fourier: &FourierCoefficients, dominant: &[usize]) -> f64 {
    if fourier.magnitude.len() <= 1 {
        return 0.0;
    }
    let total_power: f64 = fourier.magnitude[1..].iter().map(|m| m * m).sum();
    if total_power <= 0.0 {
        return 0.0;
    }
    let dominant_power: f64 = dominant
        .iter()
        .filter_map(|&i| fourier.magnitude.get(i))
        .map(|m| m * m)
        .sum();
    (dominant_power / total_power).clamp(0.0, 1.0)
}

fn blend_toward_neutral(value: f64, confidence: f64) -> f64 {
    let confidence = confidence.clamp(0.0, 1.0);
    confidence * value + (1.0 - confidence) * 1.0
}

fn mean_nonzero(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean.abs() < 1e-9 {
        1.0
    } else {
        mean
    }
}

fn bucket_pattern<const N: usize>(
    observations: &[(u64, f64)],
    bucket_count: usize,
    bucket_of: impl Fn(u64) -> usize,
    samples_per_bucket_for_full_confidence: f64,
    normalize_by_global_mean: bool,
) -> ([f64; N], [f64; N]) {
    debug_assert_eq!(bucket_count, N);
    let mut sums = vec![0.0; bucket_count];
    let mut counts = vec![0usize; bucket_count];
    let mut sum_sq = vec![0.0; bucket_count];

    for &(ts, value) in observations {
        let bucket = bucket_of(ts).min(bucket_count - 1);
        sums[bucket] += value;
        sum_sq[bucket] += value * value;
        counts[bucket] += 1;
    }

    let mut means = vec![0.0; bucket_count];
    for i in 0..bucket_count {
        means[i] = if counts[i] > 0 {
            sums[i] / counts[i] as f64
        } else {
            0.0
        };
    }

    let global_mean = if observations.is_empty() {
        1.0
    } else {
        let total: f64 = observations.iter().map(|(_, v)| v).sum();
        let m = total / observations.len() as f64;
        if m.abs() < 1e-9 {
            1.0
        } else {
            m
        }
    };

    let mut pattern = [0.0; N];
    let mut confidence = [0.0; N];

    for i in 0..bucket_count {
        pattern[i] = if normalize_by_global_mean {
            means[i] / global_mean
        } else {
            means[i]
        };

        if counts[i] > 0 {
            let variance = if counts[i] > 1 {
                (sum_sq[i] / counts[i] as f64) - means[i] * means[i]
            } else {
                0.0
            }
            .max(0.0);
            let cv = variance.sqrt() / means[i].abs().max(0.1);
            let sample_confidence = (counts[i] as f64 / samples_per_bucket_for_full_confidence.max(1.0)).min(1.0);
            let variance_factor = (-cv).exp();
            confidence[i] = sample_confidence * variance_factor;
        } else {
            confidence[i] = 0.0;
        }
    }

    (pattern, confidence)
}

fn hour_of_day(ts_ms: u64) -> usize {
    local_datetime(ts_ms).hour() as usize
}

fn day_of_week(ts_ms: u64) -> usize {
    local_datetime(ts_ms).weekday().num_days_from_monday() as usize
}

fn week_of_month(ts_ms: u64) -> usize {
    (local_datetime(ts_ms).day() as usize - 1) / 7
}

fn local_datetime(ts_ms: u64) -> chrono::DateTime<chrono::Local> {
    chrono::Local
        .timestamp_millis_opt(ts_ms as i64)
        .single()
        .unwrap_or_else(|| chrono::Local.timestamp_opt(0, 0).single().expect("epoch is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unestablished_pattern_returns_neutral_values() {
        let model = SeasonalModel::new(1000);
        assert_eq!(model.get_expected_value(1_700_000_000_000), 1.0);
    }

    #[test]
    fn established_after_min_samples() {
        let mut model = SeasonalModel::new(10);
        for i in 0..10 {
            model.add_observation(1_700_000_000_000 + i * 1000, 5.0);
        }
        assert!(model.is_pattern_established());
    }

    #[test]
    fn observation_cap_drops_oldest() {
        let mut model = SeasonalModel::new(5);
        for i in 0..20 {
            model.add_observation(1_700_000_000_000 + i * 1000, i as f64);
        }
        assert!(model.observations.len() <= 10);
    }

    #[test]
    fn seasonal_factor_is_neutral_until_established() {
        let mut model = SeasonalModel::new(1000);
        assert_eq!(model.get_seasonal_factor(1_700_000_000_000), 1.0);
    }

    #[test]
    fn fourier_round_trips_constant_profile() {
        let profile = [10.0; 24];
        let fourier = SeasonalModel::compute_fourier_transform(&profile);
        assert!((fourier.real[0] - 10.0).abs() < 1e-9);
        assert!(fourier.magnitude[1] < 1e-6);
    }

    #[test]
    fn dominant_frequencies_skip_dc() {
        let profile = [1.0, 5.0, 1.0, 5.0, 1.0, 5.0, 1.0, 5.0];
        let fourier = SeasonalModel::compute_fourier_transform(&profile);
        let dominant = SeasonalModel::find_dominant_frequencies(&fourier, 2);
        assert!(!dominant.contains(&0));
    }
}
