use crate::error::ConfigError;
use crate::records::ProbMean;
use crate::types::DamageKey;

/// Allowed distance of the final `prob_to` from 1.0; bins arrive in
/// single precision by default.
const PROB_TO_TOLERANCE: f64 = 1e-6;

/// Checks `bins` describe a proper CDF: non-empty, finite, `prob_to`
/// non-decreasing in `[0, 1]`, ending at 1.0.
pub fn validate_bins(key: DamageKey, bins: &[ProbMean]) -> Result<(), ConfigError> {
    let Some(last) = bins.last() else {
        return Err(ConfigError::EmptyCdf { key });
    };

    let mut prev = 0.0_f64;
    for (bin, b) in bins.iter().enumerate() {
        let p = f64::from(b.prob_to);
        let ok = p.is_finite()
            && f64::from(b.bin_mean).is_finite()
            && p >= prev
            && p <= 1.0 + PROB_TO_TOLERANCE;
        if !ok {
            return Err(ConfigError::NonMonotonicCdf { key, bin, value: p });
        }
        prev = p;
    }

    let last = f64::from(last.prob_to);
    if (last - 1.0).abs() > PROB_TO_TOLERANCE {
        return Err(ConfigError::CdfNotTerminated { key, last });
    }
    Ok(())
}

/// First bin whose `prob_to` exceeds `r`; the last bin if none does.
#[inline]
pub fn bin_index(bins: &[ProbMean], r: f64) -> usize {
    let i = bins.partition_point(|b| f64::from(b.prob_to) <= r);
    i.min(bins.len().saturating_sub(1))
}

/// Damage ratio sampled by uniform `r`.
#[inline]
pub fn sample_damage(bins: &[ProbMean], r: f64) -> f64 {
    f64::from(bins[bin_index(bins, r)].bin_mean)
}

/// Analytical moments of a damage CDF, as damage ratios (multiply by TIV
/// for losses).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageStats {
    pub mean: f64,
    pub std_dev: f64,
    /// Probability of a non-zero damage ratio.
    pub chance_of_loss: f64,
    /// Largest damage ratio carrying positive probability.
    pub max_damage: f64,
}

pub fn damage_stats(bins: &[ProbMean]) -> DamageStats {
    let mut mean = 0.0;
    let mut second_moment = 0.0;
    let mut chance_of_loss = 0.0;
    let mut max_damage = 0.0_f64;
    let mut prev = 0.0;

    for b in bins {
        let p_to = f64::from(b.prob_to);
        let m = f64::from(b.bin_mean);
        let p = p_to - prev;
        prev = p_to;
        if p <= 0.0 {
            continue;
        }
        mean += p * m;
        second_moment += p * m * m;
        if m > 0.0 {
            chance_of_loss += p;
        }
        max_damage = max_damage.max(m);
    }

    DamageStats {
        mean,
        std_dev: (second_moment - mean * mean).max(0.0).sqrt(),
        chance_of_loss,
        max_damage,
    }
}
