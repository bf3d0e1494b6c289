use rand::Rng;
use rand::seq::index;
use rand_distr::{Beta, Distribution, Exp1, LogNormal, Poisson};

use crate::error::ConfigError;
use crate::records::{CorrelationRecord, CoverageTivRecord, ItemRecord, ProbMean};
use crate::stream::CdfRecord;
use crate::types::{DamageKey, EventId, LossFloat};

/// Locations, each holding one coverage (and one item) per coverage type.
#[derive(Debug, Clone)]
pub struct PortfolioShape {
    pub locations: usize,
    /// Coverage types per location; coverage type `c` uses vulnerability `c + 1`.
    pub coverages_per_location: usize,
    pub areaperils: u32,
    /// ln-space TIV parameters.
    pub tiv_mu: f64,
    pub tiv_sigma: f64,
    /// Share of items placed in peril correlation group 1.
    pub correlated_fraction: f64,
    pub rho: f32,
}

impl Default for PortfolioShape {
    fn default() -> Self {
        PortfolioShape {
            locations: 1_000,
            coverages_per_location: 3,
            areaperils: 200,
            // median TIV ≈ 250k
            tiv_mu: 12.4,
            tiv_sigma: 0.8,
            correlated_fraction: 0.25,
            rho: 0.4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSetShape {
    pub events: usize,
    /// Poisson mean of the number of areaperils hit per event.
    pub mean_footprint: f64,
    /// Bins per damage CDF, including the zero-damage bin.
    pub bins: usize,
}

impl Default for EventSetShape {
    fn default() -> Self {
        EventSetShape { events: 100, mean_footprint: 20.0, bins: 10 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    pub items: Vec<ItemRecord>,
    pub coverages: Vec<CoverageTivRecord>,
    pub correlations: Vec<CorrelationRecord>,
    pub areaperils: u32,
    pub vulnerabilities: i32,
}

fn distribution_error(name: &'static str, e: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidDistribution { name, detail: e.to_string() }
}

pub fn generate_portfolio(shape: &PortfolioShape, rng: &mut impl Rng) -> Result<Portfolio, ConfigError> {
    if shape.areaperils == 0 {
        return Err(distribution_error("portfolio", "areaperils must be positive"));
    }
    let tiv = LogNormal::new(shape.tiv_mu, shape.tiv_sigma).map_err(|e| distribution_error("TIV", e))?;
    let correlated_fraction = shape.correlated_fraction.clamp(0.0, 1.0);

    let mut p = Portfolio {
        areaperils: shape.areaperils,
        vulnerabilities: shape.coverages_per_location as i32,
        ..Portfolio::default()
    };
    for loc in 0..shape.locations {
        let areaperil_id = rng.random_range(1..=shape.areaperils);
        for c in 0..shape.coverages_per_location {
            p.coverages.push(CoverageTivRecord { tiv: tiv.sample(rng).round() as LossFloat });
            let id = p.coverages.len() as i32;
            p.items.push(ItemRecord {
                item_id: id,
                coverage_id: id,
                areaperil_id,
                vulnerability_id: c as i32 + 1,
                group_id: loc as i32 + 1,
            });
            if rng.random_bool(correlated_fraction) {
                p.correlations.push(CorrelationRecord {
                    item_id: id,
                    peril_correlation_group: 1,
                    correlation_value: shape.rho,
                });
            }
        }
    }
    Ok(p)
}

/// A damage CDF centred on `intensity` in `[0, 1]`.
///
/// Bin 0 is the zero-damage bin; bin `k > 0` has mean damage ratio at the
/// midpoint of `[(k-1)/(bins-1), k/(bins-1)]`. Weights are jittered
/// exponentially around a bell at `intensity`.
pub fn damage_cdf(bins: usize, intensity: f64, rng: &mut impl Rng) -> Vec<ProbMean> {
    let bins = bins.max(1);
    if bins == 1 {
        return vec![ProbMean { prob_to: 1.0, bin_mean: 0.0 }];
    }
    let width = 1.0 / (bins - 1) as f64;
    let weights: Vec<f64> = (0..bins)
        .map(|k| {
            let centre = if k == 0 { 0.0 } else { (k as f64 - 0.5) * width };
            let jitter: f64 = Exp1.sample(rng);
            jitter * (-(centre - intensity).powi(2) / 0.02).exp() + 1e-9
        })
        .collect();
    let total: f64 = weights.iter().sum();

    let mut cum = 0.0;
    let mut out: Vec<ProbMean> = weights
        .iter()
        .enumerate()
        .map(|(k, w)| {
            cum += w / total;
            let mean = if k == 0 { 0.0 } else { (k as f64 - 0.5) * width };
            ProbMean { prob_to: cum.min(1.0) as LossFloat, bin_mean: mean as LossFloat }
        })
        .collect();
    if let Some(last) = out.last_mut() {
        last.prob_to = 1.0;
    }
    out
}

/// Damage-CDF records for events `1..=shape.events`, grouped by event and
/// keyed by every vulnerability on every hit areaperil.
pub fn generate_events(
    portfolio: &Portfolio,
    shape: &EventSetShape,
    rng: &mut impl Rng,
) -> Result<Vec<CdfRecord>, ConfigError> {
    let footprint = Poisson::new(shape.mean_footprint).map_err(|e| distribution_error("footprint", e))?;
    let intensity = Beta::new(2.0, 5.0).map_err(|e| distribution_error("intensity", e))?;
    let areaperils = portfolio.areaperils as usize;
    if areaperils == 0 {
        return Err(distribution_error("footprint", "portfolio has no areaperils"));
    }

    let mut out = Vec::new();
    for event in 1..=shape.events {
        let hits = (footprint.sample(rng) as usize).clamp(1, areaperils);
        let mut hit = index::sample(rng, areaperils, hits).into_vec();
        hit.sort_unstable();
        for ap in hit {
            let severity: f64 = intensity.sample(rng);
            for v in 1..=portfolio.vulnerabilities {
                // Higher vulnerability ids are more fragile.
                let local = (severity * (1.0 + 0.25 * (v - 1) as f64)).min(1.0);
                out.push(CdfRecord {
                    event_id: EventId(event as i32),
                    key: DamageKey::new(ap as u32 + 1, v),
                    bins: damage_cdf(shape.bins, local, rng),
                });
            }
        }
    }
    Ok(out)
}
