use rand_mt::Mt;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::error::{ConfigError, Result};
use crate::seeds::Seed;

/// Sampling strategy for the per-seed uniform streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RandomGenerator {
    /// Plain MT19937 stream: `n` independent uniforms per seed.
    MersenneTwister,
    /// One jittered sample per stratum `[(k-1)/n, k/n)`, strata assigned to
    /// output positions by a seeded permutation.
    LatinHypercube,
}

/// Fills one output row from one seed. The `Vec<u32>` is permutation scratch
/// owned by the calling worker and fully rewritten on every call.
type RowFiller = fn(Seed, &mut [f64], &mut Vec<u32>);

impl RandomGenerator {
    /// Resolve the configuration identifier (0 = Mersenne-Twister,
    /// 1 = Latin-Hypercube).
    pub fn from_id(id: i64) -> std::result::Result<Self, ConfigError> {
        match id {
            0 => {
                info!("Random generator: MersenneTwister");
                Ok(RandomGenerator::MersenneTwister)
            }
            1 => {
                info!("Random generator: Latin Hypercube");
                Ok(RandomGenerator::LatinHypercube)
            }
            other => Err(ConfigError::UnknownRandomGenerator(other)),
        }
    }

    pub fn id(self) -> i64 {
        match self {
            RandomGenerator::MersenneTwister => 0,
            RandomGenerator::LatinHypercube => 1,
        }
    }

    fn row_filler(self) -> RowFiller {
        match self {
            RandomGenerator::MersenneTwister => fill_mersenne_twister,
            RandomGenerator::LatinHypercube => fill_latin_hypercube,
        }
    }

    /// Draw `n` uniforms for every seed: in `[0, 1)` for Mersenne-Twister,
    /// in `(0, 1]` for Latin-Hypercube (`(perm - u) / n`).
    ///
    /// Rows are filled in parallel; each row depends only on its own seed, so
    /// the result is identical for any thread count or seed partitioning.
    pub fn draw(self, seeds: &[Seed], n: usize) -> Result<Draws> {
        validate_sample_size(n)?;
        let fill = self.row_filler();
        let mut values = vec![0.0; seeds.len() * n];
        values
            .par_chunks_mut(n)
            .zip(seeds.par_iter())
            .for_each_init(Vec::new, |perms, (row, &seed)| fill(seed, row, perms));
        Ok(Draws { n_samples: n, values })
    }
}

impl TryFrom<i64> for RandomGenerator {
    type Error = ConfigError;

    fn try_from(id: i64) -> std::result::Result<Self, Self::Error> {
        RandomGenerator::from_id(id)
    }
}

pub(crate) fn validate_sample_size(n: usize) -> std::result::Result<(), ConfigError> {
    if n == 0 || n > i32::MAX as usize {
        return Err(ConfigError::InvalidSampleSize(n));
    }
    Ok(())
}

/// Row-major `seeds × n_samples` matrix of uniforms.
#[derive(Debug, Clone, PartialEq)]
pub struct Draws {
    n_samples: usize,
    values: Vec<f64>,
}

impl Draws {
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_rows(&self) -> usize {
        self.values.len() / self.n_samples
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.n_samples..(i + 1) * self.n_samples]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks_exact(self.n_samples)
    }
}

/// MT19937 reseeded through `init_genrand`, exposing the reference
/// conversions to doubles and bounded integers.
struct MtStream(Mt);

impl MtStream {
    fn new(seed: Seed) -> Self {
        MtStream(Mt::new(seed.value()))
    }

    /// `genrand_res53`: 53-bit resolution uniform in `[0, 1)`.
    #[inline]
    fn uniform(&mut self) -> f64 {
        let a = self.0.next_u32() >> 5;
        let b = self.0.next_u32() >> 6;
        (f64::from(a) * 67_108_864.0 + f64::from(b)) / 9_007_199_254_740_992.0
    }

    /// Uniform integer in `[0, bound)` by rejection on the top
    /// `bit_length(bound)` bits.
    #[inline]
    fn below(&mut self, bound: u32) -> u32 {
        let bits = u32::BITS - bound.leading_zeros();
        loop {
            let r = self.0.next_u32() >> (u32::BITS - bits);
            if r < bound {
                return r;
            }
        }
    }

    /// In-place Fisher–Yates, last position first.
    fn shuffle(&mut self, values: &mut [u32]) {
        for i in (1..values.len()).rev() {
            let j = self.below(i as u32 + 1) as usize;
            values.swap(i, j);
        }
    }
}

fn fill_mersenne_twister(seed: Seed, row: &mut [f64], _perms: &mut Vec<u32>) {
    let mut rng = MtStream::new(seed);
    for v in row.iter_mut() {
        *v = rng.uniform();
    }
}

fn fill_latin_hypercube(seed: Seed, row: &mut [f64], perms: &mut Vec<u32>) {
    let n = row.len();
    let mut rng = MtStream::new(seed);
    for v in row.iter_mut() {
        *v = rng.uniform();
    }

    perms.clear();
    perms.extend(1..=n as u32);
    rng.shuffle(perms);

    let n_f = n as f64;
    for (v, &p) in row.iter_mut().zip(perms.iter()) {
        *v = (f64::from(p) - *v) / n_f;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::Error;
    use crate::seeds::seed_for_group_event;
    use crate::types::{EventId, GroupId};

    fn golden_seed() -> Seed {
        seed_for_group_event(GroupId(7), EventId(42), 0)
    }

    fn pearson(a: &[f64], b: &[f64]) -> f64 {
        let n = a.len() as f64;
        let ma = a.iter().sum::<f64>() / n;
        let mb = b.iter().sum::<f64>() / n;
        let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
        let va: f64 = a.iter().map(|x| (x - ma).powi(2)).sum();
        let vb: f64 = b.iter().map(|y| (y - mb).powi(2)).sum();
        cov / (va.sqrt() * vb.sqrt())
    }

    // ── Selection ────────────────────────────────────────────────────────────

    #[test]
    fn selector_ids_round_trip() {
        assert_eq!(RandomGenerator::from_id(0).unwrap(), RandomGenerator::MersenneTwister);
        assert_eq!(RandomGenerator::from_id(1).unwrap(), RandomGenerator::LatinHypercube);
        assert_eq!(RandomGenerator::LatinHypercube.id(), 1);
        assert_eq!(RandomGenerator::try_from(0).unwrap().id(), 0);
    }

    #[test]
    fn unknown_selector_is_config_error() {
        assert_eq!(
            RandomGenerator::from_id(99),
            Err(ConfigError::UnknownRandomGenerator(99))
        );
    }

    #[test]
    fn zero_samples_rejected() {
        let err = RandomGenerator::MersenneTwister.draw(&[Seed::new(1)], 0).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidSampleSize(0))));
    }

    // ── Golden vectors ───────────────────────────────────────────────────────

    #[test]
    fn mt_reference_doubles_for_seed_5489() {
        // genrand_res53 after init_genrand(5489), the MT19937 reference default.
        let draws = RandomGenerator::MersenneTwister.draw(&[Seed::new(5489)], 3).unwrap();
        assert_eq!(
            draws.row(0),
            &[0.8147236863931789, 0.9057919370756192, 0.12698681629350606]
        );
    }

    #[test]
    fn golden_mersenne_twister_group_7_event_42() {
        let seed = golden_seed();
        assert_eq!(seed.value(), 78_543_155);
        let draws = RandomGenerator::from_id(0).unwrap().draw(&[seed], 4).unwrap();
        assert_eq!(
            draws.row(0),
            &[0.3036531243781686, 0.05465507465370911, 0.6877245060563367, 0.5836174260880891]
        );
    }

    #[test]
    fn golden_latin_hypercube_group_7_event_42() {
        let draws = RandomGenerator::from_id(1).unwrap().draw(&[golden_seed()], 4).unwrap();
        assert_eq!(
            draws.row(0),
            &[0.6740867189054578, 0.9863362313365727, 0.32806887348591585, 0.10409564347797773]
        );
    }

    // ── Reproducibility and independence ─────────────────────────────────────

    #[test]
    fn same_seed_reproduces_stream() {
        for generator in [RandomGenerator::MersenneTwister, RandomGenerator::LatinHypercube] {
            let a = generator.draw(&[Seed::new(12345)], 64).unwrap();
            let b = generator.draw(&[Seed::new(12345)], 64).unwrap();
            assert_eq!(a, b, "{generator:?} not reproducible");
        }
    }

    #[test]
    fn rows_do_not_depend_on_batch_composition() {
        let seeds = [Seed::new(1), Seed::new(2), Seed::new(3), Seed::new(1)];
        for generator in [RandomGenerator::MersenneTwister, RandomGenerator::LatinHypercube] {
            let batch = generator.draw(&seeds, 257).unwrap();
            assert_eq!(batch.n_rows(), 4);
            for (i, seed) in seeds.iter().enumerate() {
                let alone = generator.draw(&[*seed], 257).unwrap();
                assert_eq!(batch.row(i), alone.row(0), "{generator:?} row {i}");
            }
            assert_eq!(batch.row(0), batch.row(3));
        }
    }

    #[test]
    fn distinct_seeds_are_uncorrelated() {
        let n = 20_000;
        for generator in [RandomGenerator::MersenneTwister, RandomGenerator::LatinHypercube] {
            let d = generator.draw(&[Seed::new(101), Seed::new(202)], n).unwrap();
            let rho = pearson(d.row(0), d.row(1));
            assert!(rho.abs() < 0.05, "{generator:?}: correlation {rho:.4} too large");
            assert_ne!(d.row(0), d.row(1));
        }
    }

    #[test]
    fn mersenne_twister_mean_near_half() {
        let d = RandomGenerator::MersenneTwister.draw(&[Seed::new(7)], 10_000).unwrap();
        let mean = d.row(0).iter().sum::<f64>() / 10_000.0;
        assert!((mean - 0.5).abs() < 0.02, "mean {mean:.4}");
        assert!(d.row(0).iter().all(|&u| (0.0..1.0).contains(&u)));
    }

    #[test]
    fn empty_seed_list_yields_empty_matrix() {
        let d = RandomGenerator::LatinHypercube.draw(&[], 10).unwrap();
        assert_eq!(d.n_rows(), 0);
        assert_eq!(d.rows().count(), 0);
    }

    #[test]
    fn single_sample_latin_hypercube_is_one_stratum() {
        let d = RandomGenerator::LatinHypercube.draw(&[Seed::new(9)], 1).unwrap();
        assert!(d.row(0)[0] > 0.0 && d.row(0)[0] <= 1.0);
    }

    #[test]
    fn latin_hypercube_values_lie_above_zero_up_to_one() {
        let seeds: Vec<Seed> = (1..=50).map(Seed::new).collect();
        let d = RandomGenerator::LatinHypercube.draw(&seeds, 200).unwrap();
        assert!(d.rows().flatten().all(|&u| u > 0.0 && u <= 1.0));
    }

    proptest! {
        #[test]
        fn latin_hypercube_one_sample_per_stratum(seed in 0i64..(1 << 31), n in 1usize..400) {
            let d = RandomGenerator::LatinHypercube.draw(&[Seed::new(seed)], n).unwrap();
            let mut sorted = d.row(0).to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let n_f = n as f64;
            for (k, v) in sorted.iter().enumerate() {
                // Sample k (0-based) lies in stratum k: ((k)/n, (k+1)/n].
                prop_assert!(*v >= k as f64 / n_f - 1e-12, "v={} k={} n={}", v, k, n);
                prop_assert!(*v <= (k + 1) as f64 / n_f + 1e-12, "v={} k={} n={}", v, k, n);
            }
        }

        #[test]
        fn shuffle_is_a_permutation(seed in any::<u32>(), n in 1u32..300) {
            let mut rng = MtStream::new(Seed::new(i64::from(seed)));
            let mut perm: Vec<u32> = (1..=n).collect();
            rng.shuffle(&mut perm);
            perm.sort_unstable();
            prop_assert_eq!(perm, (1..=n).collect::<Vec<_>>());
        }
    }
}
