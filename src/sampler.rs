use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cdf::{damage_stats, sample_damage};
use crate::config::SamplerConfig;
use crate::correlation::GaussianCopula;
use crate::error::Result;
use crate::index::{CoverageArena, DamageCdfTable, ItemIndex};
use crate::random::{Draws, RandomGenerator};
use crate::records::ItemData;
use crate::seeds::{Seed, seed_for_group_event, seed_vector_for_correlation_groups};
use crate::stream::{CdfRecord, ItemBlock};
use crate::types::{CoverageId, EventId, GroupId, ItemId, LossFloat, PerilCorrelationGroup};

pub struct GulSampler {
    base_seed: i64,
    sample_size: usize,
    generator: RandomGenerator,
    /// Built only when some item is sampled with `rho > 0`.
    copula: Option<GaussianCopula>,
    index: ItemIndex,
    arena: CoverageArena,
    cdfs: DamageCdfTable,
}

/// Row assignments for one event.
#[derive(Debug, Default)]
struct EventRows {
    groups: Vec<GroupId>,
    group_rows: HashMap<GroupId, usize>,
    corr_groups: Vec<PerilCorrelationGroup>,
    corr_rows: HashMap<PerilCorrelationGroup, usize>,
}

impl EventRows {
    fn group_row(&mut self, group_id: GroupId) -> usize {
        *self.group_rows.entry(group_id).or_insert_with(|| {
            self.groups.push(group_id);
            self.groups.len() - 1
        })
    }

    fn corr_row(&mut self, group: PerilCorrelationGroup) -> usize {
        *self.corr_rows.entry(group).or_insert_with(|| {
            self.corr_groups.push(group);
            self.corr_groups.len() - 1
        })
    }
}

impl GulSampler {
    /// Validates `config`, applies its group coefficients to `index` and
    /// builds the copula tables if any item needs them.
    pub fn new(config: &SamplerConfig, mut index: ItemIndex) -> Result<Self> {
        config.validate()?;
        let generator = config.generator()?;
        index.override_group_rho(&config.correlations)?;

        let copula = if index.has_correlations() {
            Some(GaussianCopula::from_grids(config.inv_cdf_grid, config.cdf_grid)?)
        } else {
            info!("No correlated items; skipping copula tables");
            None
        };

        let arena = index.take_arena();
        Ok(GulSampler {
            base_seed: config.base_seed,
            sample_size: config.sample_size,
            generator,
            copula,
            arena,
            index,
            cdfs: DamageCdfTable::new(),
        })
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn generator(&self) -> RandomGenerator {
        self.generator
    }

    /// One block per exposed item, ordered by coverage id and then by the
    /// order the item's CDF appeared in `records`.
    pub fn sample_event(&mut self, event_id: EventId, records: &[CdfRecord]) -> Result<Vec<ItemBlock>> {
        self.cdfs.clear();
        self.arena.reset();
        let mut rows = EventRows::default();

        for rec in records {
            let exposed = self.index.items_for(&rec.key);
            if exposed.is_empty() {
                warn!(event_id = event_id.0, key = ?rec.key, "damage CDF has no mapped items");
                continue;
            }
            let damagecdf_i = self.cdfs.insert(rec.key, &rec.bins)?;
            for entry in exposed {
                let rng_index = rows.group_row(entry.group_id) as i32;
                if let Some(c) = self.index.correlation(entry.item_id).filter(|c| c.rho > 0.0) {
                    rows.corr_row(c.group);
                }
                self.arena.push(
                    entry.coverage_id,
                    ItemData { item_id: entry.item_id.0, damagecdf_i, rng_index },
                )?;
            }
        }

        let group_seeds: Vec<Seed> = rows
            .groups
            .iter()
            .map(|&g| seed_for_group_event(g, event_id, self.base_seed))
            .collect();
        let corr_seeds = seed_vector_for_correlation_groups(&rows.corr_groups, event_id, self.base_seed);

        debug!(
            event_id = event_id.0,
            cdfs = self.cdfs.len(),
            groups = group_seeds.len(),
            correlated_groups = corr_seeds.len(),
            "sampling event"
        );

        let independent = self.generator.draw(&group_seeds, self.sample_size)?;
        let correlated = self.generator.draw(&corr_seeds, self.sample_size)?;

        let mut touched = self.arena.touched().to_vec();
        touched.sort_unstable();
        let staged: Vec<(LossFloat, ItemData)> = touched
            .iter()
            .flat_map(|&cov| {
                let tiv = self.tiv(cov);
                self.arena.items(cov).iter().map(move |&item| (tiv, item))
            })
            .collect();

        staged
            .par_iter()
            .map(|&(tiv, item)| self.sample_item(event_id, tiv, item, &independent, &correlated, &rows))
            .collect()
    }

    fn tiv(&self, coverage_id: CoverageId) -> LossFloat {
        self.arena.coverage(coverage_id).map_or(0.0, |c| c.tiv)
    }

    fn sample_item(
        &self,
        event_id: EventId,
        tiv: LossFloat,
        item: ItemData,
        independent: &Draws,
        correlated: &Draws,
        rows: &EventRows,
    ) -> Result<ItemBlock> {
        let item_id = ItemId(item.item_id);
        let bins = self.cdfs.bins(item.damagecdf_i);
        let own = independent.row(item.rng_index as usize);

        let shared = self
            .index
            .correlation(item_id)
            .filter(|c| c.rho > 0.0)
            .and_then(|c| rows.corr_rows.get(&c.group).map(|&r| (correlated.row(r), c.rho)));

        let tiv64 = f64::from(tiv);
        let to_loss = |r: f64| (tiv64 * sample_damage(bins, r)) as LossFloat;
        let samples: Vec<LossFloat> = match (shared, &self.copula) {
            (Some((shared, rho)), Some(copula)) => {
                copula.correlate(shared, own, rho)?.into_iter().map(to_loss).collect()
            }
            _ => own.iter().copied().map(to_loss).collect(),
        };

        let stats = damage_stats(bins);
        Ok(ItemBlock {
            event_id,
            item_id,
            mean: (tiv64 * stats.mean) as LossFloat,
            std_dev: (tiv64 * stats.std_dev) as LossFloat,
            tiv,
            chance_of_loss: stats.chance_of_loss as LossFloat,
            max_loss: (tiv64 * stats.max_damage) as LossFloat,
            samples,
        })
    }
}
