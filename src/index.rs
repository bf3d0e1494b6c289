use std::collections::{BTreeMap, HashMap, HashSet};

use crate::cdf::validate_bins;
use crate::correlation::validate_rho;
use crate::error::{IntegrityError, Result};
use crate::records::{CorrelationRecord, CoverageRecord, CoverageTivRecord, ItemData, ItemRecord, ProbMean};
use crate::types::{CoverageId, DamageKey, GroupId, ItemId, LossFloat, PerilCorrelationGroup};

// ── Coverage arena ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CoverageArena {
    /// `coverages[id - 1]` describes coverage `id`.
    coverages: Vec<CoverageRecord>,
    items: Vec<ItemData>,
    /// Coverages with at least one item this event, in first-push order.
    touched: Vec<CoverageId>,
}

impl CoverageArena {
    /// Two-pass layout: count items per coverage, then prefix-sum the
    /// start offsets. Every id in `item_coverages` must be in `1..=tivs.len()`.
    pub fn new(tivs: &[LossFloat], item_coverages: &[(ItemId, CoverageId)]) -> Result<Self> {
        let mut coverages: Vec<CoverageRecord> = tivs
            .iter()
            .map(|&tiv| CoverageRecord { tiv, max_items: 0, start_items: 0, cur_items: 0 })
            .collect();

        for &(item_id, coverage_id) in item_coverages {
            let slot = slot(coverage_id, coverages.len())
                .ok_or(IntegrityError::UnknownCoverage { item_id, coverage_id })?;
            coverages[slot].max_items += 1;
        }

        let mut start = 0;
        for c in &mut coverages {
            c.start_items = start;
            start += c.max_items;
        }

        Ok(CoverageArena {
            coverages,
            items: vec![ItemData { item_id: 0, damagecdf_i: -1, rng_index: -1 }; start as usize],
            touched: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.coverages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coverages.is_empty()
    }

    pub fn coverage(&self, coverage_id: CoverageId) -> Option<&CoverageRecord> {
        slot(coverage_id, self.coverages.len()).map(|s| &self.coverages[s])
    }

    /// Empty every slice touched since the last reset.
    pub fn reset(&mut self) {
        for id in self.touched.drain(..) {
            if let Some(s) = slot(id, self.coverages.len()) {
                self.coverages[s].cur_items = 0;
            }
        }
    }

    pub fn push(&mut self, coverage_id: CoverageId, item: ItemData) -> Result<()> {
        let s = slot(coverage_id, self.coverages.len()).ok_or(IntegrityError::UnknownCoverage {
            item_id: ItemId(item.item_id),
            coverage_id,
        })?;
        let c = &mut self.coverages[s];
        if c.cur_items >= c.max_items {
            return Err(IntegrityError::CoverageOverflow { coverage_id, max_items: c.max_items }.into());
        }
        if c.cur_items == 0 {
            self.touched.push(coverage_id);
        }
        self.items[(c.start_items + c.cur_items) as usize] = item;
        c.cur_items += 1;
        Ok(())
    }

    /// Items pushed into `coverage_id` since the last reset.
    pub fn items(&self, coverage_id: CoverageId) -> &[ItemData] {
        match self.coverage(coverage_id) {
            Some(c) => {
                let start = c.start_items as usize;
                &self.items[start..start + c.cur_items as usize]
            }
            None => &[],
        }
    }

    pub fn touched(&self) -> &[CoverageId] {
        &self.touched
    }
}

#[inline]
fn slot(coverage_id: CoverageId, len: usize) -> Option<usize> {
    let id = usize::try_from(coverage_id.0).ok()?;
    (1..=len).contains(&id).then(|| id - 1)
}

// ── Item map ─────────────────────────────────────────────────────────────────

/// One item exposed to a damage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemMapEntry {
    pub item_id: ItemId,
    pub coverage_id: CoverageId,
    pub group_id: GroupId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemCorrelation {
    pub group: PerilCorrelationGroup,
    pub rho: f64,
}

#[derive(Debug, Clone)]
pub struct ItemIndex {
    item_map: HashMap<DamageKey, Vec<ItemMapEntry>>,
    correlations: HashMap<ItemId, ItemCorrelation>,
    arena: CoverageArena,
}

impl ItemIndex {
    pub fn build(
        items: &[ItemRecord],
        coverages: &[CoverageTivRecord],
        correlations: &[CorrelationRecord],
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(items.len());
        let mut item_map: HashMap<DamageKey, Vec<ItemMapEntry>> = HashMap::new();
        let mut item_coverages = Vec::with_capacity(items.len());

        for rec in items {
            let item_id = ItemId(rec.item_id);
            if !seen.insert(item_id) {
                return Err(IntegrityError::DuplicateItem(item_id).into());
            }
            let coverage_id = CoverageId(rec.coverage_id);
            item_coverages.push((item_id, coverage_id));
            item_map
                .entry(DamageKey::new(rec.areaperil_id, rec.vulnerability_id))
                .or_default()
                .push(ItemMapEntry { item_id, coverage_id, group_id: GroupId(rec.group_id) });
        }

        let tivs: Vec<LossFloat> = coverages.iter().map(|c| c.tiv).collect();
        let arena = CoverageArena::new(&tivs, &item_coverages)?;

        let mut corr = HashMap::with_capacity(correlations.len());
        for rec in correlations {
            let rho = f64::from(rec.correlation_value);
            validate_rho(Some(rec.peril_correlation_group), rho)?;
            corr.insert(
                ItemId(rec.item_id),
                ItemCorrelation { group: PerilCorrelationGroup(rec.peril_correlation_group), rho },
            );
        }

        Ok(ItemIndex { item_map, correlations: corr, arena })
    }

    /// Items exposed to `key`, in item-table order. Empty if none.
    pub fn items_for(&self, key: &DamageKey) -> &[ItemMapEntry] {
        self.item_map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn correlation(&self, item_id: ItemId) -> Option<ItemCorrelation> {
        self.correlations.get(&item_id).copied()
    }

    /// True when any item will be sampled through the copula.
    pub fn has_correlations(&self) -> bool {
        self.correlations.values().any(|c| c.rho > 0.0)
    }

    /// Replace the coefficient of every item in a listed peril correlation
    /// group.
    pub fn override_group_rho(&mut self, overrides: &BTreeMap<i32, f64>) -> Result<()> {
        for (&group, &rho) in overrides {
            validate_rho(Some(group), rho)?;
        }
        for c in self.correlations.values_mut() {
            if let Some(&rho) = overrides.get(&c.group.0) {
                c.rho = rho;
            }
        }
        Ok(())
    }

    pub fn n_items(&self) -> usize {
        self.item_map.values().map(Vec::len).sum()
    }

    /// Hand the arena sized for this item table to its owner. Later calls
    /// return an empty arena.
    pub fn take_arena(&mut self) -> CoverageArena {
        std::mem::take(&mut self.arena)
    }
}

// ── Damage CDF table ─────────────────────────────────────────────────────────

/// Where one damage CDF sits in the flat bin store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdfLocator {
    pub offset: u32,
    pub len: u32,
}

#[derive(Debug, Clone, Default)]
pub struct DamageCdfTable {
    bins: Vec<ProbMean>,
    locators: Vec<CdfLocator>,
    keys: HashMap<DamageKey, i32>,
}

impl DamageCdfTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bins.clear();
        self.locators.clear();
        self.keys.clear();
    }

    /// Validate and append a CDF; returns its `damagecdf_i`. A repeated key
    /// is re-pointed at the newest bins.
    pub fn insert(&mut self, key: DamageKey, bins: &[ProbMean]) -> Result<i32> {
        validate_bins(key, bins)?;
        let damagecdf_i = self.locators.len() as i32;
        self.locators.push(CdfLocator { offset: self.bins.len() as u32, len: bins.len() as u32 });
        self.bins.extend_from_slice(bins);
        self.keys.insert(key, damagecdf_i);
        Ok(damagecdf_i)
    }

    pub fn locate(&self, key: &DamageKey) -> Result<i32> {
        self.keys
            .get(key)
            .copied()
            .ok_or_else(|| IntegrityError::CdfLookupMiss { key: *key }.into())
    }

    pub fn locator(&self, damagecdf_i: i32) -> CdfLocator {
        self.locators[damagecdf_i as usize]
    }

    pub fn bins(&self, damagecdf_i: i32) -> &[ProbMean] {
        let loc = self.locator(damagecdf_i);
        &self.bins[loc.offset as usize..(loc.offset + loc.len) as usize]
    }

    pub fn len(&self) -> usize {
        self.locators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, Error};

    fn item(item_id: i32, coverage_id: i32, areaperil_id: u32, vulnerability_id: i32, group_id: i32) -> ItemRecord {
        ItemRecord { item_id, coverage_id, areaperil_id, vulnerability_id, group_id }
    }

    fn tivs(values: &[f64]) -> Vec<CoverageTivRecord> {
        values.iter().map(|&v| CoverageTivRecord { tiv: v as LossFloat }).collect()
    }

    fn data(item_id: i32) -> ItemData {
        ItemData { item_id, damagecdf_i: 0, rng_index: 0 }
    }

    fn pm(prob_to: f64, bin_mean: f64) -> ProbMean {
        ProbMean { prob_to: prob_to as LossFloat, bin_mean: bin_mean as LossFloat }
    }

    // ── Arena ────────────────────────────────────────────────────────────────

    #[test]
    fn arena_lays_out_contiguous_slices() {
        let pairs = [
            (ItemId(1), CoverageId(2)),
            (ItemId(2), CoverageId(1)),
            (ItemId(3), CoverageId(2)),
            (ItemId(4), CoverageId(3)),
        ];
        let arena = CoverageArena::new(&[10.0, 20.0, 30.0], &pairs).unwrap();
        let c1 = arena.coverage(CoverageId(1)).unwrap();
        let c2 = arena.coverage(CoverageId(2)).unwrap();
        let c3 = arena.coverage(CoverageId(3)).unwrap();
        assert_eq!((c1.start_items, c1.max_items), (0, 1));
        assert_eq!((c2.start_items, c2.max_items), (1, 2));
        assert_eq!((c3.start_items, c3.max_items), (3, 1));
        assert_eq!(c2.tiv, 20.0);
    }

    #[test]
    fn push_fills_slice_and_reset_empties_it() {
        let pairs = [(ItemId(1), CoverageId(1)), (ItemId(2), CoverageId(1))];
        let mut arena = CoverageArena::new(&[5.0], &pairs).unwrap();
        arena.push(CoverageId(1), data(2)).unwrap();
        arena.push(CoverageId(1), data(1)).unwrap();
        let ids: Vec<i32> = arena.items(CoverageId(1)).iter().map(|d| d.item_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(arena.touched(), &[CoverageId(1)]);

        arena.reset();
        assert!(arena.items(CoverageId(1)).is_empty());
        assert!(arena.touched().is_empty());
        assert_eq!(arena.coverage(CoverageId(1)).unwrap().cur_items, 0);
    }

    #[test]
    fn push_beyond_max_items_is_integrity_error() {
        let mut arena = CoverageArena::new(&[5.0], &[(ItemId(1), CoverageId(1))]).unwrap();
        arena.push(CoverageId(1), data(1)).unwrap();
        let err = arena.push(CoverageId(1), data(1)).unwrap_err();
        assert!(matches!(
            err,
            Error::Integrity(IntegrityError::CoverageOverflow { max_items: 1, .. })
        ));
    }

    #[test]
    fn unknown_coverage_rejected() {
        let err = CoverageArena::new(&[5.0], &[(ItemId(9), CoverageId(2))]).unwrap_err();
        assert!(matches!(
            err,
            Error::Integrity(IntegrityError::UnknownCoverage { item_id: ItemId(9), coverage_id: CoverageId(2) })
        ));
        assert!(CoverageArena::new(&[5.0], &[(ItemId(9), CoverageId(0))]).is_err());
    }

    // ── Item index ───────────────────────────────────────────────────────────

    #[test]
    fn item_map_groups_items_by_damage_key() {
        let items = [item(1, 1, 100, 7, 1), item(2, 1, 100, 7, 2), item(3, 2, 101, 7, 3)];
        let mut index = ItemIndex::build(&items, &tivs(&[1.0, 2.0]), &[]).unwrap();
        let hits = index.items_for(&DamageKey::new(100, 7));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].item_id, ItemId(1));
        assert_eq!(hits[1].group_id, GroupId(2));
        assert!(index.items_for(&DamageKey::new(999, 7)).is_empty());
        assert_eq!(index.n_items(), 3);
        assert_eq!(index.take_arena().len(), 2);
    }

    #[test]
    fn arena_is_moved_out_once() {
        let items = [item(1, 1, 100, 7, 1), item(2, 2, 100, 7, 1)];
        let mut index = ItemIndex::build(&items, &tivs(&[1.0, 2.0]), &[]).unwrap();
        let mut arena = index.take_arena();
        arena.push(CoverageId(2), data(2)).unwrap();
        assert_eq!(arena.items(CoverageId(2)).len(), 1);

        let rest = index.take_arena();
        assert!(rest.is_empty());
        assert!(rest.coverage(CoverageId(1)).is_none());
        assert_eq!(index.items_for(&DamageKey::new(100, 7)).len(), 2);
    }

    #[test]
    fn duplicate_item_rejected() {
        let items = [item(1, 1, 100, 7, 1), item(1, 1, 101, 7, 1)];
        let err = ItemIndex::build(&items, &tivs(&[1.0]), &[]).unwrap_err();
        assert!(matches!(err, Error::Integrity(IntegrityError::DuplicateItem(ItemId(1)))));
    }

    #[test]
    fn correlations_validated_and_indexed() {
        let items = [item(1, 1, 100, 7, 1)];
        let ok = [CorrelationRecord { item_id: 1, peril_correlation_group: 4, correlation_value: 0.3 }];
        let index = ItemIndex::build(&items, &tivs(&[1.0]), &ok).unwrap();
        let c = index.correlation(ItemId(1)).unwrap();
        assert_eq!(c.group, PerilCorrelationGroup(4));
        assert!((c.rho - 0.3).abs() < 1e-6);
        assert!(index.correlation(ItemId(2)).is_none());

        let bad = [CorrelationRecord { item_id: 1, peril_correlation_group: 4, correlation_value: 1.5 }];
        let err = ItemIndex::build(&items, &tivs(&[1.0]), &bad).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::CorrelationOutOfRange { group: Some(4), .. })
        ));
    }

    #[test]
    fn group_rho_override_applies_per_group() {
        let items = [item(1, 1, 100, 7, 1), item(2, 1, 100, 7, 1)];
        let corr = [
            CorrelationRecord { item_id: 1, peril_correlation_group: 4, correlation_value: 0.0 },
            CorrelationRecord { item_id: 2, peril_correlation_group: 5, correlation_value: 0.2 },
        ];
        let mut index = ItemIndex::build(&items, &tivs(&[1.0]), &corr).unwrap();
        assert!(index.has_correlations());

        index.override_group_rho(&BTreeMap::from([(4, 0.9), (5, 0.0)])).unwrap();
        assert_eq!(index.correlation(ItemId(1)).unwrap().rho, 0.9);
        assert_eq!(index.correlation(ItemId(2)).unwrap().rho, 0.0);

        index.override_group_rho(&BTreeMap::from([(4, 0.0)])).unwrap();
        assert!(!index.has_correlations());

        assert!(index.override_group_rho(&BTreeMap::from([(4, -0.5)])).is_err());
    }

    // ── CDF table ────────────────────────────────────────────────────────────

    #[test]
    fn cdf_table_locates_bins() {
        let mut table = DamageCdfTable::new();
        let a = table.insert(DamageKey::new(1, 1), &[pm(1.0, 0.5)]).unwrap();
        let b = table.insert(DamageKey::new(2, 1), &[pm(0.4, 0.0), pm(1.0, 0.2)]).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(table.locator(b), CdfLocator { offset: 1, len: 2 });
        assert_eq!(table.bins(b).len(), 2);
        assert_eq!(table.locate(&DamageKey::new(2, 1)).unwrap(), 1);
        assert_eq!(table.len(), 2);

        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn cdf_lookup_miss_is_integrity_error() {
        let table = DamageCdfTable::new();
        let err = table.locate(&DamageKey::new(5, 5)).unwrap_err();
        assert!(matches!(err, Error::Integrity(IntegrityError::CdfLookupMiss { .. })));
    }

    #[test]
    fn invalid_cdf_not_inserted() {
        let mut table = DamageCdfTable::new();
        assert!(table.insert(DamageKey::new(1, 1), &[pm(0.5, 0.1)]).is_err());
        assert!(table.is_empty());
    }
}
