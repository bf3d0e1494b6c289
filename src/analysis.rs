use std::io::Read;

use crate::error::Result;
use crate::stream::{GulStreamReader, ItemBlock};
use crate::types::{EventId, ItemId};

/// Relative slack allowed when comparing single-precision losses.
const LOSS_TOLERANCE: f64 = 1e-4;

/// Distribution statistics for a continuous metric.
#[derive(Debug, Clone)]
pub struct DistStats {
    pub n: usize,
    pub min: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Linear interpolation between the order statistics around `p`.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let h = p * (sorted.len() - 1) as f64;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (h - lo as f64)
}

/// Sorts `values` in place. `None` when empty; the spread is the sample
/// standard deviation.
pub fn percentile_stats(values: &mut [f64]) -> Option<DistStats> {
    values.sort_unstable_by(f64::total_cmp);
    let sorted: &[f64] = values;
    let (&min, &max) = (sorted.first()?, sorted.last()?);
    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let sum_sq: f64 = sorted.iter().map(|x| (x - mean) * (x - mean)).sum();
    let std_dev = if n > 1 { (sum_sq / (n - 1) as f64).sqrt() } else { 0.0 };

    let [p5, p25, p50, p75, p95] = [0.05, 0.25, 0.5, 0.75, 0.95].map(|p| quantile(sorted, p));
    Some(DistStats { n, min, p5, p25, p50, p75, p95, max, mean, std_dev })
}

/// Totals for one event across all of its items.
#[derive(Debug, Clone)]
pub struct EventSummary {
    pub event_id: EventId,
    pub items: usize,
    pub tiv: f64,
    /// Sum of the items' analytical means.
    pub analytical_mean: f64,
    /// Distribution of the event's total loss over sample indices.
    pub sampled: DistStats,
}

impl EventSummary {
    /// Sampled minus analytical mean, relative to the analytical mean.
    pub fn mean_error(&self) -> f64 {
        if self.analytical_mean == 0.0 {
            return self.sampled.mean;
        }
        (self.sampled.mean - self.analytical_mean) / self.analytical_mean
    }
}

/// A block whose contents contradict its own summary records.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockViolation {
    /// A sampled loss is negative or above the item's max loss.
    LossOutOfRange { event_id: EventId, item_id: ItemId, sidx: i32, loss: f64, max_loss: f64 },
    /// Max loss exceeds TIV.
    MaxAboveTiv { event_id: EventId, item_id: ItemId, max_loss: f64, tiv: f64 },
    /// Chance of loss outside [0, 1].
    ChanceOfLossOutOfRange { event_id: EventId, item_id: ItemId, chance_of_loss: f64 },
    /// The event reappeared after blocks of another event.
    EventNotContiguous { event_id: EventId },
}

impl std::fmt::Display for BlockViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LossOutOfRange { event_id, item_id, sidx, loss, max_loss } => {
                write!(f, "LossOutOfRange event={} item={} sidx={sidx}: loss={loss} max={max_loss}", event_id.0, item_id.0)
            }
            Self::MaxAboveTiv { event_id, item_id, max_loss, tiv } => {
                write!(f, "MaxAboveTiv event={} item={}: max={max_loss} tiv={tiv}", event_id.0, item_id.0)
            }
            Self::ChanceOfLossOutOfRange { event_id, item_id, chance_of_loss } => {
                write!(f, "ChanceOfLossOutOfRange event={} item={}: {chance_of_loss}", event_id.0, item_id.0)
            }
            Self::EventNotContiguous { event_id } => {
                write!(f, "EventNotContiguous event={}", event_id.0)
            }
        }
    }
}

/// Check one block against its own summary records.
pub fn verify_block(block: &ItemBlock) -> Vec<BlockViolation> {
    let mut violations = Vec::new();
    let (event_id, item_id) = (block.event_id, block.item_id);
    let tiv = f64::from(block.tiv);
    let max_loss = f64::from(block.max_loss);
    let slack = LOSS_TOLERANCE * tiv.abs().max(1.0);

    if max_loss > tiv + slack {
        violations.push(BlockViolation::MaxAboveTiv { event_id, item_id, max_loss, tiv });
    }
    let chance_of_loss = f64::from(block.chance_of_loss);
    if !(-LOSS_TOLERANCE..=1.0 + LOSS_TOLERANCE).contains(&chance_of_loss) {
        violations.push(BlockViolation::ChanceOfLossOutOfRange { event_id, item_id, chance_of_loss });
    }
    for (k, &loss) in block.samples.iter().enumerate() {
        let loss = f64::from(loss);
        if loss < 0.0 || loss > max_loss + slack {
            violations.push(BlockViolation::LossOutOfRange {
                event_id,
                item_id,
                sidx: k as i32 + 1,
                loss,
                max_loss,
            });
        }
    }
    violations
}

#[derive(Debug, Clone)]
pub struct StreamSummary {
    pub sample_size: usize,
    pub blocks: usize,
    pub events: Vec<EventSummary>,
    pub violations: Vec<BlockViolation>,
}

/// Accumulates one event's blocks.
struct EventAccumulator {
    event_id: EventId,
    items: usize,
    tiv: f64,
    analytical_mean: f64,
    totals: Vec<f64>,
}

impl EventAccumulator {
    fn new(event_id: EventId, sample_size: usize) -> Self {
        EventAccumulator { event_id, items: 0, tiv: 0.0, analytical_mean: 0.0, totals: vec![0.0; sample_size] }
    }

    fn add(&mut self, block: &ItemBlock) {
        self.items += 1;
        self.tiv += f64::from(block.tiv);
        self.analytical_mean += f64::from(block.mean);
        for (t, &loss) in self.totals.iter_mut().zip(&block.samples) {
            *t += f64::from(loss);
        }
    }

    fn finish(mut self) -> Option<EventSummary> {
        let sampled = percentile_stats(&mut self.totals)?;
        Some(EventSummary {
            event_id: self.event_id,
            items: self.items,
            tiv: self.tiv,
            analytical_mean: self.analytical_mean,
            sampled,
        })
    }
}

/// Read a whole GUL stream, summarising each event and checking every block.
pub fn summarise_stream<R: Read>(reader: GulStreamReader<R>) -> Result<StreamSummary> {
    let sample_size = reader.sample_size();
    let mut summary = StreamSummary { sample_size, blocks: 0, events: Vec::new(), violations: Vec::new() };
    let mut seen = std::collections::HashSet::new();
    let mut current: Option<EventAccumulator> = None;

    for block in reader {
        let block = block?;
        summary.blocks += 1;
        summary.violations.extend(verify_block(&block));

        if current.as_ref().map(|acc| acc.event_id) != Some(block.event_id) {
            if let Some(done) = current.take().and_then(EventAccumulator::finish) {
                summary.events.push(done);
            }
            if !seen.insert(block.event_id) {
                summary.violations.push(BlockViolation::EventNotContiguous { event_id: block.event_id });
            }
            current = Some(EventAccumulator::new(block.event_id, sample_size));
        }
        if let Some(acc) = current.as_mut() {
            acc.add(&block);
        }
    }
    if let Some(done) = current.and_then(EventAccumulator::finish) {
        summary.events.push(done);
    }
    Ok(summary)
}

/// Distribution of each event's analytical mean loss across the stream.
pub fn event_mean_distribution(summary: &StreamSummary) -> Option<DistStats> {
    let mut means: Vec<f64> = summary.events.iter().map(|e| e.analytical_mean).collect();
    percentile_stats(&mut means)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::stream::GulStreamWriter;
    use crate::types::LossFloat;

    fn block(event_id: i32, item_id: i32, mean: f64, samples: &[f64]) -> ItemBlock {
        ItemBlock {
            event_id: EventId(event_id),
            item_id: ItemId(item_id),
            mean: mean as LossFloat,
            std_dev: 1.0,
            tiv: 100.0,
            chance_of_loss: 0.5,
            max_loss: 50.0,
            samples: samples.iter().map(|&s| s as LossFloat).collect(),
        }
    }

    fn stream_of(blocks: &[ItemBlock], sample_size: usize) -> GulStreamReader<Cursor<Vec<u8>>> {
        let mut w = GulStreamWriter::new(Vec::new(), sample_size).unwrap();
        for b in blocks {
            w.write_block(b).unwrap();
        }
        GulStreamReader::new(Cursor::new(w.into_inner())).unwrap()
    }

    // ── percentile_stats ─────────────────────────────────────────────────────

    #[test]
    fn percentile_stats_known_values() {
        let mut values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ds = percentile_stats(&mut values).unwrap();
        assert_eq!(ds.n, 5);
        assert!((ds.min - 1.0).abs() < 1e-10, "min");
        assert!((ds.max - 5.0).abs() < 1e-10, "max");
        assert!((ds.p50 - 3.0).abs() < 1e-10, "p50");
        assert!((ds.mean - 3.0).abs() < 1e-10, "mean");
        assert!((ds.p95 - 4.8).abs() < 1e-10, "p95");
        assert!((ds.std_dev - 2.5f64.sqrt()).abs() < 1e-10, "sample std dev");
    }

    #[test]
    fn percentile_stats_interpolates_between_points() {
        // p50 of [0.5, 1.0]: h = 0.5, frac = 0.5 → 0.75
        let mut values = vec![1.0, 0.5];
        let ds = percentile_stats(&mut values).unwrap();
        assert!((ds.p50 - 0.75).abs() < 1e-10);
    }

    #[test]
    fn percentile_stats_empty_returns_none() {
        assert!(percentile_stats(&mut []).is_none());
    }

    // ── Block checks ─────────────────────────────────────────────────────────

    #[test]
    fn consistent_block_has_no_violations() {
        assert!(verify_block(&block(1, 1, 10.0, &[0.0, 50.0, 12.5])).is_empty());
    }

    #[test]
    fn loss_above_max_flagged() {
        let v = verify_block(&block(1, 7, 10.0, &[0.0, 60.0]));
        assert_eq!(v.len(), 1);
        assert!(matches!(v[0], BlockViolation::LossOutOfRange { sidx: 2, .. }));
        assert!(v[0].to_string().starts_with("LossOutOfRange event=1 item=7 sidx=2"));
    }

    #[test]
    fn max_above_tiv_flagged() {
        let mut b = block(1, 1, 10.0, &[0.0]);
        b.max_loss = 150.0;
        assert!(verify_block(&b).iter().any(|v| matches!(v, BlockViolation::MaxAboveTiv { .. })));
    }

    // ── Stream summary ───────────────────────────────────────────────────────

    #[test]
    fn summary_totals_each_event() {
        let blocks = [
            block(1, 1, 10.0, &[10.0, 20.0]),
            block(1, 2, 5.0, &[0.0, 10.0]),
            block(2, 1, 3.0, &[4.0, 2.0]),
        ];
        let summary = summarise_stream(stream_of(&blocks, 2)).unwrap();
        assert_eq!(summary.blocks, 3);
        assert_eq!(summary.events.len(), 2);
        assert!(summary.violations.is_empty());

        let e1 = &summary.events[0];
        assert_eq!(e1.event_id, EventId(1));
        assert_eq!(e1.items, 2);
        assert!((e1.tiv - 200.0).abs() < 1e-9);
        assert!((e1.analytical_mean - 15.0).abs() < 1e-9);
        // totals per sidx: [10, 30]
        assert!((e1.sampled.mean - 20.0).abs() < 1e-9);
        assert!((e1.mean_error() - (20.0 - 15.0) / 15.0).abs() < 1e-9);

        let dist = event_mean_distribution(&summary).unwrap();
        assert_eq!(dist.n, 2);
        assert!((dist.max - 15.0).abs() < 1e-9);
    }

    #[test]
    fn interleaved_event_flagged() {
        let blocks = [block(1, 1, 1.0, &[1.0]), block(2, 1, 1.0, &[1.0]), block(1, 2, 1.0, &[1.0])];
        let summary = summarise_stream(stream_of(&blocks, 1)).unwrap();
        assert_eq!(summary.events.len(), 3);
        assert_eq!(summary.violations, vec![BlockViolation::EventNotContiguous { event_id: EventId(1) }]);
    }
}
