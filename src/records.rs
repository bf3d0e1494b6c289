//! Fixed-layout binary records exchanged with upstream and downstream stages.
//!
//! Every field is little-endian. Integers are 32-bit; loss and TIV fields are
//! [`LossFloat`] wide, so every `SIZE` below is fixed at build time. Field
//! order is part of the wire contract:
//!
//! ```text
//! ItemRecord         item_id i32 | coverage_id i32 | areaperil_id u32 | vulnerability_id i32 | group_id i32
//! CoverageTivRecord  tiv F
//! CorrelationRecord  item_id i32 | peril_correlation_group i32 | correlation_value f32
//! ItemData           item_id i32 | damagecdf_i i32 | rng_index i32
//! CoverageRecord     tiv F | max_items i32 | start_items i32 | cur_items i32
//! DamageCdfHeader    event_id i32 | areaperil_id u32 | vulnerability_id i32 | bin_count i32
//! ProbMean           prob_to F | bin_mean F
//! SampleHeader       event_id i32 | item_id i32
//! SampleRecord       sidx i32 | loss F
//! ```

use std::path::Path;

use crate::error::{IntegrityError, Result};
use crate::types::{LOSS_FLOAT_SIZE, LossFloat};

/// Stream type id written before a damage-CDF stream.
pub const CDF_STREAM_TYPE: i32 = 0x0000_0001;
/// Stream type id written before a GUL item sample stream.
pub const GUL_ITEM_STREAM_TYPE: i32 = 0x0100_0001;

pub trait Record: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;
    /// Name used in integrity errors.
    const NAME: &'static str;

    fn encode(&self, out: &mut Vec<u8>);

    /// Decode from exactly `SIZE` bytes.
    fn decode(fields: &mut Fields<'_>) -> Self;
}

/// Sequential little-endian field reader over a record-sized slice.
pub struct Fields<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Fields { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        buf
    }

    pub fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take::<4>())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take::<4>())
    }

    pub fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take::<4>())
    }

    pub fn loss(&mut self) -> LossFloat {
        LossFloat::from_le_bytes(self.take::<LOSS_FLOAT_SIZE>())
    }
}

/// Decode one record, rejecting any slice that is not exactly `R::SIZE` long.
pub fn decode_one<R: Record>(bytes: &[u8]) -> Result<R> {
    if bytes.len() != R::SIZE {
        return Err(IntegrityError::MalformedRecord {
            record: R::NAME,
            len: bytes.len(),
            size: R::SIZE,
        }
        .into());
    }
    Ok(R::decode(&mut Fields::new(bytes)))
}

/// Decode a whole table. The length must be a multiple of `R::SIZE`.
pub fn decode_all<R: Record>(bytes: &[u8]) -> Result<Vec<R>> {
    if bytes.len() % R::SIZE != 0 {
        return Err(IntegrityError::MalformedRecord {
            record: R::NAME,
            len: bytes.len(),
            size: R::SIZE,
        }
        .into());
    }
    Ok(bytes
        .chunks_exact(R::SIZE)
        .map(|chunk| R::decode(&mut Fields::new(chunk)))
        .collect())
}

pub fn encode_all<R: Record>(records: &[R]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * R::SIZE);
    for r in records {
        r.encode(&mut out);
    }
    out
}

/// Load a whole table file.
pub fn read_table<R: Record>(path: impl AsRef<Path>) -> Result<Vec<R>> {
    decode_all(&std::fs::read(path)?)
}

pub fn write_table<R: Record>(path: impl AsRef<Path>, records: &[R]) -> Result<()> {
    std::fs::write(path, encode_all(records))?;
    Ok(())
}

// ── Input tables ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemRecord {
    pub item_id: i32,
    pub coverage_id: i32,
    pub areaperil_id: u32,
    pub vulnerability_id: i32,
    pub group_id: i32,
}

impl Record for ItemRecord {
    const SIZE: usize = 20;
    const NAME: &'static str = "items";

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.item_id.to_le_bytes());
        out.extend_from_slice(&self.coverage_id.to_le_bytes());
        out.extend_from_slice(&self.areaperil_id.to_le_bytes());
        out.extend_from_slice(&self.vulnerability_id.to_le_bytes());
        out.extend_from_slice(&self.group_id.to_le_bytes());
    }

    fn decode(f: &mut Fields<'_>) -> Self {
        ItemRecord {
            item_id: f.i32(),
            coverage_id: f.i32(),
            areaperil_id: f.u32(),
            vulnerability_id: f.i32(),
            group_id: f.i32(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageTivRecord {
    pub tiv: LossFloat,
}

impl Record for CoverageTivRecord {
    const SIZE: usize = LOSS_FLOAT_SIZE;
    const NAME: &'static str = "coverages";

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tiv.to_le_bytes());
    }

    fn decode(f: &mut Fields<'_>) -> Self {
        CoverageTivRecord { tiv: f.loss() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationRecord {
    pub item_id: i32,
    pub peril_correlation_group: i32,
    pub correlation_value: f32,
}

impl Record for CorrelationRecord {
    const SIZE: usize = 12;
    const NAME: &'static str = "correlations";

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.item_id.to_le_bytes());
        out.extend_from_slice(&self.peril_correlation_group.to_le_bytes());
        out.extend_from_slice(&self.correlation_value.to_le_bytes());
    }

    fn decode(f: &mut Fields<'_>) -> Self {
        CorrelationRecord {
            item_id: f.i32(),
            peril_correlation_group: f.i32(),
            correlation_value: f.f32(),
        }
    }
}

// ── Engine-internal layouts ──────────────────────────────────────────────────

/// Per-event item entry: where its CDF lives and which random row it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemData {
    pub item_id: i32,
    pub damagecdf_i: i32,
    pub rng_index: i32,
}

impl Record for ItemData {
    const SIZE: usize = 12;
    const NAME: &'static str = "item data";

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.item_id.to_le_bytes());
        out.extend_from_slice(&self.damagecdf_i.to_le_bytes());
        out.extend_from_slice(&self.rng_index.to_le_bytes());
    }

    fn decode(f: &mut Fields<'_>) -> Self {
        ItemData {
            item_id: f.i32(),
            damagecdf_i: f.i32(),
            rng_index: f.i32(),
        }
    }
}

/// A coverage's TIV and its slice `[start_items, start_items + cur_items)`
/// of the flat item array. `cur_items <= max_items` always.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageRecord {
    pub tiv: LossFloat,
    pub max_items: i32,
    pub start_items: i32,
    pub cur_items: i32,
}

impl Record for CoverageRecord {
    const SIZE: usize = LOSS_FLOAT_SIZE + 12;
    const NAME: &'static str = "coverage";

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tiv.to_le_bytes());
        out.extend_from_slice(&self.max_items.to_le_bytes());
        out.extend_from_slice(&self.start_items.to_le_bytes());
        out.extend_from_slice(&self.cur_items.to_le_bytes());
    }

    fn decode(f: &mut Fields<'_>) -> Self {
        CoverageRecord {
            tiv: f.loss(),
            max_items: f.i32(),
            start_items: f.i32(),
            cur_items: f.i32(),
        }
    }
}

// ── Stream records ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageCdfHeader {
    pub event_id: i32,
    pub areaperil_id: u32,
    pub vulnerability_id: i32,
    pub bin_count: i32,
}

impl Record for DamageCdfHeader {
    const SIZE: usize = 16;
    const NAME: &'static str = "damage CDF header";

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.event_id.to_le_bytes());
        out.extend_from_slice(&self.areaperil_id.to_le_bytes());
        out.extend_from_slice(&self.vulnerability_id.to_le_bytes());
        out.extend_from_slice(&self.bin_count.to_le_bytes());
    }

    fn decode(f: &mut Fields<'_>) -> Self {
        DamageCdfHeader {
            event_id: f.i32(),
            areaperil_id: f.u32(),
            vulnerability_id: f.i32(),
            bin_count: f.i32(),
        }
    }
}

/// One damage bin: cumulative probability up to `prob_to`, representative
/// damage ratio `bin_mean`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbMean {
    pub prob_to: LossFloat,
    pub bin_mean: LossFloat,
}

impl Record for ProbMean {
    const SIZE: usize = 2 * LOSS_FLOAT_SIZE;
    const NAME: &'static str = "damage bin";

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.prob_to.to_le_bytes());
        out.extend_from_slice(&self.bin_mean.to_le_bytes());
    }

    fn decode(f: &mut Fields<'_>) -> Self {
        ProbMean {
            prob_to: f.loss(),
            bin_mean: f.loss(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleHeader {
    pub event_id: i32,
    pub item_id: i32,
}

impl Record for SampleHeader {
    const SIZE: usize = 8;
    const NAME: &'static str = "sample header";

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.event_id.to_le_bytes());
        out.extend_from_slice(&self.item_id.to_le_bytes());
    }

    fn decode(f: &mut Fields<'_>) -> Self {
        SampleHeader {
            event_id: f.i32(),
            item_id: f.i32(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRecord {
    pub sidx: i32,
    pub loss: LossFloat,
}

impl Record for SampleRecord {
    const SIZE: usize = 4 + LOSS_FLOAT_SIZE;
    const NAME: &'static str = "sample record";

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.sidx.to_le_bytes());
        out.extend_from_slice(&self.loss.to_le_bytes());
    }

    fn decode(f: &mut Fields<'_>) -> Self {
        SampleRecord {
            sidx: f.i32(),
            loss: f.loss(),
        }
    }
}
