use thiserror::Error;

use crate::types::{CoverageId, DamageKey, ItemId};

/// Top-level error for every fallible engine operation.
///
/// The kernel never retries: configuration errors surface before sampling
/// starts, integrity errors abort the affected event.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("data integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no random generator exists for random_generator={0}")]
    UnknownRandomGenerator(i64),

    #[error("sample size {0} must be in [1, {max}]", max = i32::MAX)]
    InvalidSampleSize(usize),

    #[error("correlation coefficient {rho} is outside [0, 1] (peril correlation group {group:?})")]
    CorrelationOutOfRange { group: Option<i32>, rho: f64 },

    #[error("invalid {name} grid: min={min}, max={max}, n={n}")]
    InvalidGrid {
        name: &'static str,
        min: f64,
        max: f64,
        n: usize,
    },

    #[error("damage CDF for {key:?} is empty")]
    EmptyCdf { key: DamageKey },

    #[error("damage CDF for {key:?} has prob_to {value} at bin {bin} (must be non-decreasing within [0, 1])")]
    NonMonotonicCdf {
        key: DamageKey,
        bin: usize,
        value: f64,
    },

    #[error("damage CDF for {key:?} ends at prob_to {last}, expected 1.0")]
    CdfNotTerminated { key: DamageKey, last: f64 },

    #[error("vector length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("invalid {name} parameters: {detail}")]
    InvalidDistribution { name: &'static str, detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("coverage {coverage_id:?} already holds its {max_items} items")]
    CoverageOverflow {
        coverage_id: CoverageId,
        max_items: i32,
    },

    #[error("item {item_id:?} references unknown coverage {coverage_id:?}")]
    UnknownCoverage {
        item_id: ItemId,
        coverage_id: CoverageId,
    },

    #[error("no damage CDF loaded for {key:?}")]
    CdfLookupMiss { key: DamageKey },

    #[error("duplicate item id {0:?}")]
    DuplicateItem(ItemId),

    #[error("{record}: {len} bytes is not a whole number of {size}-byte records")]
    MalformedRecord {
        record: &'static str,
        len: usize,
        size: usize,
    },

    #[error("stream ended inside {context}")]
    TruncatedStream { context: &'static str },

    #[error("unexpected stream type {actual:#010x}, expected {expected:#010x}")]
    UnexpectedStreamType { expected: i32, actual: i32 },

    #[error("sidx {sidx} outside the stream's sample range 1..={sample_size}")]
    SidxOutOfRange { sidx: i32, sample_size: i32 },

    #[error("item {item_id:?} in event {event_id} repeats sidx {sidx}")]
    DuplicateSidx { event_id: i32, item_id: ItemId, sidx: i32 },

    #[error("item {item_id:?} in event {event_id} ended with {missing} of its sidx records missing")]
    IncompleteBlock { event_id: i32, item_id: ItemId, missing: usize },

    #[error("stream header declares sample size {0}")]
    InvalidStreamSampleSize(i32),

    #[error("negative bin count {count} in damage CDF record for {key:?}")]
    NegativeBinCount { key: DamageKey, count: i32 },
}

pub type Result<T> = std::result::Result<T, Error>;
