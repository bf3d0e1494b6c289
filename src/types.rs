use serde::Serialize;

/// Width of every loss and TIV field on the wire and in memory.
/// Fixed at build time by the `double-precision` feature.
#[cfg(not(feature = "double-precision"))]
pub type LossFloat = f32;
#[cfg(feature = "double-precision")]
pub type LossFloat = f64;

pub const LOSS_FLOAT_SIZE: usize = std::mem::size_of::<LossFloat>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ItemId(pub i32);

/// 1-based; coverage `n` is the `n`-th TIV in the coverage table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CoverageId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EventId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AreaPerilId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VulnerabilityId(pub i32);

/// Exposure group: items in the same group share one random stream per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PerilCorrelationGroup(pub i32);

/// Key locating one damage CDF within an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DamageKey {
    pub areaperil_id: AreaPerilId,
    pub vulnerability_id: VulnerabilityId,
}

impl DamageKey {
    pub fn new(areaperil_id: u32, vulnerability_id: i32) -> Self {
        DamageKey {
            areaperil_id: AreaPerilId(areaperil_id),
            vulnerability_id: VulnerabilityId(vulnerability_id),
        }
    }
}

/// Reserved sample indices carried alongside the Monte Carlo draws.
pub mod sidx {
    pub const MEAN: i32 = -1;
    pub const STD_DEV: i32 = -2;
    pub const TIV: i32 = -3;
    pub const CHANCE_OF_LOSS: i32 = -4;
    pub const MAX_LOSS: i32 = -5;

    /// Number of reserved summary slots.
    pub const NUM_IDX: usize = 5;

    /// Closes each item block in the sample stream.
    pub const TERMINATOR: i32 = 0;

    /// Emission order of the summary records within an item block.
    pub const SUMMARY_ORDER: [i32; NUM_IDX] = [MEAN, STD_DEV, TIV, CHANCE_OF_LOSS, MAX_LOSS];
}
