use std::f64::consts::SQRT_2;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::function::erf::{erfc, erfc_inv};
use tracing::info;

use crate::error::{ConfigError, Result};

/// Absorbs rounding when `x` sits exactly on a grid point, so that
/// `cell(support_point(i)) == i`.
const CELL_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Grid {
    /// Default inverse-CDF grid over the open unit interval.
    pub const INV_CDF: Grid = Grid { min: 1e-16, max: 1.0 - 1e-16, n: 1_000_000 };
    /// Default forward-CDF grid over normal space.
    pub const CDF: Grid = Grid { min: -20.0, max: 20.0, n: 1_000_000 };

    pub fn validate(&self, name: &'static str) -> std::result::Result<(), ConfigError> {
        let ok = self.n >= 2 && self.min.is_finite() && self.max.is_finite() && self.min < self.max;
        if !ok {
            return Err(ConfigError::InvalidGrid { name, min: self.min, max: self.max, n: self.n });
        }
        Ok(())
    }

    /// Abscissa of grid point `i`; the last point is exactly `max`.
    pub fn support_point(&self, i: usize) -> f64 {
        if i + 1 >= self.n {
            return self.max;
        }
        let step = (self.max - self.min) / (self.n - 1) as f64;
        self.min + i as f64 * step
    }

    /// Index of the grid cell holding `x`: `floor((x - min) * (n - 1) / (max - min))`.
    ///
    /// Values below `min` (and NaN) clamp to cell 0, values above `max` clamp
    /// to cell `n - 1`.
    #[inline]
    pub fn cell(&self, x: f64) -> usize {
        let t = (x - self.min) * (self.n - 1) as f64 / (self.max - self.min);
        if !(t > 0.0) {
            return 0;
        }
        let c = (t + CELL_EPS).floor();
        if c >= (self.n - 1) as f64 {
            self.n - 1
        } else {
            c as usize
        }
    }
}

/// Φ(x) for the standard normal.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Φ⁻¹(p) for the standard normal, `p` in `(0, 1)`.
pub fn norm_inv_cdf(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p)
}

/// A function tabulated over a [`Grid`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormTable {
    grid: Grid,
    values: Vec<f64>,
}

impl NormTable {
    fn tabulate(grid: Grid, f: fn(f64) -> f64) -> Self {
        let values = (0..grid.n).into_par_iter().map(|i| f(grid.support_point(i))).collect();
        NormTable { grid, values }
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Table value at the cell holding `x` (clamped at the edges).
    #[inline]
    pub fn lookup(&self, x: f64) -> f64 {
        self.values[self.grid.cell(x)]
    }
}

/// Φ⁻¹ tabulated over `[min, max] ⊂ (0, 1)`.
pub fn build_inverse_cdf_table(min: f64, max: f64, n: usize) -> Result<NormTable> {
    let grid = Grid { min, max, n };
    grid.validate("inverse CDF")?;
    if min <= 0.0 || max >= 1.0 {
        return Err(ConfigError::InvalidGrid { name: "inverse CDF", min, max, n }.into());
    }
    info!(min, max, n, "building normal inverse-CDF lookup table");
    Ok(NormTable::tabulate(grid, norm_inv_cdf))
}

/// Φ tabulated over `[min, max]`.
pub fn build_cdf_table(min: f64, max: f64, n: usize) -> Result<NormTable> {
    let grid = Grid { min, max, n };
    grid.validate("CDF")?;
    info!(min, max, n, "building normal CDF lookup table");
    Ok(NormTable::tabulate(grid, norm_cdf))
}
