use crate::error::{ConfigError, Result};
use crate::lookup::{Grid, NormTable, build_cdf_table, build_inverse_cdf_table};

/// Checks a peril-correlation-group coefficient lies in `[0, 1]`.
pub fn validate_rho(group: Option<i32>, rho: f64) -> std::result::Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&rho) {
        return Err(ConfigError::CorrelationOutOfRange { group, rho });
    }
    Ok(())
}

/// Gaussian copula over tabulated Φ⁻¹ and Φ.
///
/// Per element: `z = Φ(√ρ·Φ⁻¹(shared) + √(1-ρ)·Φ⁻¹(independent))`, with both
/// transforms replaced by clamped table lookups. `ρ = 1` reproduces the
/// shared draw's ranks, `ρ = 0` the independent draw's.
#[derive(Debug, Clone)]
pub struct GaussianCopula {
    inv_cdf: NormTable,
    cdf: NormTable,
}

impl GaussianCopula {
    pub fn new(inv_cdf: NormTable, cdf: NormTable) -> Self {
        GaussianCopula { inv_cdf, cdf }
    }

    pub fn from_grids(inv_cdf: Grid, cdf: Grid) -> Result<Self> {
        Ok(GaussianCopula {
            inv_cdf: build_inverse_cdf_table(inv_cdf.min, inv_cdf.max, inv_cdf.n)?,
            cdf: build_cdf_table(cdf.min, cdf.max, cdf.n)?,
        })
    }

    pub fn inv_cdf_table(&self) -> &NormTable {
        &self.inv_cdf
    }

    pub fn cdf_table(&self) -> &NormTable {
        &self.cdf
    }

    /// Writes the correlated uniforms into `out`. All three slices must have
    /// the same length.
    pub fn correlate_into(
        &self,
        shared: &[f64],
        independent: &[f64],
        rho: f64,
        out: &mut [f64],
    ) -> Result<()> {
        correlate_into(shared, independent, rho, &self.inv_cdf, &self.cdf, out)
    }

    pub fn correlate(&self, shared: &[f64], independent: &[f64], rho: f64) -> Result<Vec<f64>> {
        correlate(shared, independent, rho, &self.inv_cdf, &self.cdf)
    }
}

/// Elementwise copula over caller-supplied tables; `x_unif` is the shared
/// draw, `y_unif` the independent one.
pub fn correlate(
    x_unif: &[f64],
    y_unif: &[f64],
    rho: f64,
    inv_cdf_table: &NormTable,
    cdf_table: &NormTable,
) -> Result<Vec<f64>> {
    let mut z_unif = vec![0.0; x_unif.len()];
    correlate_into(x_unif, y_unif, rho, inv_cdf_table, cdf_table, &mut z_unif)?;
    Ok(z_unif)
}

pub fn correlate_into(
    x_unif: &[f64],
    y_unif: &[f64],
    rho: f64,
    inv_cdf_table: &NormTable,
    cdf_table: &NormTable,
    z_unif: &mut [f64],
) -> Result<()> {
    if y_unif.len() != x_unif.len() {
        return Err(ConfigError::LengthMismatch { expected: x_unif.len(), actual: y_unif.len() }.into());
    }
    if z_unif.len() != x_unif.len() {
        return Err(ConfigError::LengthMismatch { expected: x_unif.len(), actual: z_unif.len() }.into());
    }
    validate_rho(None, rho)?;

    let sqrt_rho = rho.sqrt();
    let sqrt_1_minus_rho = (1.0 - rho).sqrt();
    for ((z, &x), &y) in z_unif.iter_mut().zip(x_unif).zip(y_unif) {
        let x_norm = inv_cdf_table.lookup(x);
        let y_norm = inv_cdf_table.lookup(y);
        *z = cdf_table.lookup(sqrt_rho * x_norm + sqrt_1_minus_rho * y_norm);
    }
    Ok(())
}
