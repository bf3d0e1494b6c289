use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::correlation::validate_rho;
use crate::error::{ConfigError, Result};
use crate::lookup::Grid;
use crate::random::{RandomGenerator, validate_sample_size};

/// Everything a sampling run needs besides its input tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    pub base_seed: i64,
    pub sample_size: usize,
    /// 0 = Mersenne-Twister, 1 = Latin-Hypercube.
    pub random_generator: i64,
    pub inv_cdf_grid: Grid,
    pub cdf_grid: Grid,
    /// Peril correlation group → coefficient, overriding the values in the
    /// correlation table.
    pub correlations: BTreeMap<i32, f64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::canonical()
    }
}

impl SamplerConfig {
    pub fn canonical() -> Self {
        SamplerConfig {
            base_seed: 0,
            sample_size: 100,
            random_generator: RandomGenerator::MersenneTwister.id(),
            inv_cdf_grid: Grid::INV_CDF,
            cdf_grid: Grid::CDF,
            correlations: BTreeMap::new(),
        }
    }

    /// Parse without validating, so later overrides can still fix a field.
    pub fn parse_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config = Self::parse_json_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file without validating it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace each field that has a value.
    pub fn with_overrides(
        mut self,
        base_seed: Option<i64>,
        sample_size: Option<usize>,
        random_generator: Option<i64>,
    ) -> Self {
        if let Some(seed) = base_seed {
            self.base_seed = seed;
        }
        if let Some(n) = sample_size {
            self.sample_size = n;
        }
        if let Some(g) = random_generator {
            self.random_generator = g;
        }
        self
    }

    /// Every check that can fail before sampling starts.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        validate_sample_size(self.sample_size)?;
        if !matches!(self.random_generator, 0 | 1) {
            return Err(ConfigError::UnknownRandomGenerator(self.random_generator));
        }
        self.inv_cdf_grid.validate("inverse CDF")?;
        if self.inv_cdf_grid.min <= 0.0 || self.inv_cdf_grid.max >= 1.0 {
            return Err(ConfigError::InvalidGrid {
                name: "inverse CDF",
                min: self.inv_cdf_grid.min,
                max: self.inv_cdf_grid.max,
                n: self.inv_cdf_grid.n,
            });
        }
        self.cdf_grid.validate("CDF")?;
        for (&group, &rho) in &self.correlations {
            validate_rho(Some(group), rho)?;
        }
        Ok(())
    }

    /// Resolves the generator selector; logs the choice.
    pub fn generator(&self) -> std::result::Result<RandomGenerator, ConfigError> {
        RandomGenerator::from_id(self.random_generator)
    }

    pub fn metadata(&self) -> RunMetadata {
        RunMetadata {
            base_seed: self.base_seed,
            sample_size: self.sample_size,
            random_generator: self.random_generator,
            inv_cdf_grid: self.inv_cdf_grid,
            cdf_grid: self.cdf_grid,
            loss_float_bytes: crate::types::LOSS_FLOAT_SIZE,
        }
    }
}

/// Written beside every output stream so the run can be reproduced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub base_seed: i64,
    pub sample_size: usize,
    pub random_generator: i64,
    pub inv_cdf_grid: Grid,
    pub cdf_grid: Grid,
    pub loss_float_bytes: usize,
}

impl RunMetadata {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// `<output>.meta.json`.
    pub fn sidecar_path(output: impl AsRef<Path>) -> PathBuf {
        let mut name = output.as_ref().as_os_str().to_owned();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
