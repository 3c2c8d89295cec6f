use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::policy::Tuning;

const DEFAULT_CHUNK_SIZE: usize = 13;
const DEFAULT_CHUNK_COUNT: usize = 5;
const DEFAULT_BRANCH_INCREMENT: f32 = 10.0;
const DEFAULT_STEP_MS: u64 = 10;

/// Env var naming a JSON file with a full or partial [`MapConfig`].
pub const CONFIG_FILE_VAR: &str = "CHUNKMAZE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Cells per chunk side.
    pub chunk_size: usize,
    /// World units per cell.
    pub cell_size: f32,
    /// Number of chunks to generate.
    pub chunk_count: usize,
    pub edge_bias: f32,
    pub irregularity: f32,
    /// Percentage added to the branching chance for every chunk created.
    pub branch_increment: f32,
    /// Negative asks for a random seed.
    pub seed: i64,
    pub step_mode: bool,
    pub step_millis: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            cell_size: 1.0,
            chunk_count: DEFAULT_CHUNK_COUNT,
            edge_bias: 0.5,
            irregularity: 0.5,
            branch_increment: DEFAULT_BRANCH_INCREMENT,
            seed: -1,
            step_mode: false,
            step_millis: DEFAULT_STEP_MS,
        }
    }
}

impl MapConfig {
    pub fn tuning(&self) -> Tuning {
        Tuning::new(self.edge_bias, self.irregularity)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size < 1 {
            return Err(ConfigError::ChunkSize(self.chunk_size));
        }
        if self.chunk_count < 1 {
            return Err(ConfigError::ChunkCount(self.chunk_count));
        }
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(ConfigError::CellSize(self.cell_size));
        }
        check_range("edge_bias", self.edge_bias, 0.0, 1.0)?;
        check_range("irregularity", self.irregularity, 0.0, 1.0)?;
        check_range("branch_increment", self.branch_increment, 0.0, 100.0)?;
        if self.step_millis == 0 {
            return Err(ConfigError::StepMillis);
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        info!("found config at {}", path.display());
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, then the file named by `CHUNKMAZE_CONFIG`, then single
    /// `CHUNKMAZE_*` overrides. The result is validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_FILE_VAR) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_vars(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from variables. Unparsable values are ignored.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_var(&lookup, "CHUNKMAZE_CHUNK_SIZE") {
            self.chunk_size = v;
        }
        if let Some(v) = parse_var(&lookup, "CHUNKMAZE_CELL_SIZE") {
            self.cell_size = v;
        }
        if let Some(v) = parse_var(&lookup, "CHUNKMAZE_CHUNKS") {
            self.chunk_count = v;
        }
        if let Some(v) = parse_var(&lookup, "CHUNKMAZE_EDGE_BIAS") {
            self.edge_bias = v;
        }
        if let Some(v) = parse_var(&lookup, "CHUNKMAZE_IRREGULARITY") {
            self.irregularity = v;
        }
        if let Some(v) = parse_var(&lookup, "CHUNKMAZE_BRANCH_INCREMENT") {
            self.branch_increment = v;
        }
        if let Some(v) = parse_var(&lookup, "CHUNKMAZE_SEED") {
            self.seed = v;
        }
        if let Some(v) = lookup("CHUNKMAZE_STEP").and_then(|v| parse_flag(&v)) {
            self.step_mode = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "CHUNKMAZE_STEP_MS").filter(|v| *v > 0) {
            self.step_millis = v;
        }
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|v| v.trim().parse::<T>().ok())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
