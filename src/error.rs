use std::path::PathBuf;

use thiserror::Error;

use crate::cell::Pos;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("chunk size must be at least 1 cell, got {0}")]
    ChunkSize(usize),
    #[error("chunk count must be at least 1, got {0}")]
    ChunkCount(usize),
    #[error("cell size must be a finite positive number, got {0}")]
    CellSize(f32),
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("step interval must be at least 1 ms")]
    StepMillis,
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Faults inside a single chunk. These are logic errors, not search failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("chunk at {origin} has no cell at {pos}")]
    MissingCell { origin: Pos, pos: Pos },
    #[error("chunk at {origin} has no branch to grow")]
    NoBranch { origin: Pos },
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("chunk {index} was discarded")]
    Chunk {
        index: usize,
        #[source]
        source: ChunkError,
    },
}

pub type Result<T, E = GenerationError> = std::result::Result<T, E>;
