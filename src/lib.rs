//! Procedural path networks built one square chunk at a time.
//!
//! Each chunk grows a trunk from where its parent's path left off, then
//! sends branches towards its other edges. Branch ends on the boundary become
//! exits that later chunks attach to.

pub mod cell;
pub mod chunk;
pub mod config;
pub mod direction;
pub mod error;
pub mod generator;
pub mod map;
pub mod policy;

pub use cell::{Cell, Pos};
pub use chunk::{Chunk, Growth};
pub use config::MapConfig;
pub use direction::Dir;
pub use error::{ChunkError, ConfigError, GenerationError};
pub use generator::{GenerationReport, MapGenerator, MapObserver, Phase, Progress, Step, StopReason};
pub use map::{Attachment, MapChunks};
pub use policy::Tuning;
