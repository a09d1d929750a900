// Error type for fallible simulation operations.
//
// Only genuine precondition failures surface as errors. Empty results
// (no path, no random surface found) are `Option`/empty `Vec`, and
// structural failure is modeled as collapse, never as an error.

use crate::types::VoxelCoord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// A coordinate outside the volume's extent was addressed.
    #[error("voxel coordinate {coord} is outside the {size_x}x{size_y}x{size_z} volume")]
    InvalidCoordinate {
        coord: VoxelCoord,
        size_x: u32,
        size_y: u32,
        size_z: u32,
    },
    /// A configuration document failed to parse.
    #[error("invalid game config: {0}")]
    Config(#[from] serde_json::Error),
    /// A configuration value is out of its allowed range.
    #[error("invalid game config: {0}")]
    ConfigValue(&'static str),
    /// A saved simulation failed to load.
    #[error("invalid saved state: {0}")]
    State(serde_json::Error),
}

pub type SimResult<T> = Result<T, SimError>;
