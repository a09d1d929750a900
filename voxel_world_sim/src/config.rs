// Data-driven simulation configuration.
//
// Every tunable number the sim reads lives in `GameConfig`, grouped by the
// subsystem that consumes it: `TerrainConfig` (height-field generation),
// `PathConfig` (exit weights, road discount), `StressConfig` (support model
// and collapse cadence), and `ActorConfig` (tick rate, movement, falling).
// `Default` carries the shipping values; hosts may load overrides from JSON.
//
// Times are virtual milliseconds. Distances are voxel units unless a field
// says otherwise.
//
// See also: `sim.rs` which owns the `GameConfig` as part of `SimState`.
//
// **Critical constraint: determinism.** Config values feed simulation logic
// directly; two runs with the same seed and config must match.

use crate::error::{SimError, SimResult};
use crate::types::Material;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Terrain
// ---------------------------------------------------------------------------

/// One layer of the summed height field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseOctave {
    /// Height contribution at full noise.
    pub amplitude: f64,
    /// Noise-space units per voxel.
    pub frequency: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainConfig {
    pub octaves: Vec<NoiseOctave>,
    /// Heights are clamped to this many voxels.
    pub max_height: u32,
    /// Thickness of the dirt layer over rock.
    pub dirt_depth: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        let octave = |amplitude, frequency| NoiseOctave {
            amplitude,
            frequency,
        };
        Self {
            octaves: vec![
                octave(16.0, 0.025),
                octave(12.0, 0.05),
                octave(6.0, 0.1),
                octave(3.0, 0.2),
                octave(2.0, 0.4),
            ],
            max_height: 31,
            dirt_depth: 6,
        }
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    /// Physical extent of one voxel (x, y, z) used to weight exits.
    pub voxel_scale: [f32; 3],
    /// Multiplier for moves that climb.
    pub slope_effort: f32,
    /// Multiplier applied to built-road edges when routing on roads.
    pub road_multiplier: f32,
    /// Weight of a vertical move through the middle of a cell.
    pub center_weight: f32,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            voxel_scale: [5.0, 5.0, 3.0],
            slope_effort: 5.0,
            road_multiplier: 0.2,
            center_weight: 3.0,
        }
    }
}

impl PathConfig {
    /// Flat move across a side.
    pub fn side_flat(&self) -> f32 {
        self.voxel_scale[0]
    }

    /// Move across a side that also changes level.
    pub fn side_slope(&self) -> f32 {
        self.voxel_scale[0].hypot(self.voxel_scale[2])
    }

    /// Flat diagonal move.
    pub fn corner_flat(&self) -> f32 {
        self.voxel_scale[0].hypot(self.voxel_scale[1])
    }

    /// Diagonal move that also changes level.
    pub fn corner_slope(&self) -> f32 {
        let [x, y, z] = self.voxel_scale;
        (x * x + y * y + z * z).sqrt()
    }
}

// ---------------------------------------------------------------------------
// Stress
// ---------------------------------------------------------------------------

/// How much unsupported span each solid material tolerates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialStrengths {
    pub rock: u32,
    pub dirt: u32,
    pub clay: u32,
    pub sand: u32,
}

impl Default for MaterialStrengths {
    fn default() -> Self {
        Self {
            rock: 5,
            dirt: 2,
            clay: 3,
            sand: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StressConfig {
    /// Stress cap; also the strength reported for air.
    pub max_stress: u32,
    pub tick_interval_ms: u64,
    pub strengths: MaterialStrengths,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            max_stress: 10_000,
            tick_interval_ms: 100,
            strengths: MaterialStrengths::default(),
        }
    }
}

impl StressConfig {
    pub fn strength(&self, material: Material) -> u32 {
        match material {
            Material::Air => self.max_stress,
            Material::Rock => self.strengths.rock,
            Material::Dirt => self.strengths.dirt,
            Material::Clay => self.strengths.clay,
            Material::Sand => self.strengths.sand,
        }
    }
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActorConfig {
    pub tick_interval_ms: u64,
    /// Live actor cap; spawning past it evicts the oldest.
    pub max_actors: usize,
    /// Voxels per second on flat ground.
    pub walk_speed: f32,
    /// Speed multiplier while on a built road.
    pub road_speed_multiplier: f32,
    /// Fraction of speed lost walking straight up or down a full slope.
    pub slope_penalty: f32,
    /// Voxels per second squared.
    pub gravity: f32,
    /// Voxels per second.
    pub terminal_velocity: f32,
    /// Draws spent looking for a random wander destination.
    pub wander_attempts: u32,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 15,
            max_actors: 500,
            walk_speed: 0.75,
            road_speed_multiplier: 2.0,
            slope_penalty: 0.15,
            gravity: 100.0 / 3.0,
            terminal_velocity: 500.0 / 3.0,
            wander_attempts: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Volume extent (x, y, z). Each axis must fit a 10-bit `VoxelId` field.
    pub world_size: (u32, u32, u32),
    pub terrain: TerrainConfig,
    pub paths: PathConfig,
    pub stress: StressConfig,
    pub actors: ActorConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            world_size: (32, 32, 32),
            terrain: TerrainConfig::default(),
            paths: PathConfig::default(),
            stress: StressConfig::default(),
            actors: ActorConfig::default(),
        }
    }
}

impl GameConfig {
    /// Parse a config from a JSON document and check its ranges.
    pub fn from_json(json: &str) -> SimResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the sim cannot honor.
    pub fn validate(&self) -> SimResult<()> {
        if self.actors.max_actors == 0 {
            return Err(SimError::ConfigValue("actors.max_actors must be at least 1"));
        }
        Ok(())
    }
}
