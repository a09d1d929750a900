// Commands that mutate simulation state.
//
// All external mutations go through `SimCommand`: edit a voxel, spawn an
// actor, toggle or clear a road, regenerate the terrain. `SimState::step`
// applies them in tick order, interleaved with scheduled events.
//
// A command that addresses a cell outside the volume is rejected before any
// state changes; the error comes back in `StepResult::rejected`.
//
// See also: `sim.rs` for `apply_command()`, `types.rs` for the coordinate
// and material types used here.
//
// **Critical constraint: determinism.** Commands are the sole external input
// to the sim. Internal state changes come from scheduled events (see
// `event.rs`).

use crate::types::{Material, VoxelCoord};
use serde::{Deserialize, Serialize};

/// A command targeting a specific simulation tick (virtual milliseconds).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimCommand {
    pub tick: u64,
    pub action: SimAction,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimAction {
    /// Write one cell. Writing the material already there is a no-op.
    SetVoxel {
        coord: VoxelCoord,
        material: Material,
    },
    /// Spawn an actor at a world-space position.
    SpawnActor { position: [f32; 3] },
    /// Toggle the road flag on the waypoint at `coord`.
    BuildRoad { coord: VoxelCoord },
    /// Clear the road flag on the waypoint at `coord`.
    Demolish { coord: VoxelCoord },
    /// Regenerate the whole terrain from the sim's RNG.
    Regenerate,
}
