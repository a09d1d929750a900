// voxel_world_sim — deterministic voxel terrain simulation.
//
// This crate holds the whole simulation core for a voxel landscape: the
// material volume, the walkable-surface classification derived from it, the
// path graph over those surfaces (with a road overlay), a cantilever stress
// model that collapses unsupported terrain, and wandering actors. It has no
// rendering, input or networking dependencies and runs headless.
//
// Module overview:
// - `sim.rs`:         Top-level SimState, step loop, change cascade, component lookup.
// - `world.rs`:       Run-length-encoded voxel volume and terrain generation.
// - `surface.rs`:     Twelve-shape surface classifier (faces, ramps, secondary passes).
// - `nav.rs`:         Path graph: waypoints, reciprocal exits, road overlay.
// - `pathfinding.rs`: A* over the path graph.
// - `stress.rs`:      Sparse stress map and collapse tick.
// - `actor.rs`:       Actors, behavior stacks, the roster.
// - `command.rs`:     SimCommand / SimAction — all external mutations.
// - `event.rs`:       EventQueue (priority queue), SimEvents, EventBus.
// - `config.rs`:      GameConfig — every tunable constant.
// - `error.rs`:       SimError.
// - `prng.rs`:        xoshiro256++ PRNG with SplitMix64 seeding.
// - `types.rs`:       VoxelCoord, VoxelId, Material, Direction, entity IDs.
//
// **Critical constraint: determinism.** The simulation is a pure function:
// `(state, commands) -> (new_state, events)`. All randomness comes from the
// seeded `GameRng`. No `HashMap` iteration, no system time, no OS entropy.
// Use `BTreeMap` for ordered collections.

pub mod actor;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod nav;
pub mod pathfinding;
pub mod prng;
pub mod sim;
pub mod stress;
pub mod surface;
pub mod types;
pub mod world;

pub use error::{SimError, SimResult};
pub use sim::{Component, SimState, StepResult};
