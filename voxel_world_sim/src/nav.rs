// Navigation graph over traversable surfaces, with a road overlay.
//
// Every traversable `Surface` gets a `Waypoint` holding ten directional
// `Exit`s (four sides, above/below through the cell center, four corners).
// An exit exists where this cell's exit level on that side lines up with the
// neighbor's level on the facing side: bottom-to-bottom on the same level,
// bottom-to-top one level down, middle-to-middle, top-to-bottom one level up.
// Exits are reciprocal by construction: a candidate A→B is only stored when
// probing from B in the opposite direction lands back on A.
//
// Exit weights follow the physical voxel scale (`PathConfig::voxel_scale`);
// climbing moves are multiplied by `slope_effort`.
//
// Roads are a per-waypoint flag. An exit's `RoadState` is `Possible` when
// both cells' shapes allow a road along it and `Built` when both waypoints
// are roads; a built corner road yields to a built side road next to it, and
// a built road whose partner exit is not built is demoted.
//
// See also: `surface.rs` for exit levels and road orientation rules,
// `pathfinding.rs` for A* over this graph, `sim.rs` which feeds surface
// updates in.
//
// **Critical constraint: determinism.** Waypoints live in a `BTreeMap` keyed
// by `VoxelId`; all passes iterate in id order.

use crate::config::PathConfig;
use crate::surface::{ExitLevel, SurfaceMap};
use crate::types::{Direction, VoxelCoord, VoxelId};
use crate::world::VoxelVolume;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum RoadState {
    #[default]
    Impossible,
    Possible,
    Built,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Exit {
    pub target: Option<VoxelId>,
    pub weight: f32,
    pub road: RoadState,
}

/// A node of the path graph: one traversable surface cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub coord: VoxelCoord,
    pub is_road: bool,
    /// Indexed by `Direction`.
    pub exits: [Exit; 10],
}

impl Waypoint {
    pub fn new(coord: VoxelCoord) -> Self {
        Self {
            coord,
            is_road: false,
            exits: [Exit::default(); 10],
        }
    }

    pub fn id(&self) -> VoxelId {
        VoxelId::pack(self.coord)
    }

    pub fn exit(&self, dir: Direction) -> &Exit {
        &self.exits[dir.index()]
    }

    pub fn has_exit(&self, target: VoxelId) -> bool {
        self.exits.iter().any(|e| e.target == Some(target))
    }

    pub fn has_road(&self, target: VoxelId) -> bool {
        self.exits
            .iter()
            .any(|e| e.target == Some(target) && e.road == RoadState::Built)
    }

    /// Iterate `(target, exit)` for every existing exit.
    pub fn links(&self) -> impl Iterator<Item = (VoxelId, &Exit)> {
        self.exits.iter().filter_map(|e| e.target.map(|t| (t, e)))
    }
}

// ---------------------------------------------------------------------------
// Exit probing
// ---------------------------------------------------------------------------

fn side_level(surfaces: &SurfaceMap, coord: VoxelCoord, side: usize) -> ExitLevel {
    VoxelId::checked(coord)
        .and_then(|id| surfaces.get(id))
        .map_or(ExitLevel::None, |s| s.side_exits()[side])
}

fn corner_level(surfaces: &SurfaceMap, coord: VoxelCoord, corner: usize) -> ExitLevel {
    VoxelId::checked(coord)
        .and_then(|id| surfaces.get(id))
        .map_or(ExitLevel::None, |s| s.corner_exits()[corner])
}

fn center_level(surfaces: &SurfaceMap, coord: VoxelCoord) -> ExitLevel {
    VoxelId::checked(coord)
        .and_then(|id| surfaces.get(id))
        .map_or(ExitLevel::None, |s| s.center_exit())
}

/// Where does leaving `coord` toward `dir` lead, and at what cost? Later
/// matches override earlier ones, so a slope down wins over a flat step.
fn probe(
    surfaces: &SurfaceMap,
    coord: VoxelCoord,
    dir: Direction,
    paths: &PathConfig,
) -> Option<(VoxelId, f32)> {
    let surface = surfaces.get(VoxelId::checked(coord)?)?;
    let up = coord.step(Direction::Above);
    let down = coord.step(Direction::Below);
    let effort = paths.slope_effort;
    let mut found: Option<(VoxelCoord, f32)> = None;

    if let Some(side) = Direction::SIDES.iter().position(|&d| d == dir) {
        let back = (side + 2) % 4;
        let level = surface.side_exits()[side];
        let matches = |c: VoxelCoord, want: ExitLevel| side_level(surfaces, c, back) == want;
        match level {
            ExitLevel::Bottom => {
                let same = coord.step(dir);
                if matches(same, ExitLevel::Bottom) {
                    found = Some((same, paths.side_flat()));
                }
                let lower = down.step(dir);
                if matches(lower, ExitLevel::Top) {
                    found = Some((lower, paths.side_slope()));
                }
            }
            ExitLevel::Middle => {
                let same = coord.step(dir);
                if matches(same, ExitLevel::Middle) {
                    found = Some((same, paths.side_flat() * effort));
                }
            }
            ExitLevel::Top => {
                let upper = up.step(dir);
                if matches(upper, ExitLevel::Bottom) {
                    found = Some((upper, paths.side_slope() * effort));
                }
            }
            ExitLevel::None => {}
        }
    } else if let Some(corner) = Direction::CORNERS.iter().position(|&d| d == dir) {
        let back = (corner + 2) % 4;
        let level = surface.corner_exits()[corner];
        let matches = |c: VoxelCoord, want: ExitLevel| corner_level(surfaces, c, back) == want;
        match level {
            ExitLevel::Bottom => {
                let same = coord.step(dir);
                if matches(same, ExitLevel::Bottom) {
                    found = Some((same, paths.corner_flat()));
                }
                let lower = down.step(dir);
                if matches(lower, ExitLevel::Top) {
                    found = Some((lower, paths.corner_slope()));
                }
            }
            ExitLevel::Top => {
                let same = coord.step(dir);
                if matches(same, ExitLevel::Top) {
                    found = Some((same, paths.corner_flat() * effort));
                }
                let upper = up.step(dir);
                if matches(upper, ExitLevel::Bottom) {
                    found = Some((upper, paths.corner_slope() * effort));
                }
            }
            ExitLevel::Middle | ExitLevel::None => {}
        }
    } else {
        match (dir, surface.center_exit()) {
            (Direction::Below, ExitLevel::Bottom) => {
                if center_level(surfaces, down) == ExitLevel::Top {
                    found = Some((down, paths.center_weight));
                }
            }
            (Direction::Above, ExitLevel::Top) => {
                if center_level(surfaces, up) == ExitLevel::Bottom {
                    found = Some((up, paths.center_weight * effort));
                }
            }
            _ => {}
        }
    }

    let (target, weight) = found?;
    Some((VoxelId::checked(target)?, weight))
}

// ---------------------------------------------------------------------------
// PathGraph
// ---------------------------------------------------------------------------

/// All waypoints, keyed by cell.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PathGraph {
    waypoints: BTreeMap<VoxelId, Waypoint>,
}

impl PathGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn get(&self, id: VoxelId) -> Option<&Waypoint> {
        self.waypoints.get(&id)
    }

    pub fn contains(&self, id: VoxelId) -> bool {
        self.waypoints.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints.values()
    }

    /// Does `start` have an exit leading to `end`?
    pub fn has_exit(&self, start: VoxelId, end: VoxelId) -> bool {
        self.get(start).is_some_and(|w| w.has_exit(end))
    }

    /// Is there a built road from `start` (itself a road) to `end`?
    pub fn has_road(&self, start: VoxelId, end: VoxelId) -> bool {
        self.get(start).is_some_and(|w| w.is_road && w.has_road(end))
    }

    fn find_exits(&mut self, id: VoxelId, surfaces: &SurfaceMap, paths: &PathConfig) {
        let Some(waypoint) = self.waypoints.get_mut(&id) else {
            return;
        };
        let coord = waypoint.coord;
        for dir in Direction::ALL {
            let exit = &mut waypoint.exits[dir.index()];
            *exit = Exit::default();
            let Some((target, weight)) = probe(surfaces, coord, dir, paths) else {
                continue;
            };
            let back = probe(surfaces, target.coord(), dir.opposite(), paths);
            if back.map(|(t, _)| t) == Some(id) {
                exit.target = Some(target);
                exit.weight = weight;
            }
        }
    }

    fn find_roads(&mut self, id: VoxelId, surfaces: &SurfaceMap) {
        let Some(waypoint) = self.waypoints.get(&id) else {
            return;
        };
        let Some(surface) = surfaces.get(id) else {
            return;
        };
        let mut roads = [RoadState::Impossible; 10];
        for dir in Direction::ALL {
            let exit = waypoint.exit(dir);
            let (Some(target), Some(compass)) = (exit.target, dir.compass()) else {
                continue;
            };
            if !surface.allows_road(compass) {
                continue;
            }
            let target_allows = surfaces
                .get(target)
                .is_some_and(|s| s.allows_road((compass + 4) % 8));
            if !target_allows {
                continue;
            }
            let both_roads = waypoint.is_road && self.get(target).is_some_and(|t| t.is_road);
            roads[dir.index()] = if both_roads {
                RoadState::Built
            } else {
                RoadState::Possible
            };
        }

        // A built side road suppresses the built corner roads beside it.
        for (i, corner) in Direction::CORNERS.iter().enumerate() {
            let a = Direction::SIDES[i].index();
            let b = Direction::SIDES[(i + 1) % 4].index();
            let c = corner.index();
            if roads[c] == RoadState::Built
                && (roads[a] == RoadState::Built || roads[b] == RoadState::Built)
            {
                roads[c] = RoadState::Possible;
            }
        }

        if let Some(waypoint) = self.waypoints.get_mut(&id) {
            for (exit, road) in waypoint.exits.iter_mut().zip(roads) {
                exit.road = road;
            }
        }
    }

    fn validate_roads(&mut self, id: VoxelId) {
        let Some(waypoint) = self.waypoints.get(&id) else {
            return;
        };
        let demoted: Vec<usize> = Direction::ALL
            .iter()
            .filter(|dir| {
                let exit = waypoint.exit(**dir);
                exit.road == RoadState::Built
                    && !exit.target.and_then(|t| self.get(t)).is_some_and(|partner| {
                        partner.exit(dir.opposite()).road == RoadState::Built
                    })
            })
            .map(|dir| dir.index())
            .collect();
        if let Some(waypoint) = self.waypoints.get_mut(&id) {
            for i in demoted {
                waypoint.exits[i].road = RoadState::Possible;
            }
        }
    }

    /// Mirror this waypoint's road flag across its exit in `dir`.
    pub fn share_road(&mut self, id: VoxelId, dir: Direction) {
        let Some(waypoint) = self.waypoints.get(&id) else {
            return;
        };
        let is_road = waypoint.is_road;
        let Some(target) = waypoint.exit(dir).target else {
            return;
        };
        if let Some(neighbor) = self.waypoints.get_mut(&target) {
            neighbor.is_road = is_road;
        }
    }

    fn rebuild_roads(&mut self, ids: &BTreeSet<VoxelId>, surfaces: &SurfaceMap) {
        for &id in ids {
            self.find_roads(id, surfaces);
        }
        for &id in ids {
            self.validate_roads(id);
        }
    }

    /// Rebuild every waypoint from the surface table.
    pub fn rebuild(&mut self, surfaces: &SurfaceMap, paths: &PathConfig) {
        self.waypoints = surfaces
            .iter()
            .filter(|(_, s)| s.is_traversable())
            .map(|(id, _)| (id, Waypoint::new(id.coord())))
            .collect();
        let ids: BTreeSet<VoxelId> = self.waypoints.keys().copied().collect();
        for &id in &ids {
            self.find_exits(id, surfaces, paths);
        }
        self.rebuild_roads(&ids, surfaces);
        log::info!("path graph rebuilt: {} waypoints", self.waypoints.len());
    }

    /// Recompute waypoints around a set of changed surfaces. Returns the
    /// ids that were reconsidered.
    pub fn handle_surface_update(
        &mut self,
        updated: &BTreeSet<VoxelId>,
        surfaces: &SurfaceMap,
        volume: &VoxelVolume,
        paths: &PathConfig,
    ) -> BTreeSet<VoxelId> {
        let ids = volume.expand_diagonally(updated);
        for &id in &ids {
            if surfaces.is_traversable(id) {
                self.waypoints
                    .entry(id)
                    .or_insert_with(|| Waypoint::new(id.coord()));
                self.find_exits(id, surfaces, paths);
            } else {
                self.waypoints.remove(&id);
            }
        }
        for &id in &ids {
            if self.get(id).is_some_and(|w| w.is_road) {
                self.share_road(id, Direction::Above);
                self.share_road(id, Direction::Below);
            }
        }
        self.rebuild_roads(&ids, surfaces);
        log::debug!("path graph updated: {} cells reconsidered", ids.len());
        ids
    }

    fn set_road(
        &mut self,
        coord: VoxelCoord,
        is_road: impl FnOnce(bool) -> Option<bool>,
        surfaces: &SurfaceMap,
        volume: &VoxelVolume,
    ) -> Option<BTreeSet<VoxelId>> {
        let id = volume.id(coord)?;
        let waypoint = self.waypoints.get_mut(&id)?;
        waypoint.is_road = is_road(waypoint.is_road)?;
        self.share_road(id, Direction::Above);
        self.share_road(id, Direction::Below);

        let ring = volume.expand_diagonally(&BTreeSet::from([id]));
        let ids = volume.expand_diagonally(&ring);
        self.rebuild_roads(&ids, surfaces);
        Some(ids)
    }

    /// Toggle the road flag at `coord`. Returns the ids whose roads were
    /// rebuilt, or `None` when there is no waypoint there.
    pub fn build_road(
        &mut self,
        coord: VoxelCoord,
        surfaces: &SurfaceMap,
        volume: &VoxelVolume,
    ) -> Option<BTreeSet<VoxelId>> {
        self.set_road(coord, |current| Some(!current), surfaces, volume)
    }

    /// Clear the road flag at `coord`. `None` when there is no road there.
    pub fn demolish(
        &mut self,
        coord: VoxelCoord,
        surfaces: &SurfaceMap,
        volume: &VoxelVolume,
    ) -> Option<BTreeSet<VoxelId>> {
        self.set_road(coord, |current| current.then_some(false), surfaces, volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Material;

    fn flat_world(size: u32) -> (VoxelVolume, SurfaceMap) {
        layered_world(size, 0)
    }

    /// Rock up to and including `top_z`.
    fn layered_world(size: u32, top_z: i32) -> (VoxelVolume, SurfaceMap) {
        let mut volume = VoxelVolume::new(size, size, size);
        for x in 0..size as i32 {
            for y in 0..size as i32 {
                for z in 0..=top_z {
                    volume.set(VoxelCoord::new(x, y, z), Material::Rock).unwrap();
                }
            }
        }
        let mut surfaces = SurfaceMap::new();
        surfaces.rebuild(&volume);
        (volume, surfaces)
    }

    fn id(x: i32, y: i32, z: i32) -> VoxelId {
        VoxelId::pack(VoxelCoord::new(x, y, z))
    }

    fn assert_reciprocal(graph: &PathGraph) {
        for waypoint in graph.iter() {
            for dir in Direction::ALL {
                let Some(target) = waypoint.exit(dir).target else {
                    continue;
                };
                let partner = graph
                    .get(target)
                    .unwrap_or_else(|| panic!("dangling exit {} -> {target}", waypoint.coord));
                assert_eq!(
                    partner.exit(dir.opposite()).target,
                    Some(waypoint.id()),
                    "exit {dir:?} from {} is not mirrored",
                    waypoint.coord
                );
            }
        }
    }

    fn assert_roads_symmetric(graph: &PathGraph) {
        for waypoint in graph.iter() {
            for dir in Direction::ALL {
                let exit = waypoint.exit(dir);
                if exit.road != RoadState::Built {
                    continue;
                }
                let partner = graph.get(exit.target.unwrap()).unwrap();
                assert_eq!(partner.exit(dir.opposite()).road, RoadState::Built);
                assert!(waypoint.is_road && partner.is_road);
            }
        }
    }

    #[test]
    fn flat_ground_links_sides_and_corners() {
        let (_, surfaces) = flat_world(5);
        let mut graph = PathGraph::new();
        graph.rebuild(&surfaces, &PathConfig::default());
        assert_eq!(graph.len(), 25);

        let middle = graph.get(id(2, 2, 1)).unwrap();
        assert_eq!(middle.exit(Direction::North).target, Some(id(2, 3, 1)));
        assert_eq!(middle.exit(Direction::North).weight, 5.0);
        assert_eq!(middle.exit(Direction::NorthEast).target, Some(id(3, 3, 1)));
        assert!((middle.exit(Direction::NorthEast).weight - 50f32.sqrt()).abs() < 1e-5);
        assert_eq!(middle.exit(Direction::Above).target, None);
        assert_eq!(middle.exit(Direction::North).road, RoadState::Possible);

        let corner = graph.get(id(0, 0, 1)).unwrap();
        assert_eq!(corner.links().count(), 3, "edge of the world");
        assert_reciprocal(&graph);
    }

    #[test]
    fn ramp_links_both_levels() {
        let (mut volume, _) = flat_world(6);
        volume.set(VoxelCoord::new(2, 3, 1), Material::Dirt).unwrap();
        let mut surfaces = SurfaceMap::new();
        surfaces.rebuild(&volume);
        let paths = PathConfig::default();
        let mut graph = PathGraph::new();
        graph.rebuild(&surfaces, &paths);

        let ramp = graph.get(id(2, 2, 1)).unwrap();
        let up = ramp.exit(Direction::North);
        assert_eq!(up.target, Some(id(2, 3, 2)), "top of the ramp leads onto the block");
        assert!((up.weight - paths.side_slope() * paths.slope_effort).abs() < 1e-4);

        let top = graph.get(id(2, 3, 2)).unwrap();
        let down = top.exit(Direction::South);
        assert_eq!(down.target, Some(id(2, 2, 1)));
        assert!((down.weight - paths.side_slope()).abs() < 1e-4);

        let below = graph.get(id(2, 1, 1)).unwrap();
        assert_eq!(below.exit(Direction::North).target, Some(id(2, 2, 1)));
        assert_reciprocal(&graph);
    }

    #[test]
    fn road_needs_both_ends() {
        let (volume, surfaces) = flat_world(5);
        let mut graph = PathGraph::new();
        graph.rebuild(&surfaces, &PathConfig::default());

        let a = VoxelCoord::new(1, 2, 1);
        let b = VoxelCoord::new(2, 2, 1);
        graph.build_road(a, &surfaces, &volume).unwrap();
        assert!(!graph.has_road(id(1, 2, 1), id(2, 2, 1)), "one end is not a road yet");

        graph.build_road(b, &surfaces, &volume).unwrap();
        assert!(graph.has_road(id(1, 2, 1), id(2, 2, 1)));
        assert!(graph.has_road(id(2, 2, 1), id(1, 2, 1)));
        assert_roads_symmetric(&graph);

        // Toggling again removes it.
        graph.build_road(b, &surfaces, &volume).unwrap();
        assert!(!graph.has_road(id(1, 2, 1), id(2, 2, 1)));
        assert_roads_symmetric(&graph);
    }

    #[test]
    fn side_road_suppresses_corner_road() {
        let (volume, surfaces) = flat_world(5);
        let mut graph = PathGraph::new();
        graph.rebuild(&surfaces, &PathConfig::default());
        for c in [(1, 1), (1, 2), (2, 2)] {
            graph
                .build_road(VoxelCoord::new(c.0, c.1, 1), &surfaces, &volume)
                .unwrap();
        }
        let origin = graph.get(id(1, 1, 1)).unwrap();
        assert_eq!(origin.exit(Direction::North).road, RoadState::Built);
        assert_ne!(origin.exit(Direction::NorthEast).road, RoadState::Built);
        assert_roads_symmetric(&graph);
    }

    #[test]
    fn demolish_without_road_is_noop() {
        let (volume, surfaces) = flat_world(5);
        let mut graph = PathGraph::new();
        graph.rebuild(&surfaces, &PathConfig::default());
        assert!(graph.demolish(VoxelCoord::new(2, 2, 1), &surfaces, &volume).is_none());
        assert!(graph.build_road(VoxelCoord::new(2, 2, 3), &surfaces, &volume).is_none());
        graph.build_road(VoxelCoord::new(2, 2, 1), &surfaces, &volume).unwrap();
        assert!(graph.demolish(VoxelCoord::new(2, 2, 1), &surfaces, &volume).is_some());
        assert!(!graph.get(id(2, 2, 1)).unwrap().is_road);
    }

    #[test]
    fn update_after_dig_keeps_graph_reciprocal() {
        let (mut volume, mut surfaces) = layered_world(6, 1);
        let paths = PathConfig::default();
        let mut graph = PathGraph::new();
        graph.rebuild(&surfaces, &paths);

        let dig = VoxelCoord::new(3, 3, 1);
        volume.set(dig, Material::Air).unwrap();
        let update = surfaces.handle_voxel_set(&volume, dig);
        graph.handle_surface_update(&BTreeSet::from([update.cleared]), &surfaces, &volume, &paths);
        graph.handle_surface_update(&update.updated, &surfaces, &volume, &paths);

        assert!(!graph.contains(id(3, 3, 2)), "nothing to stand on over the hole");
        let pit = graph.get(id(3, 3, 1)).expect("the pit floor is walkable");
        assert_eq!(pit.links().count(), 0, "walled in on every side");
        assert!(!graph.has_exit(id(2, 3, 2), id(3, 3, 2)));
        assert_reciprocal(&graph);
    }
}
