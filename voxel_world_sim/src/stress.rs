// Cantilever stress and collapse.
//
// Every solid voxel has an integer stress: zero when it is supported (bottom
// layer, or solid directly below), otherwise one more than the least-stressed
// solid horizontal neighbor, capped at `max_stress`. A voxel whose stress
// exceeds its material strength is queued in `collapsing`; the periodic
// collapse tick turns the ones still over strength into air.
//
// Only stressed voxels are stored (`BTreeMap<VoxelId, u32>`, absent = 0), so
// a flat world costs nothing.
//
// ## Key functions
//
// - `rebuild()`: seed every solid-over-air voxel at `max_stress`, set the ones
//   next to a supported neighbor to 1, then relax outward breadth-first.
// - `handle_voxel_set()`: incremental update after one edit. Propagation uses
//   an explicit work stack and stops at any voxel that goes over strength, so
//   neighbors of a failing voxel are not revisited until it actually falls.
// - `collapse_tick()`: drain `collapsing` into the list of doomed voxels.
//
// See also: `world.rs` for the volume being evaluated, `sim.rs` which
// schedules the collapse tick and feeds doomed voxels back through the
// normal edit cascade.
//
// **Critical constraint: determinism.** Doomed voxels are returned in
// ascending strength order, ties broken by `VoxelId`.

use crate::config::StressConfig;
use crate::types::{Direction, VoxelCoord, VoxelId};
use crate::world::VoxelVolume;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Neighbors whose stress depends on a cell: the four sides and the cell
/// above.
const DEPENDENTS: [Direction; 5] = [
    Direction::North,
    Direction::East,
    Direction::South,
    Direction::West,
    Direction::Above,
];

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StressMap {
    stress: BTreeMap<VoxelId, u32>,
    /// Voxels that went over strength since the last collapse tick.
    collapsing: BTreeSet<VoxelId>,
}

impl StressMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stress of a voxel; zero when absent.
    pub fn get(&self, id: VoxelId) -> u32 {
        self.stress.get(&id).copied().unwrap_or(0)
    }

    fn set(&mut self, id: VoxelId, stress: u32) {
        if stress > 0 {
            self.stress.insert(id, stress);
        } else {
            self.stress.remove(&id);
        }
    }

    /// Number of stressed voxels.
    pub fn len(&self) -> usize {
        self.stress.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stress.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VoxelId, u32)> + '_ {
        self.stress.iter().map(|(id, s)| (*id, *s))
    }

    pub fn collapsing(&self) -> &BTreeSet<VoxelId> {
        &self.collapsing
    }

    pub fn is_supported(volume: &VoxelVolume, coord: VoxelCoord) -> bool {
        coord.z == 0 || volume.is_solid_at(coord.step(Direction::Below))
    }

    /// Lowest stress among the solid horizontal neighbors, or `max_stress`
    /// when there are none.
    fn min_adjacent_stress(
        &self,
        volume: &VoxelVolume,
        coord: VoxelCoord,
        config: &StressConfig,
    ) -> u32 {
        Direction::SIDES
            .iter()
            .map(|&dir| coord.step(dir))
            .filter(|&n| volume.is_solid_at(n))
            .map(|n| self.get(VoxelId::pack(n)))
            .fold(config.max_stress, u32::min)
    }

    fn over_strength(&self, volume: &VoxelVolume, id: VoxelId, config: &StressConfig) -> bool {
        self.get(id) > config.strength(volume.material(id.coord()))
    }

    /// Recompute every stress value from scratch.
    pub fn rebuild(&mut self, volume: &VoxelVolume, config: &StressConfig) {
        self.stress.clear();
        self.collapsing.clear();

        for x in 0..volume.size_x as i32 {
            for y in 0..volume.size_y as i32 {
                let mut previous_solid = true;
                for z in 0..volume.size_z as i32 {
                    let coord = VoxelCoord::new(x, y, z);
                    let solid = volume.is_solid_at(coord);
                    if solid && !previous_solid {
                        self.stress.insert(VoxelId::pack(coord), config.max_stress);
                    }
                    previous_solid = solid;
                }
            }
        }

        // Seeds next to a supported neighbor. Ids are checked in order, so a
        // seed lowered here can shadow its later neighbors; the relaxation
        // below fixes those up.
        let seeds: Vec<VoxelId> = self.stress.keys().copied().collect();
        let mut frontier = Vec::new();
        for id in seeds {
            if self.min_adjacent_stress(volume, id.coord(), config) == 0 {
                self.set(id, 1);
                frontier.push(id);
            }
        }

        let mut next = Vec::new();
        while !frontier.is_empty() {
            for &id in &frontier {
                let stress = self.get(id).saturating_add(1);
                for dir in Direction::SIDES {
                    let Some(neighbor) = volume.id(id.coord().step(dir)) else {
                        continue;
                    };
                    if stress < self.get(neighbor) {
                        self.set(neighbor, stress);
                        next.push(neighbor);
                    }
                }
            }
            std::mem::swap(&mut frontier, &mut next);
            next.clear();
        }

        let over: Vec<VoxelId> = self
            .stress
            .keys()
            .copied()
            .filter(|&id| self.over_strength(volume, id, config))
            .collect();
        self.collapsing.extend(over);

        log::info!(
            "stress rebuilt: {} stressed voxels, {} collapsing",
            self.stress.len(),
            self.collapsing.len()
        );
    }

    /// Update stress after the voxel at `coord` changed. `volume` must
    /// already hold the new material.
    pub fn handle_voxel_set(
        &mut self,
        volume: &VoxelVolume,
        coord: VoxelCoord,
        config: &StressConfig,
    ) {
        let mut stack = Vec::new();
        if volume.is_solid_at(coord) {
            stack.push(coord);
        } else {
            self.stress.remove(&VoxelId::pack(coord));
            push_dependents(volume, coord, &mut stack);
        }

        let mut visited = 0usize;
        while let Some(current) = stack.pop() {
            visited += 1;
            let id = VoxelId::pack(current);
            let old = self.get(id);
            let new = if Self::is_supported(volume, current) {
                0
            } else {
                self.min_adjacent_stress(volume, current, config)
                    .saturating_add(1)
                    .min(config.max_stress)
            };
            if new == old {
                continue;
            }
            self.set(id, new);

            if self.over_strength(volume, id, config) {
                // Neighbors are left alone until this voxel falls.
                self.collapsing.insert(id);
                continue;
            }
            push_dependents(volume, current, &mut stack);
        }
        log::debug!("stress updated around {coord}: {visited} voxels visited");
    }

    /// Take the voxels that are still over strength, weakest first. The
    /// caller turns each into air.
    pub fn collapse_tick(&mut self, volume: &VoxelVolume, config: &StressConfig) -> Vec<VoxelId> {
        let collapsing = std::mem::take(&mut self.collapsing);
        let mut doomed: Vec<(u32, VoxelId)> = collapsing
            .into_iter()
            .filter(|&id| self.over_strength(volume, id, config))
            .map(|id| (config.strength(volume.material(id.coord())), id))
            .collect();
        doomed.sort_unstable();
        if !doomed.is_empty() {
            log::debug!("collapse tick: {} voxels doomed", doomed.len());
        }
        doomed.into_iter().map(|(_, id)| id).collect()
    }
}

/// Push the solid side and above neighbors of `coord` so that the first
/// direction is popped (and fully explored) first.
fn push_dependents(volume: &VoxelVolume, coord: VoxelCoord, stack: &mut Vec<VoxelCoord>) {
    for dir in DEPENDENTS.iter().rev() {
        let neighbor = coord.step(*dir);
        if volume.is_solid_at(neighbor) {
            stack.push(neighbor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Material;

    fn id(x: i32, y: i32, z: i32) -> VoxelId {
        VoxelId::pack(VoxelCoord::new(x, y, z))
    }

    /// A pillar at x = 0 holding up a horizontal arm of `material` at z = 2.
    fn arm(len: i32, material: Material) -> VoxelVolume {
        let mut volume = VoxelVolume::new((len + 2) as u32, 3, 5);
        for z in 0..=2 {
            volume.set(VoxelCoord::new(0, 1, z), Material::Rock).unwrap();
        }
        for x in 1..=len {
            volume.set(VoxelCoord::new(x, 1, 2), material).unwrap();
        }
        volume
    }

    /// Build `volume` one voxel at a time, bottom-up, running the
    /// incremental update after each placement.
    fn build_incrementally(volume: &VoxelVolume, config: &StressConfig) -> StressMap {
        let mut partial = VoxelVolume::new(volume.size_x, volume.size_y, volume.size_z);
        let mut map = StressMap::new();
        for z in 0..volume.size_z as i32 {
            for x in 0..volume.size_x as i32 {
                for y in 0..volume.size_y as i32 {
                    let c = VoxelCoord::new(x, y, z);
                    let m = volume.material(c);
                    if m.is_solid() {
                        partial.set(c, m).unwrap();
                        map.handle_voxel_set(&partial, c, config);
                    }
                }
            }
        }
        map
    }

    #[test]
    fn supported_voxels_carry_no_stress() {
        let mut volume = VoxelVolume::new(4, 4, 3);
        for x in 0..4 {
            for y in 0..4 {
                volume.set(VoxelCoord::new(x, y, 0), Material::Sand).unwrap();
                volume.set(VoxelCoord::new(x, y, 1), Material::Sand).unwrap();
            }
        }
        let config = StressConfig::default();
        let mut map = StressMap::new();
        map.rebuild(&volume, &config);
        assert!(map.is_empty());
        assert!(map.collapsing().is_empty());
    }

    #[test]
    fn arm_stress_grows_with_distance_from_support() {
        let config = StressConfig::default();
        let volume = arm(4, Material::Rock);
        let mut map = StressMap::new();
        map.rebuild(&volume, &config);
        for x in 1..=4 {
            assert_eq!(map.get(id(x, 1, 2)), x as u32);
        }
        assert_eq!(map.get(id(0, 1, 2)), 0);
        assert!(map.collapsing().is_empty());
    }

    #[test]
    fn incremental_matches_rebuild() {
        let config = StressConfig::default();
        let volume = arm(5, Material::Clay);
        let mut rebuilt = StressMap::new();
        rebuilt.rebuild(&volume, &config);
        let incremental = build_incrementally(&volume, &config);
        for x in 1..=5 {
            let cell = id(x, 1, 2);
            assert_eq!(rebuilt.get(cell), incremental.get(cell), "at x = {x}");
        }
        assert_eq!(rebuilt.collapsing(), incremental.collapsing());
    }

    #[test]
    fn floating_voxel_is_capped_at_max() {
        let config = StressConfig::default();
        let mut volume = VoxelVolume::new(3, 3, 4);
        let c = VoxelCoord::new(1, 1, 2);
        volume.set(c, Material::Rock).unwrap();

        let mut map = StressMap::new();
        map.rebuild(&volume, &config);
        assert_eq!(map.get(VoxelId::pack(c)), config.max_stress);

        let mut incremental = StressMap::new();
        incremental.handle_voxel_set(&volume, c, &config);
        assert_eq!(incremental.get(VoxelId::pack(c)), config.max_stress);
        assert!(incremental.collapsing().contains(&VoxelId::pack(c)));
    }

    #[test]
    fn stress_cap_at_u32_max_saturates() {
        let config = StressConfig {
            max_stress: u32::MAX,
            ..StressConfig::default()
        };
        let mut volume = VoxelVolume::new(5, 5, 5);
        let c = VoxelCoord::new(2, 2, 3);
        volume.set(c, Material::Rock).unwrap();

        let mut map = StressMap::new();
        map.handle_voxel_set(&volume, c, &config);
        assert_eq!(map.get(VoxelId::pack(c)), u32::MAX);
        assert!(map.collapsing().contains(&VoxelId::pack(c)));

        let mut rebuilt = StressMap::new();
        rebuilt.rebuild(&volume, &config);
        assert_eq!(rebuilt.get(VoxelId::pack(c)), u32::MAX);
    }

    #[test]
    fn sand_overhang_collapses_immediately() {
        let config = StressConfig::default();
        let volume = arm(1, Material::Sand);
        let mut map = StressMap::new();
        map.rebuild(&volume, &config);
        assert_eq!(map.get(id(1, 1, 2)), 1);
        assert_eq!(map.collapse_tick(&volume, &config), vec![id(1, 1, 2)]);
        assert!(map.collapsing().is_empty());
    }

    #[test]
    fn collapse_removes_only_the_overstressed_tail() {
        let config = StressConfig::default();
        let mut volume = arm(4, Material::Dirt);
        let mut map = StressMap::new();
        map.rebuild(&volume, &config);

        let doomed = map.collapse_tick(&volume, &config);
        assert_eq!(doomed, vec![id(3, 1, 2), id(4, 1, 2)]);
        for cell in doomed {
            volume.set(cell.coord(), Material::Air).unwrap();
            map.handle_voxel_set(&volume, cell.coord(), &config);
        }
        assert_eq!(map.get(id(1, 1, 2)), 1);
        assert_eq!(map.get(id(2, 1, 2)), 2);
        assert_eq!(map.get(id(3, 1, 2)), 0);
        assert!(map.collapse_tick(&volume, &config).is_empty());
    }

    #[test]
    fn removing_support_cascades() {
        let config = StressConfig::default();
        let mut volume = arm(2, Material::Rock);
        let mut map = StressMap::new();
        map.rebuild(&volume, &config);
        assert!(map.collapsing().is_empty());

        // Knock out the pillar top; the arm now only holds itself up.
        let top = VoxelCoord::new(0, 1, 2);
        volume.set(top, Material::Air).unwrap();
        map.handle_voxel_set(&volume, top, &config);
        assert!(!map.collapsing().is_empty());

        let mut ticks = 0;
        loop {
            let doomed = map.collapse_tick(&volume, &config);
            if doomed.is_empty() {
                break;
            }
            for cell in doomed {
                volume.set(cell.coord(), Material::Air).unwrap();
                map.handle_voxel_set(&volume, cell.coord(), &config);
            }
            ticks += 1;
            assert!(ticks < 10, "collapse did not settle");
        }
        assert_eq!(volume.material(VoxelCoord::new(1, 1, 2)), Material::Air);
        assert_eq!(volume.material(VoxelCoord::new(2, 1, 2)), Material::Air);
        assert_eq!(volume.material(VoxelCoord::new(0, 1, 1)), Material::Rock);
        assert!(map.is_empty());
    }

    #[test]
    fn collapse_order_is_weakest_first() {
        let config = StressConfig::default();
        // Two floating voxels: rock at x = 1 and sand at x = 3.
        let mut volume = VoxelVolume::new(5, 3, 4);
        volume.set(VoxelCoord::new(1, 1, 2), Material::Rock).unwrap();
        volume.set(VoxelCoord::new(3, 1, 2), Material::Sand).unwrap();
        let mut map = StressMap::new();
        map.rebuild(&volume, &config);
        assert_eq!(
            map.collapse_tick(&volume, &config),
            vec![id(3, 1, 2), id(1, 1, 2)]
        );
    }

    #[test]
    fn air_edits_drop_the_entry() {
        let config = StressConfig::default();
        let mut volume = arm(3, Material::Rock);
        let mut map = StressMap::new();
        map.rebuild(&volume, &config);
        let end = VoxelCoord::new(3, 1, 2);
        volume.set(end, Material::Air).unwrap();
        map.handle_voxel_set(&volume, end, &config);
        assert_eq!(map.get(VoxelId::pack(end)), 0);
        assert_eq!(map.len(), 2);
    }
}
