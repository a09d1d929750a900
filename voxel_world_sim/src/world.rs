// Run-length-encoded voxel volume.
//
// The volume is a fixed X×Y grid of `VoxelColumn`s. Each column stores its Z
// extent as `(count, material)` runs, so a typical terrain column (rock, dirt,
// air) costs three runs instead of one byte per cell. Reads walk the runs;
// writes expand the column, compare, write, and recompress.
//
// Unlike the rest of the sim, the public accessors are strict: addressing a
// cell outside the extent returns `SimError::InvalidCoordinate` instead of
// clamping. `is_solid_at` / `is_open` are the lenient probes the derived
// layers use for neighbor checks, where "outside" simply means "not there".
//
// Terrain generation sums octaves of Perlin noise (the `noise` crate) into a
// height field, then lays dirt over rock.
//
// See also: `surface.rs` and `stress.rs`, which derive their state from this
// volume, `sim.rs` which owns the `VoxelVolume` and publishes its changes.
//
// **Critical constraint: determinism.** Generation depends only on the noise
// seed and `TerrainConfig`. All mutation goes through `SimState`.

use crate::config::TerrainConfig;
use crate::error::{SimError, SimResult};
use crate::types::{Material, VOXEL_ID_AXIS_BITS, VoxelCoord, VoxelId};
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// VoxelColumn
// ---------------------------------------------------------------------------

/// One `(count, material)` run inside a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub count: u16,
    pub material: Material,
}

/// A vertical stack of voxels stored as runs, bottom first.
///
/// Invariant: run counts are non-zero and sum to the column height.
/// Adjacent runs always differ in material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelColumn {
    runs: SmallVec<[Run; 4]>,
}

impl VoxelColumn {
    /// A column of `height` air cells.
    pub fn new(height: u16) -> Self {
        let mut runs = SmallVec::new();
        runs.push(Run {
            count: height,
            material: Material::Air,
        });
        Self { runs }
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn height(&self) -> usize {
        self.runs.iter().map(|r| r.count as usize).sum()
    }

    /// Material at `z`, or `None` past the top.
    pub fn get(&self, z: usize) -> Option<Material> {
        let mut remaining = z;
        for run in &self.runs {
            let count = run.count as usize;
            if remaining < count {
                return Some(run.material);
            }
            remaining -= count;
        }
        None
    }

    /// Write one cell. Returns `false` if it already held `material` (or
    /// `z` is past the top).
    pub fn set(&mut self, z: usize, material: Material) -> bool {
        let mut cells = self.expand();
        match cells.get_mut(z) {
            Some(cell) if *cell != material => *cell = material,
            _ => return false,
        }
        *self = Self::compress(&cells);
        true
    }

    /// One material per cell, bottom first.
    pub fn expand(&self) -> Vec<Material> {
        let mut cells = Vec::with_capacity(self.height());
        for run in &self.runs {
            cells.extend(std::iter::repeat_n(run.material, run.count as usize));
        }
        cells
    }

    /// Build a column from per-cell materials. An empty slice gives an empty
    /// column.
    pub fn compress(cells: &[Material]) -> Self {
        let mut runs: SmallVec<[Run; 4]> = SmallVec::new();
        for &material in cells {
            match runs.last_mut() {
                Some(run) if run.material == material => run.count += 1,
                _ => runs.push(Run { count: 1, material }),
            }
        }
        Self { runs }
    }
}

// ---------------------------------------------------------------------------
// VoxelVolume
// ---------------------------------------------------------------------------

const SIDE_AND_VERTICAL_OFFSETS: [[i32; 3]; 6] = [
    [0, 1, 0],
    [1, 0, 0],
    [0, -1, 0],
    [-1, 0, 0],
    [0, 0, 1],
    [0, 0, -1],
];

/// The authoritative material grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoxelVolume {
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    /// Indexed `x * size_y + y`.
    columns: Vec<VoxelColumn>,
}

impl VoxelVolume {
    /// An all-air volume. Each axis is capped at what a `VoxelId` can pack.
    pub fn new(size_x: u32, size_y: u32, size_z: u32) -> Self {
        let cap = 1u32 << VOXEL_ID_AXIS_BITS;
        let (size_x, size_y, size_z) = (size_x.min(cap), size_y.min(cap), size_z.min(cap));
        let column = VoxelColumn::new(size_z as u16);
        Self {
            size_x,
            size_y,
            size_z,
            columns: vec![column; (size_x * size_y) as usize],
        }
    }

    pub fn in_bounds(&self, coord: VoxelCoord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.z >= 0
            && (coord.x as u32) < self.size_x
            && (coord.y as u32) < self.size_y
            && (coord.z as u32) < self.size_z
    }

    /// Checked `VoxelId` construction.
    pub fn id(&self, coord: VoxelCoord) -> Option<VoxelId> {
        self.in_bounds(coord).then(|| VoxelId::pack(coord))
    }

    fn check(&self, coord: VoxelCoord) -> SimResult<()> {
        if self.in_bounds(coord) {
            Ok(())
        } else {
            Err(SimError::InvalidCoordinate {
                coord,
                size_x: self.size_x,
                size_y: self.size_y,
                size_z: self.size_z,
            })
        }
    }

    fn column_index(&self, x: i32, y: i32) -> usize {
        x as usize * self.size_y as usize + y as usize
    }

    pub fn column(&self, x: i32, y: i32) -> Option<&VoxelColumn> {
        let probe = VoxelCoord::new(x, y, 0);
        (self.in_bounds(probe) && self.size_z > 0).then(|| &self.columns[self.column_index(x, y)])
    }

    pub fn get(&self, coord: VoxelCoord) -> SimResult<Material> {
        self.check(coord)?;
        let column = &self.columns[self.column_index(coord.x, coord.y)];
        Ok(column.get(coord.z as usize).unwrap_or_default())
    }

    /// Write a cell. `Ok(false)` when the cell already held `material`.
    pub fn set(&mut self, coord: VoxelCoord, material: Material) -> SimResult<bool> {
        self.check(coord)?;
        let index = self.column_index(coord.x, coord.y);
        Ok(self.columns[index].set(coord.z as usize, material))
    }

    /// Material at `coord`, treating out-of-range cells as air.
    pub fn material(&self, coord: VoxelCoord) -> Material {
        self.get(coord).unwrap_or_default()
    }

    /// In range and solid.
    pub fn is_solid_at(&self, coord: VoxelCoord) -> bool {
        self.material(coord).is_solid()
    }

    /// In range and not solid.
    pub fn is_open(&self, coord: VoxelCoord) -> bool {
        self.in_bounds(coord) && !self.material(coord).is_solid()
    }

    /// A cell can take a new block if it is in range, empty, and rests
    /// directly on a solid in-range cell.
    pub fn is_buildable(&self, coord: VoxelCoord) -> bool {
        self.is_open(coord) && self.is_solid_at(coord.offset(0, 0, -1))
    }

    /// Replace every column from a summed Perlin height field seeded by
    /// `noise_seed`.
    pub fn generate(&mut self, terrain: &TerrainConfig, noise_seed: u32) {
        let perlin = Perlin::new(noise_seed);
        let cap = f64::from(terrain.max_height.min(self.size_z));
        for x in 0..self.size_x as i32 {
            for y in 0..self.size_y as i32 {
                let mut height = 0.0;
                for octave in &terrain.octaves {
                    let sample = perlin.get([
                        f64::from(x) * octave.frequency,
                        f64::from(y) * octave.frequency,
                    ]);
                    height += octave.amplitude * ((sample + 1.0) * 0.5).clamp(0.0, 1.0);
                }
                let height = height.min(cap);
                let rock_height = height - f64::from(terrain.dirt_depth);
                let cells: Vec<Material> = (0..self.size_z)
                    .map(|z| {
                        let z = f64::from(z);
                        if z < rock_height {
                            Material::Rock
                        } else if z < height {
                            Material::Dirt
                        } else {
                            Material::Air
                        }
                    })
                    .collect();
                let index = self.column_index(x, y);
                self.columns[index] = VoxelColumn::compress(&cells);
            }
        }
        log::info!(
            "generated {}x{}x{} terrain (noise seed {noise_seed})",
            self.size_x,
            self.size_y,
            self.size_z
        );
    }

    /// Every in-range cell, for full rebuilds.
    pub fn ids(&self) -> impl Iterator<Item = VoxelId> + '_ {
        (0..self.size_x as i32).flat_map(move |x| {
            (0..self.size_y as i32).flat_map(move |y| {
                (0..self.size_z as i32).map(move |z| VoxelId::pack(VoxelCoord::new(x, y, z)))
            })
        })
    }

    /// `ids` plus their in-range non-solid side and vertical neighbors.
    pub fn expand_air_set(&self, ids: &BTreeSet<VoxelId>) -> BTreeSet<VoxelId> {
        let mut expanded = ids.clone();
        for id in ids {
            let coord = id.coord();
            for [dx, dy, dz] in SIDE_AND_VERTICAL_OFFSETS {
                let neighbor = coord.offset(dx, dy, dz);
                if self.is_open(neighbor) {
                    expanded.insert(VoxelId::pack(neighbor));
                }
            }
        }
        expanded
    }

    /// `ids` plus every in-range cell in their 3×3×3 neighborhoods.
    pub fn expand_diagonally(&self, ids: &BTreeSet<VoxelId>) -> BTreeSet<VoxelId> {
        let mut expanded = BTreeSet::new();
        for id in ids {
            let coord = id.coord();
            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        if let Some(n) = self.id(coord.offset(dx, dy, dz)) {
                            expanded.insert(n);
                        }
                    }
                }
            }
        }
        expanded
    }

    /// Does any side or vertical neighbor hold solid material?
    pub fn has_solid_face_neighbor(&self, coord: VoxelCoord) -> bool {
        SIDE_AND_VERTICAL_OFFSETS
            .iter()
            .any(|&[dx, dy, dz]| self.is_solid_at(coord.offset(dx, dy, dz)))
    }
}

impl Default for VoxelVolume {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}
