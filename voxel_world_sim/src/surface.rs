// Walkable surface geometry derived from the voxel volume.
//
// Every air cell that touches solid material (or borders a neighbor's ramp)
// gets a `Surface`: one of twelve `Shape`s, a `facing` (clockwise quarter
// turns, 0 = north), the material behind each of its six faces, and the
// triangular side pieces borrowed from adjacent ramps. Classification runs
// in three passes because later passes read the results of earlier passes
// on neighboring cells:
//
// 1. `find_faces` + `find_ramps` — local volume lookups only.
// 2. `find_floors` + `find_triangles` — read neighbor surfaces from pass 1.
// 3. `find_shims` + `lift_floors` — read this cell's pass-2 side pieces.
//
// Shape geometry (`elevation`, `slope`, exits) is written in the facing-0
// frame and rotated by `facing`. Exit levels feed `nav.rs`; elevation and
// slope feed actor movement in `actor.rs`.
//
// `SurfaceMap` owns the sparse `VoxelId -> Surface` table. A full rebuild
// runs on terrain generation; a single voxel edit recomputes only a fixed
// neighborhood around the edit (`PRIMARY_OFFSETS` plus its air expansion).
//
// See also: `world.rs` for the volume, `nav.rs` which consumes exit levels.
//
// **Critical constraint: determinism.** Passes iterate `BTreeSet`s in
// `VoxelId` order; random picks draw from the sim `GameRng`.

use crate::prng::GameRng;
use crate::types::{Direction, Material, VoxelCoord, VoxelId};
use crate::world::VoxelVolume;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Reported by `elevation` where a cell holds no walkable geometry.
pub const MIN_ELEVATION: f32 = -10_000.0;

/// Cells whose surface can change when the voxel at the origin changes.
const PRIMARY_OFFSETS: [[i32; 3]; 31] = [
    [0, 0, 1],
    [1, 0, 1],
    [-1, 0, 1],
    [0, 1, 1],
    [0, -1, 1],
    [0, 0, 0],
    [1, 0, 0],
    [-1, 0, 0],
    [0, 1, 0],
    [0, -1, 0],
    [1, 1, 0],
    [-1, 1, 0],
    [1, -1, 0],
    [-1, -1, 0],
    [2, 0, 0],
    [-2, 0, 0],
    [0, 2, 0],
    [0, -2, 0],
    [0, 0, -1],
    [1, 0, -1],
    [-1, 0, -1],
    [0, 1, -1],
    [0, -1, -1],
    [1, 1, -1],
    [-1, 1, -1],
    [1, -1, -1],
    [-1, -1, -1],
    [2, 0, -1],
    [-2, 0, -1],
    [0, 2, -1],
    [0, -2, -1],
];

// ---------------------------------------------------------------------------
// Shape vocabulary
// ---------------------------------------------------------------------------

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Shape {
    /// No geometry; equivalent to no surface at all.
    #[default]
    None = 0,
    /// Walls or ceiling only, nothing to stand on.
    SidesOnly = 1,
    Flat = 2,
    /// Rises from the back edge to the `facing` edge.
    Ramp = 3,
    /// Floor over half the cell, at the top of a double ramp.
    HalfFlat = 4,
    Shim = 5,
    /// Two ramps meeting at the corner between `facing` and `facing + 1`.
    DoubleRamp = 6,
    /// Half flat, half shim.
    Wedge = 7,
    /// Two opposite shims.
    Butterfly = 8,
    /// Two adjacent shims.
    Cuban = 9,
    /// Ramp with a shim on its left.
    LeftSkew = 10,
    /// Ramp with a shim on its right.
    RightSkew = 11,
}

impl Shape {
    /// Can an actor stand here?
    pub fn is_traversable(self) -> bool {
        !matches!(self, Shape::None | Shape::SidesOnly)
    }

    fn is_ramp_like(self) -> bool {
        matches!(
            self,
            Shape::Ramp | Shape::DoubleRamp | Shape::LeftSkew | Shape::RightSkew
        )
    }
}

/// A triangular side piece borrowed from a neighboring ramp. `Solid` means
/// the side is a full edge (or open), with no triangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SideEdge {
    #[default]
    Solid,
    LeftTriangle,
    RightTriangle,
}

/// Where along the vertical an exit leaves the cell.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ExitLevel {
    #[default]
    None,
    Bottom,
    Middle,
    Top,
}

impl ExitLevel {
    fn from_code(code: u8) -> Self {
        match code {
            1 => ExitLevel::Bottom,
            2 => ExitLevel::Middle,
            3 => ExitLevel::Top,
            _ => ExitLevel::None,
        }
    }
}

fn levels(codes: [u8; 4]) -> [ExitLevel; 4] {
    codes.map(ExitLevel::from_code)
}

/// Rotate a side/corner array clockwise by `quarter_turns`.
pub fn rotate4<T: Copy>(a: [T; 4], quarter_turns: u8) -> [T; 4] {
    match quarter_turns % 4 {
        1 => [a[3], a[0], a[1], a[2]],
        2 => [a[2], a[3], a[0], a[1]],
        3 => [a[1], a[2], a[3], a[0]],
        _ => a,
    }
}

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surface {
    pub shape: Shape,
    /// Clockwise quarter turns from north, 0..4.
    pub facing: u8,
    /// Material behind each face, indexed by `Direction` (first six).
    pub faces: [Material; 6],
    /// Triangle pieces on the four sides, indexed N, E, S, W.
    pub sides: [SideEdge; 4],
}

impl Surface {
    pub fn is_traversable(&self) -> bool {
        self.shape.is_traversable()
    }

    fn face(&self, dir: Direction) -> bool {
        self.faces[dir.index()].is_solid()
    }

    /// Map a position in the cell into the facing-0 frame.
    fn unrotate(&self, x: f32, y: f32) -> (f32, f32) {
        match self.facing {
            1 => (1.0 - y, x),
            2 => (1.0 - x, 1.0 - y),
            3 => (y, 1.0 - x),
            _ => (x, y),
        }
    }

    /// Height of the walkable surface at `(x, y)` within the cell, both in
    /// `[0, 1]`. Half-cell shapes extrapolate over their empty half so
    /// actors on the seam do not fall; `MIN_ELEVATION` when not walkable.
    pub fn elevation(&self, x: f32, y: f32) -> f32 {
        let (xx, yy) = self.unrotate(x, y);
        let d = xx + yy;
        match self.shape {
            Shape::None | Shape::SidesOnly => MIN_ELEVATION,
            Shape::Flat => 0.0,
            Shape::Ramp => yy,
            Shape::HalfFlat => {
                if d < 1.0 {
                    1.0 - d
                } else {
                    0.0
                }
            }
            Shape::Shim | Shape::Butterfly => {
                if d < 1.0 {
                    1.0 - d
                } else {
                    d - 1.0
                }
            }
            Shape::DoubleRamp => d.min(1.0),
            Shape::Wedge => (d - 1.0).max(0.0),
            Shape::Cuban => 0f32.max(1.0 - d).max(xx - yy),
            Shape::LeftSkew => yy.max(1.0 - d),
            Shape::RightSkew => yy.max(xx - yy),
        }
    }

    /// Like `elevation`, but `None` where the shape has no geometry.
    pub fn raw_elevation(&self, x: f32, y: f32) -> Option<f32> {
        let (xx, yy) = self.unrotate(x, y);
        let d = xx + yy;
        match self.shape {
            Shape::None | Shape::SidesOnly => None,
            Shape::HalfFlat | Shape::Shim if d < 1.0 => None,
            Shape::DoubleRamp if d >= 1.0 => None,
            _ => Some(self.elevation(x, y)),
        }
    }

    /// Direction of steepest ascent at `(x, y)`, components in {-1, 0, 1}.
    pub fn slope(&self, x: f32, y: f32) -> [f32; 2] {
        let (xx, yy) = self.unrotate(x, y);
        let d = xx + yy;
        let local = match self.shape {
            Shape::None | Shape::SidesOnly | Shape::Flat | Shape::HalfFlat => [0.0, 0.0],
            Shape::Ramp => [0.0, 1.0],
            Shape::Shim | Shape::Wedge => {
                if d < 1.0 {
                    [0.0, 0.0]
                } else {
                    [1.0, 1.0]
                }
            }
            Shape::DoubleRamp => {
                if d > 1.0 {
                    [0.0, 0.0]
                } else {
                    [1.0, 1.0]
                }
            }
            Shape::Butterfly => {
                if d < 1.0 {
                    [-1.0, -1.0]
                } else {
                    [1.0, 1.0]
                }
            }
            Shape::Cuban => {
                if d >= 1.0 && xx <= yy {
                    [0.0, 0.0]
                } else if xx < 0.5 {
                    [-1.0, -1.0]
                } else {
                    [1.0, -1.0]
                }
            }
            Shape::LeftSkew => {
                if xx + 2.0 * yy < 1.0 {
                    [-1.0, -1.0]
                } else {
                    [0.0, 1.0]
                }
            }
            Shape::RightSkew => {
                if 1.0 - xx + 2.0 * yy < 1.0 {
                    [1.0, -1.0]
                } else {
                    [0.0, 1.0]
                }
            }
        };
        let [dx, dy] = local;
        match self.facing {
            1 => [dy, -dx],
            2 => [-dx, -dy],
            3 => [-dy, dx],
            _ => [dx, dy],
        }
    }

    /// Vertical exit through the middle of the cell.
    pub fn center_exit(&self) -> ExitLevel {
        match self.shape {
            Shape::HalfFlat | Shape::Shim => ExitLevel::Bottom,
            Shape::DoubleRamp => ExitLevel::Top,
            _ => ExitLevel::None,
        }
    }

    /// Exit levels on the N, E, S, W sides.
    pub fn side_exits(&self) -> [ExitLevel; 4] {
        let codes = match self.shape {
            Shape::Flat => [1, 1, 1, 1],
            Shape::Ramp => [3, 2, 1, 2],
            Shape::HalfFlat => [1, 1, 0, 0],
            Shape::Shim => [2, 2, 0, 0],
            Shape::DoubleRamp => [0, 0, 2, 2],
            Shape::Wedge => [2, 2, 1, 1],
            Shape::Butterfly => [2, 2, 2, 2],
            Shape::Cuban => [1, 2, 2, 2],
            Shape::LeftSkew | Shape::RightSkew => [3, 2, 2, 2],
            Shape::None | Shape::SidesOnly => [0, 0, 0, 0],
        };
        rotate4(levels(codes), self.facing)
    }

    /// Exit levels on the NE, SE, SW, NW corners. A corner next to a solid
    /// face has no exit.
    pub fn corner_exits(&self) -> [ExitLevel; 4] {
        let codes = match self.shape {
            Shape::Flat => [1, 1, 1, 1],
            Shape::Ramp => [3, 1, 1, 3],
            Shape::HalfFlat => [1, 1, 0, 1],
            Shape::Shim => [3, 1, 0, 1],
            Shape::DoubleRamp => [0, 3, 1, 3],
            Shape::Wedge => [3, 1, 1, 1],
            Shape::Butterfly => [3, 1, 3, 1],
            Shape::Cuban => [1, 3, 3, 1],
            Shape::LeftSkew => [3, 1, 3, 3],
            Shape::RightSkew => [3, 3, 1, 3],
            Shape::None | Shape::SidesOnly => [0, 0, 0, 0],
        };
        let mut exits = rotate4(levels(codes), self.facing);
        for (i, exit) in exits.iter_mut().enumerate() {
            let a = Direction::SIDES[i];
            let b = Direction::SIDES[(i + 1) % 4];
            if self.face(a) || self.face(b) {
                *exit = ExitLevel::None;
            }
        }
        exits
    }

    /// Can a road run out of this cell toward compass index `compass`
    /// (N=0, NE=1, ... NW=7)?
    pub fn allows_road(&self, compass: u8) -> bool {
        let f = self.facing;
        let along = |turns: u8| ((f + turns) * 2) % 8 == compass;
        match self.shape {
            Shape::Flat => true,
            Shape::Ramp => along(0) || along(2),
            Shape::HalfFlat => along(0) || along(1),
            Shape::Wedge => along(2) || along(3),
            _ => false,
        }
    }

    /// Does a ramp rise toward side `side` (0=N .. 3=W)?
    pub fn has_ramp(&self, side: u8) -> bool {
        (self.facing == side && self.shape.is_ramp_like())
            || (self.shape == Shape::DoubleRamp && (self.facing + 1) % 4 == side)
    }

    // -----------------------------------------------------------------------
    // Classification passes
    // -----------------------------------------------------------------------

    /// Pass 1a: record solid neighbors. Any wall or ceiling makes a
    /// `SidesOnly`; a solid floor makes a `Flat`.
    pub fn find_faces(&mut self, coord: VoxelCoord, volume: &VoxelVolume) {
        *self = Surface::default();
        for dir in [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
            Direction::Above,
        ] {
            let material = volume.material(coord.step(dir));
            if material.is_solid() {
                self.faces[dir.index()] = material;
                self.shape = Shape::SidesOnly;
            }
        }
        let below = volume.material(coord.step(Direction::Below));
        if below.is_solid() {
            self.faces[Direction::Below.index()] = below;
            self.shape = Shape::Flat;
        }
    }

    /// Pass 1b: turn walls into single or double ramps where there is a
    /// floor, open ceiling, and room to walk off the top.
    pub fn find_ramps(&mut self, coord: VoxelCoord, volume: &VoxelVolume) {
        if self.face(Direction::Above) || !self.face(Direction::Below) {
            return;
        }

        let mut ramp = [false; 4];
        for (i, r) in ramp.iter_mut().enumerate() {
            let side = Direction::SIDES[i];
            let opposite = Direction::SIDES[(i + 2) % 4];
            // A ramp must lead up into an open cell.
            let top = coord.step(side).step(Direction::Above);
            *r = self.face(side) && !self.face(opposite) && volume.is_open(top);
        }

        // A double ramp also needs the diagonal at its low corner open.
        for i in 0..4 {
            if ramp[i] && ramp[(i + 1) % 4] {
                let low_corner = coord.step(Direction::CORNERS[(i + 2) % 4]);
                if !volume.is_open(low_corner) {
                    ramp[i] = false;
                    ramp[(i + 1) % 4] = false;
                }
                break;
            }
        }

        let mut clear = |side: usize| self.faces[Direction::SIDES[side].index()] = Material::Air;
        let (shape, facing) = match ramp {
            [true, true, _, _] => {
                clear(0);
                clear(1);
                (Shape::DoubleRamp, 0)
            }
            [true, _, _, true] => {
                clear(0);
                clear(3);
                (Shape::DoubleRamp, 3)
            }
            [true, _, _, _] => {
                clear(0);
                (Shape::Ramp, 0)
            }
            [false, true, true, _] => {
                clear(1);
                clear(2);
                (Shape::DoubleRamp, 1)
            }
            [false, _, true, true] => {
                clear(2);
                clear(3);
                (Shape::DoubleRamp, 2)
            }
            [false, _, true, _] => {
                clear(2);
                (Shape::Ramp, 2)
            }
            [false, true, false, _] => {
                clear(1);
                (Shape::Ramp, 1)
            }
            [false, false, false, true] => {
                clear(3);
                (Shape::Ramp, 3)
            }
            [false, false, false, false] => return,
        };
        self.shape = shape;
        self.facing = facing;
    }

    /// Pass 2a: a cell above a double ramp becomes its half-flat top.
    pub fn find_floors(&mut self, coord: VoxelCoord, surfaces: &BTreeMap<VoxelId, Surface>) {
        let Some(below) = VoxelId::checked(coord.step(Direction::Below))
            .and_then(|id| surfaces.get(&id))
        else {
            return;
        };
        if below.shape != Shape::DoubleRamp {
            return;
        }
        self.shape = Shape::HalfFlat;
        self.facing = below.facing;
        self.faces[Direction::Below.index()] = below.faces[Direction::Below.index()];
    }

    /// Pass 2b: borrow the triangular side wall of a neighbor's ramp that
    /// rises across our shared edge.
    pub fn find_triangles(
        &mut self,
        coord: VoxelCoord,
        volume: &VoxelVolume,
        surfaces: &BTreeMap<VoxelId, Surface>,
    ) {
        for side in 0..4u8 {
            let Some(neighbor_id) = volume.id(coord.step(Direction::SIDES[side as usize])) else {
                continue;
            };
            let Some(neighbor) = surfaces.get(&neighbor_id) else {
                continue;
            };
            let left = (side + 3) % 4;
            let right = (side + 1) % 4;
            let edge = if neighbor.has_ramp(left) && !self.has_ramp(left) {
                SideEdge::LeftTriangle
            } else if neighbor.has_ramp(right) && !self.has_ramp(right) {
                SideEdge::RightTriangle
            } else {
                continue;
            };
            self.faces[side as usize] = neighbor.faces[Direction::Below.index()];
            self.sides[side as usize] = edge;
            if self.shape == Shape::None {
                self.shape = Shape::SidesOnly;
            }
        }
    }

    /// Pass 3a: extend neighboring ramps into this cell as shims, reshaping
    /// flats and ramps and dropping the faces the shims hide.
    pub fn find_shims(&mut self) {
        if !self.face(Direction::Below) {
            return;
        }

        let mut shim = [false; 4];
        for (i, s) in shim.iter_mut().enumerate() {
            let next = (i + 1) % 4;
            let left = self.sides[i] == SideEdge::RightTriangle;
            let right = self.sides[next] == SideEdge::LeftTriangle;
            let face_here = self.faces[i].is_solid();
            let face_next = self.faces[next].is_solid();
            *s = (left && right) || (left && face_next) || (face_here && right);
        }

        for (i, &s) in shim.iter().enumerate() {
            if !s {
                continue;
            }
            let next = (i + 1) % 4;
            if self.sides[i] == SideEdge::RightTriangle {
                self.faces[i] = Material::Air;
            }
            if self.sides[next] == SideEdge::LeftTriangle {
                self.faces[next] = Material::Air;
            }
        }

        match self.shape {
            Shape::Flat => {
                let reshaped = match shim {
                    [true, true, _, _] => Some((Shape::Cuban, 3)),
                    [true, _, true, _] => Some((Shape::Butterfly, 0)),
                    [true, _, _, true] => Some((Shape::Cuban, 2)),
                    [true, _, _, _] => Some((Shape::Wedge, 0)),
                    [false, true, true, _] => Some((Shape::Cuban, 0)),
                    [false, true, _, true] => Some((Shape::Butterfly, 1)),
                    [false, true, _, _] => Some((Shape::Wedge, 1)),
                    [false, false, true, true] => Some((Shape::Cuban, 1)),
                    [false, false, true, _] => Some((Shape::Wedge, 2)),
                    [false, false, false, true] => Some((Shape::Wedge, 3)),
                    [false, false, false, false] => None,
                };
                if let Some((shape, facing)) = reshaped {
                    self.shape = shape;
                    self.facing = facing;
                }
            }
            Shape::Ramp => {
                let f = self.facing as usize;
                if shim[(f + 1) % 4] {
                    self.shape = Shape::RightSkew;
                } else if shim[(f + 2) % 4] {
                    self.shape = Shape::LeftSkew;
                }
            }
            _ => {}
        }
    }

    /// Pass 3b: a half-flat bracketed by both triangles becomes a shim.
    pub fn lift_floors(&mut self) {
        if self.shape != Shape::HalfFlat {
            return;
        }
        let f = self.facing as usize % 4;
        if self.sides[f] == SideEdge::RightTriangle
            && self.sides[(f + 1) % 4] == SideEdge::LeftTriangle
        {
            self.shape = Shape::Shim;
        }
    }
}

// ---------------------------------------------------------------------------
// SurfaceMap
// ---------------------------------------------------------------------------

/// Ids touched by one voxel edit: the edited cell (cleared first) and the
/// recomputed neighborhood.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceUpdate {
    pub cleared: VoxelId,
    pub updated: BTreeSet<VoxelId>,
}

/// Sparse table of every non-null surface.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SurfaceMap {
    surfaces: BTreeMap<VoxelId, Surface>,
}

impl SurfaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: VoxelId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VoxelId, &Surface)> {
        self.surfaces.iter().map(|(id, s)| (*id, s))
    }

    pub fn is_traversable(&self, id: VoxelId) -> bool {
        self.get(id).is_some_and(Surface::is_traversable)
    }

    /// Store a surface, dropping it when null.
    fn put(&mut self, id: VoxelId, surface: Surface) {
        if surface.shape == Shape::None {
            self.surfaces.remove(&id);
        } else {
            self.surfaces.insert(id, surface);
        }
    }

    /// Elevation within cell `id` at fractional `(x, y)`.
    pub fn elevation(&self, id: VoxelId, x: f32, y: f32) -> f32 {
        self.get(id).map_or(MIN_ELEVATION, |s| s.elevation(x, y))
    }

    pub fn slope(&self, id: VoxelId, x: f32, y: f32) -> [f32; 2] {
        self.get(id).map_or([0.0, 0.0], |s| s.slope(x, y))
    }

    /// Absolute height of the first surface with geometry at or below a
    /// world-space position.
    pub fn raw_elevation_at(&self, position: [f32; 3]) -> Option<f32> {
        let [px, py, pz] = position;
        let (x, y) = (px.floor(), py.floor());
        let (fx, fy) = (px - x, py - y);
        let mut z = pz.floor() as i32;
        while z >= 0 {
            let elevation = VoxelId::checked(VoxelCoord::new(x as i32, y as i32, z))
                .and_then(|id| self.get(id))
                .and_then(|s| s.raw_elevation(fx, fy));
            if let Some(e) = elevation {
                return Some(z as f32 + e);
            }
            z -= 1;
        }
        None
    }

    /// A random traversable surface, trying at most `attempts` draws.
    pub fn random_traversable(&self, rng: &mut GameRng, attempts: u32) -> Option<VoxelId> {
        if self.surfaces.is_empty() {
            return None;
        }
        for _ in 0..attempts {
            let index = rng.index(self.surfaces.len());
            if let Some((id, surface)) = self.surfaces.iter().nth(index) {
                if surface.is_traversable() {
                    return Some(*id);
                }
            }
        }
        log::warn!("no traversable surface found in {attempts} draws");
        None
    }

    fn run_passes(
        &mut self,
        volume: &VoxelVolume,
        first: &BTreeSet<VoxelId>,
        rest: &BTreeSet<VoxelId>,
    ) {
        for &id in first {
            let mut surface = Surface::default();
            surface.find_faces(id.coord(), volume);
            surface.find_ramps(id.coord(), volume);
            self.put(id, surface);
        }
        for &id in rest {
            let mut surface = self.get(id).copied().unwrap_or_default();
            surface.find_floors(id.coord(), &self.surfaces);
            surface.find_triangles(id.coord(), volume, &self.surfaces);
            self.put(id, surface);
        }
        for &id in rest {
            let mut surface = self.get(id).copied().unwrap_or_default();
            surface.find_shims();
            surface.lift_floors();
            self.put(id, surface);
        }
    }

    /// Classify the whole volume from scratch.
    pub fn rebuild(&mut self, volume: &VoxelVolume) {
        self.surfaces.clear();
        let primaries: BTreeSet<VoxelId> = volume
            .ids()
            .filter(|id| {
                let c = id.coord();
                !volume.is_solid_at(c) && volume.has_solid_face_neighbor(c)
            })
            .collect();
        let secondaries = volume.expand_air_set(&primaries);
        self.run_passes(volume, &primaries, &secondaries);
        log::info!(
            "surfaces rebuilt: {} surfaces from {} primary cells",
            self.surfaces.len(),
            primaries.len()
        );
    }

    /// Recompute the neighborhood of an edited voxel. The edited cell's old
    /// surface is cleared first.
    pub fn handle_voxel_set(&mut self, volume: &VoxelVolume, coord: VoxelCoord) -> SurfaceUpdate {
        let cleared = VoxelId::pack(coord);
        self.surfaces.remove(&cleared);

        let primaries: BTreeSet<VoxelId> = PRIMARY_OFFSETS
            .iter()
            .map(|&[dx, dy, dz]| coord.offset(dx, dy, dz))
            .filter(|&c| volume.is_open(c))
            .map(VoxelId::pack)
            .collect();
        let secondaries = volume.expand_air_set(&primaries);
        self.run_passes(volume, &secondaries, &secondaries);
        log::debug!(
            "surfaces updated around {coord}: {} cells",
            secondaries.len()
        );
        SurfaceUpdate {
            cleared,
            updated: secondaries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A volume with solid rock up to and including `floor_z`.
    fn flat_volume(size: u32, floor_z: i32) -> VoxelVolume {
        let mut volume = VoxelVolume::new(size, size, size);
        for x in 0..size as i32 {
            for y in 0..size as i32 {
                for z in 0..=floor_z {
                    volume.set(VoxelCoord::new(x, y, z), Material::Rock).unwrap();
                }
            }
        }
        volume
    }

    fn surface_at(map: &SurfaceMap, x: i32, y: i32, z: i32) -> Surface {
        map.get(VoxelId::pack(VoxelCoord::new(x, y, z)))
            .copied()
            .unwrap_or_default()
    }

    #[test]
    fn flat_ground_gets_flat_surfaces() {
        let volume = flat_volume(6, 0);
        let mut map = SurfaceMap::new();
        map.rebuild(&volume);
        let s = surface_at(&map, 2, 2, 1);
        assert_eq!(s.shape, Shape::Flat);
        assert_eq!(s.faces[Direction::Below.index()], Material::Rock);
        assert_eq!(s.elevation(0.3, 0.7), 0.0);
        assert_eq!(map.len(), 36, "one surface per column over the floor");
    }

    #[test]
    fn step_next_to_floor_becomes_ramp() {
        let mut volume = flat_volume(6, 0);
        volume.set(VoxelCoord::new(2, 3, 1), Material::Dirt).unwrap();
        let mut map = SurfaceMap::new();
        map.rebuild(&volume);

        let ramp = surface_at(&map, 2, 2, 1);
        assert_eq!(ramp.shape, Shape::Ramp);
        assert_eq!(ramp.facing, 0, "rises toward the block to the north");
        assert_eq!(ramp.faces[Direction::North.index()], Material::Air, "ramped face removed");
        assert!((ramp.elevation(0.5, 0.75) - 0.75).abs() < 1e-6);
        assert_eq!(ramp.slope(0.5, 0.5), [0.0, 1.0]);

        let top = surface_at(&map, 2, 3, 2);
        assert_eq!(top.shape, Shape::Flat);
    }

    #[test]
    fn ramp_blocked_above_stays_a_wall() {
        let mut volume = flat_volume(6, 0);
        volume.set(VoxelCoord::new(2, 3, 1), Material::Dirt).unwrap();
        volume.set(VoxelCoord::new(2, 3, 2), Material::Dirt).unwrap();
        let mut map = SurfaceMap::new();
        map.rebuild(&volume);
        let s = surface_at(&map, 2, 2, 1);
        assert_eq!(s.shape, Shape::Flat);
        assert_eq!(s.faces[Direction::North.index()], Material::Dirt);
    }

    #[test]
    fn corner_blocks_form_double_ramp_with_half_flat_above() {
        let mut volume = flat_volume(6, 0);
        volume.set(VoxelCoord::new(2, 3, 1), Material::Dirt).unwrap();
        volume.set(VoxelCoord::new(3, 2, 1), Material::Dirt).unwrap();
        let mut map = SurfaceMap::new();
        map.rebuild(&volume);

        let double = surface_at(&map, 2, 2, 1);
        assert_eq!(double.shape, Shape::DoubleRamp);
        assert_eq!(double.facing, 0);
        assert!(double.has_ramp(0) && double.has_ramp(1));
        assert_eq!(double.center_exit(), ExitLevel::Top);

        let half = surface_at(&map, 2, 2, 2);
        assert_eq!(half.shape, Shape::HalfFlat);
        assert_eq!(half.facing, 0);
        assert_eq!(half.center_exit(), ExitLevel::Bottom);
    }

    #[test]
    fn double_ramp_needs_open_low_corner() {
        let mut volume = flat_volume(6, 0);
        volume.set(VoxelCoord::new(2, 3, 1), Material::Dirt).unwrap();
        volume.set(VoxelCoord::new(3, 2, 1), Material::Dirt).unwrap();
        volume.set(VoxelCoord::new(1, 1, 1), Material::Dirt).unwrap();
        let mut map = SurfaceMap::new();
        map.rebuild(&volume);
        let s = surface_at(&map, 2, 2, 1);
        assert_ne!(s.shape, Shape::DoubleRamp, "{s:?}");
        assert!(!s.has_ramp(0) && !s.has_ramp(1), "both ramps dropped: {s:?}");
        assert_eq!(s.faces[Direction::North.index()], Material::Dirt);
        assert_eq!(s.faces[Direction::East.index()], Material::Dirt);
    }

    #[test]
    fn diagonal_of_block_gets_wedge() {
        let mut volume = flat_volume(6, 0);
        volume.set(VoxelCoord::new(2, 2, 1), Material::Dirt).unwrap();
        let mut map = SurfaceMap::new();
        map.rebuild(&volume);
        // East of the block: ramp rising west. North of the block: ramp
        // rising south. Their shared diagonal picks up both triangles.
        assert_eq!(surface_at(&map, 3, 2, 1).shape, Shape::Ramp);
        assert_eq!(surface_at(&map, 3, 2, 1).facing, 3);
        assert_eq!(surface_at(&map, 2, 3, 1).facing, 2);
        let corner = surface_at(&map, 3, 3, 1);
        assert_eq!(corner.sides[2], SideEdge::RightTriangle);
        assert_eq!(corner.sides[3], SideEdge::LeftTriangle);
        assert_eq!(corner.shape, Shape::Wedge);
        assert_eq!(corner.facing, 2);
    }

    #[test]
    fn rotated_exit_tables() {
        let ramp = Surface {
            shape: Shape::Ramp,
            facing: 1,
            ..Surface::default()
        };
        assert_eq!(
            ramp.side_exits(),
            [ExitLevel::Middle, ExitLevel::Top, ExitLevel::Middle, ExitLevel::Bottom]
        );
        assert_eq!(rotate4([0, 1, 2, 3], 1), [3, 0, 1, 2]);
        assert_eq!(rotate4([0, 1, 2, 3], 3), [1, 2, 3, 0]);
    }

    #[test]
    fn corner_exit_suppressed_by_wall() {
        let mut flat = Surface {
            shape: Shape::Flat,
            ..Surface::default()
        };
        flat.faces[Direction::East.index()] = Material::Rock;
        let corners = flat.corner_exits();
        assert_eq!(corners[0], ExitLevel::None, "NE touches the east wall");
        assert_eq!(corners[1], ExitLevel::None, "SE touches the east wall");
        assert_eq!(corners[2], ExitLevel::Bottom);
        assert_eq!(corners[3], ExitLevel::Bottom);
    }

    #[test]
    fn road_orientation_rules() {
        let ramp = Surface {
            shape: Shape::Ramp,
            facing: 1,
            ..Surface::default()
        };
        assert!(ramp.allows_road(2) && ramp.allows_road(6));
        assert!(!ramp.allows_road(0) && !ramp.allows_road(1));
        let flat = Surface {
            shape: Shape::Flat,
            ..Surface::default()
        };
        assert!((0..8).all(|c| flat.allows_road(c)));
        let cuban = Surface {
            shape: Shape::Cuban,
            ..Surface::default()
        };
        assert!((0..8).all(|c| !cuban.allows_road(c)));
    }

    #[test]
    fn raw_elevation_is_none_off_the_half() {
        let half = Surface {
            shape: Shape::HalfFlat,
            ..Surface::default()
        };
        assert_eq!(half.raw_elevation(0.1, 0.1), None);
        assert_eq!(half.raw_elevation(0.9, 0.9), Some(0.0));
        assert!(half.elevation(0.1, 0.1) > 0.0, "extrapolated over the empty half");
    }

    #[test]
    fn raw_elevation_scans_down_the_column() {
        let volume = flat_volume(6, 1);
        let mut map = SurfaceMap::new();
        map.rebuild(&volume);
        assert_eq!(map.raw_elevation_at([2.5, 2.5, 5.2]), Some(2.0));
        assert_eq!(map.raw_elevation_at([2.5, 2.5, 0.5]), None);
    }

    fn assert_maps_equal(a: &SurfaceMap, b: &SurfaceMap) {
        let left: Vec<_> = a.iter().collect();
        let right: Vec<_> = b.iter().collect();
        assert_eq!(left, right);
    }

    #[test]
    fn incremental_dig_matches_rebuild() {
        let mut volume = flat_volume(8, 2);
        let mut map = SurfaceMap::new();
        map.rebuild(&volume);

        let dig = VoxelCoord::new(4, 4, 2);
        volume.set(dig, Material::Air).unwrap();
        let update = map.handle_voxel_set(&volume, dig);
        assert_eq!(update.cleared, VoxelId::pack(dig));
        assert!(update.updated.contains(&VoxelId::pack(dig)));

        let mut fresh = SurfaceMap::new();
        fresh.rebuild(&volume);
        assert_maps_equal(&map, &fresh);
    }

    #[test]
    fn incremental_fill_matches_rebuild() {
        let mut volume = flat_volume(8, 1);
        let mut map = SurfaceMap::new();
        map.rebuild(&volume);

        let fill = VoxelCoord::new(3, 4, 2);
        volume.set(fill, Material::Clay).unwrap();
        let update = map.handle_voxel_set(&volume, fill);
        assert!(!update.updated.contains(&VoxelId::pack(fill)));
        assert!(map.get(VoxelId::pack(fill)).is_none(), "solid cell has no surface");

        let mut fresh = SurfaceMap::new();
        fresh.rebuild(&volume);
        assert_maps_equal(&map, &fresh);
    }

    #[test]
    fn random_traversable_finds_flat_ground() {
        let volume = flat_volume(6, 0);
        let mut map = SurfaceMap::new();
        map.rebuild(&volume);
        let mut rng = GameRng::new(8);
        let id = map.random_traversable(&mut rng, 20).unwrap();
        assert!(map.is_traversable(id));
        assert!(SurfaceMap::new().random_traversable(&mut rng, 20).is_none());
    }
}
