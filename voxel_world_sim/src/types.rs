// Core types shared across the voxel simulation.
//
// Defines grid coordinates (`VoxelCoord`) and their packed form (`VoxelId`),
// the `Material` palette, the ten `Direction`s used by surfaces and the path
// graph, and strongly-typed UUID v4 entity IDs. Everything derives
// `Serialize`/`Deserialize` so hosts can persist or mirror state.
//
// Axis convention: X east, Y north, Z up. Column storage runs along Z.
//
// See also: `world.rs` for the volume these coordinates index, `surface.rs`
// and `nav.rs` for how `Direction` indexes faces and exits.
//
// **Critical constraint: determinism.** Entity IDs come from the sim's
// `GameRng` (see `prng.rs`). Do not use external UUID libraries or OS entropy.

use crate::prng::GameRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A cell position in the voxel grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Manhattan distance between two coordinates.
    pub fn manhattan_distance(self, other: Self) -> u32 {
        (self.x - other.x).unsigned_abs()
            + (self.y - other.y).unsigned_abs()
            + (self.z - other.z).unsigned_abs()
    }

    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// The neighboring cell in `dir`.
    pub fn step(self, dir: Direction) -> Self {
        let [dx, dy, dz] = dir.offset();
        self.offset(dx, dy, dz)
    }
}

impl fmt::Display for VoxelCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Bits per axis in a packed `VoxelId`.
pub const VOXEL_ID_AXIS_BITS: u32 = 10;
const AXIS_MASK: u32 = (1 << VOXEL_ID_AXIS_BITS) - 1;

/// Packed cell key: `(x << 20) | (y << 10) | z`.
///
/// Only meaningful for in-bounds coordinates; `VoxelVolume::id` is the
/// checked constructor. Packed IDs order by x, then y, then z, which keeps
/// `BTreeMap<VoxelId, _>` iteration column-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelId(pub u32);

impl VoxelId {
    /// Pack a coordinate whose components are all in `0..1024`.
    pub const fn pack(coord: VoxelCoord) -> Self {
        Self(
            ((coord.x as u32 & AXIS_MASK) << (2 * VOXEL_ID_AXIS_BITS))
                | ((coord.y as u32 & AXIS_MASK) << VOXEL_ID_AXIS_BITS)
                | (coord.z as u32 & AXIS_MASK),
        )
    }

    /// Pack a coordinate, or `None` if any component does not fit.
    pub fn checked(coord: VoxelCoord) -> Option<Self> {
        let fits = |v: i32| (0..1 << VOXEL_ID_AXIS_BITS).contains(&v);
        (fits(coord.x) && fits(coord.y) && fits(coord.z)).then(|| Self::pack(coord))
    }

    pub const fn coord(self) -> VoxelCoord {
        VoxelCoord::new(
            ((self.0 >> (2 * VOXEL_ID_AXIS_BITS)) & AXIS_MASK) as i32,
            ((self.0 >> VOXEL_ID_AXIS_BITS) & AXIS_MASK) as i32,
            (self.0 & AXIS_MASK) as i32,
        )
    }
}

impl fmt::Display for VoxelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coord())
    }
}

// ---------------------------------------------------------------------------
// Materials
// ---------------------------------------------------------------------------

/// What fills a voxel. Discriminants match the persisted numeric codes.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Material {
    #[default]
    Air = 0,
    Rock = 1,
    Dirt = 2,
    Clay = 3,
    Sand = 4,
}

impl Material {
    pub const ALL: [Material; 5] = [
        Material::Air,
        Material::Rock,
        Material::Dirt,
        Material::Clay,
        Material::Sand,
    ];

    pub fn is_solid(self) -> bool {
        self != Material::Air
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

// ---------------------------------------------------------------------------
// Directions
// ---------------------------------------------------------------------------

/// The ten neighbor directions. Discriminants index `Surface::faces` (first
/// six) and `Waypoint::exits` (all ten).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
    Above = 4,
    Below = 5,
    NorthEast = 6,
    SouthEast = 7,
    SouthWest = 8,
    NorthWest = 9,
}

impl Direction {
    pub const ALL: [Direction; 10] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Above,
        Direction::Below,
        Direction::NorthEast,
        Direction::SouthEast,
        Direction::SouthWest,
        Direction::NorthWest,
    ];

    /// Horizontal sides in clockwise order starting north.
    pub const SIDES: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Corners in clockwise order starting north-east. Corner `i` sits
    /// between sides `i` and `i + 1`.
    pub const CORNERS: [Direction; 4] = [
        Direction::NorthEast,
        Direction::SouthEast,
        Direction::SouthWest,
        Direction::NorthWest,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    pub fn offset(self) -> [i32; 3] {
        match self {
            Direction::North => [0, 1, 0],
            Direction::East => [1, 0, 0],
            Direction::South => [0, -1, 0],
            Direction::West => [-1, 0, 0],
            Direction::Above => [0, 0, 1],
            Direction::Below => [0, 0, -1],
            Direction::NorthEast => [1, 1, 0],
            Direction::SouthEast => [1, -1, 0],
            Direction::SouthWest => [-1, -1, 0],
            Direction::NorthWest => [-1, 1, 0],
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::Above => Direction::Below,
            Direction::Below => Direction::Above,
            Direction::NorthEast => Direction::SouthWest,
            Direction::SouthEast => Direction::NorthWest,
            Direction::SouthWest => Direction::NorthEast,
            Direction::NorthWest => Direction::SouthEast,
        }
    }

    /// Compass index (N=0, NE=1, ... NW=7) for horizontal directions, used
    /// by the road orientation rules. `None` for above/below.
    pub fn compass(self) -> Option<u8> {
        match self {
            Direction::North => Some(0),
            Direction::NorthEast => Some(1),
            Direction::East => Some(2),
            Direction::SouthEast => Some(3),
            Direction::South => Some(4),
            Direction::SouthWest => Some(5),
            Direction::West => Some(6),
            Direction::NorthWest => Some(7),
            Direction::Above | Direction::Below => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Entity IDs — deterministic UUID v4
// ---------------------------------------------------------------------------

/// A UUID v4 drawn from the simulation PRNG (RFC 4122 version and variant
/// bits set).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimUuid([u8; 16]);

impl SimUuid {
    pub fn new_v4(rng: &mut GameRng) -> Self {
        let mut bytes = rng.next_128_bits();
        bytes[6] = (bytes[6] & 0x0F) | 0x40;
        bytes[8] = (bytes[8] & 0x3F) | 0x80;
        Self(bytes)
    }

    /// Parse the 8-4-4-4-12 hex form.
    pub fn parse(s: &str) -> Option<Self> {
        let hex: Vec<u8> = s.bytes().filter(|b| *b != b'-').collect();
        if hex.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (byte, pair) in bytes.iter_mut().zip(hex.chunks(2)) {
            let text = std::str::from_utf8(pair).ok()?;
            *byte = u8::from_str_radix(text, 16).ok()?;
        }
        Some(Self(bytes))
    }
}

// Serialized as the hex string so IDs work as JSON map keys.
impl Serialize for SimUuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SimUuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SimUuid::parse(&s).ok_or_else(|| serde::de::Error::custom("invalid UUID format"))
    }
}

impl fmt::Debug for SimUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimUuid({self})")
    }
}

impl fmt::Display for SimUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub SimUuid);

        impl $name {
            pub fn new(rng: &mut GameRng) -> Self {
                Self(SimUuid::new_v4(rng))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

entity_id!(/// Unique identifier for an actor.
ActorId);
