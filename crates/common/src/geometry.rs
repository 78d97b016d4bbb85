use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Integer coordinate of a shard in the world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ShardCoord {
    pub const ORIGIN: Self = Self { x: 0, y: 0, z: 0 };

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, delta: IVec3) -> Self {
        Self::new(self.x + delta.x, self.y + delta.y, self.z + delta.z)
    }

    pub fn delta_to(self, other: ShardCoord) -> IVec3 {
        IVec3::new(other.x - self.x, other.y - self.y, other.z - self.z)
    }

    /// Whether this coordinate lies inside a grid of the given shape.
    pub fn within(self, extent: ShardCoord) -> bool {
        (0..extent.x).contains(&self.x)
            && (0..extent.y).contains(&self.y)
            && (0..extent.z).contains(&self.z)
    }

    /// All in-grid neighbors (faces, edges and corners), in canonical order.
    pub fn neighbors(self, extent: ShardCoord) -> Vec<ShardCoord> {
        let mut out = Vec::with_capacity(26);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let n = self.offset(IVec3::new(dx, dy, dz));
                    if n.within(extent) {
                        out.push(n);
                    }
                }
            }
        }
        out
    }
}

impl std::fmt::Display for ShardCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{},{}]", self.x, self.y, self.z)
    }
}

/// Axis-aligned box in world space. `min` inclusive, `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShardGeometry {
    pub min: Vec3,
    pub max: Vec3,
}

impl ShardGeometry {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Volume owned by `coord` in a grid with shards of edge length `edge`.
    pub fn of_shard(coord: ShardCoord, edge: f32) -> Self {
        let min = Vec3::new(coord.x as f32, coord.y as f32, coord.z as f32) * edge;
        Self {
            min,
            max: min + Vec3::splat(edge),
        }
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmplt(self.max).all()
    }

    /// Euclidean distance from `p` to the closest point of the box (0 inside).
    pub fn distance_to(&self, p: Vec3) -> f32 {
        let closest = p.clamp(self.min, self.max);
        closest.distance(p)
    }

    /// Clamp into the closed box.
    pub fn clamp(&self, p: Vec3) -> Vec3 {
        p.clamp(self.min, self.max)
    }

    /// Clamp into the half-open box, so the result satisfies `contains`.
    pub fn clamp_inside(&self, p: Vec3) -> Vec3 {
        let upper = self.max - self.size() * 1e-6;
        p.clamp(self.min, upper)
    }
}
