use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Stable identity of an entity. Survives motion and migration between shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityGuid(pub Uuid);

impl EntityGuid {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build a guid from externally supplied random bytes (deterministic sources).
    pub fn from_random_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }
}

impl Default for EntityGuid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.0.to_string();
        f.write_str(&s[..8])
    }
}

/// Compound identifier: stable guid plus the position the entity occupied
/// when this id was issued.
///
/// Two ids of the same entity at different positions are distinct values.
/// Pool operations use this to detect that an entity moved underneath them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EntityId {
    pub guid: EntityGuid,
    pub position: Vec3,
}

impl EntityId {
    pub fn new(guid: EntityGuid, position: Vec3) -> Self {
        Self { guid, position }
    }

    /// Same guid, relocated.
    pub fn relocated(self, position: Vec3) -> Self {
        Self {
            guid: self.guid,
            position,
        }
    }

    pub fn distance(&self, other: Vec3) -> f32 {
        self.position.distance(other)
    }
}

// Positions compare by bit pattern so that Eq/Hash/Ord agree and are total.
impl PartialEq for EntityId {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid && vec3_bits(self.position) == vec3_bits(other.position)
    }
}

impl Eq for EntityId {}

impl Hash for EntityId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.guid.hash(state);
        vec3_bits(self.position).hash(state);
    }
}

impl PartialOrd for EntityId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.guid
            .cmp(&other.guid)
            .then_with(|| cmp_vec3(self.position, other.position))
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@({:.3}, {:.3}, {:.3})",
            self.guid, self.position.x, self.position.y, self.position.z
        )
    }
}

/// Externally identified receiver of client-addressed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

/// Total order over vectors, component by component (`f32::total_cmp`).
pub fn cmp_vec3(a: Vec3, b: Vec3) -> Ordering {
    a.x.total_cmp(&b.x)
        .then_with(|| a.y.total_cmp(&b.y))
        .then_with(|| a.z.total_cmp(&b.z))
}

pub fn vec3_bits(v: Vec3) -> [u32; 3] {
    [v.x.to_bits(), v.y.to_bits(), v.z.to_bits()]
}
