use glam::Vec3;
use serde::{Deserialize, Serialize};
use shardspace_common::{EntityId, cmp_vec3};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Named appearance attributes an entity shows to its surroundings.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Appearances(BTreeMap<String, Vec<u8>>);

impl Appearances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.set(key, value);
        self
    }

    /// Add or replace one attribute.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// Overlay `delta` on top of `self`; keys in `delta` win.
    pub fn merged(&self, delta: &Appearances) -> Appearances {
        let mut out = self.clone();
        for (k, v) in &delta.0 {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Advertised presence of a nearby (possibly foreign) entity.
///
/// Totally ordered so that concurrent writers of the same contact key
/// converge on the greatest value regardless of arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityContact {
    pub id: EntityId,
    pub appearances: Appearances,
    pub velocity: Vec3,
}

impl EntityContact {
    pub fn new(id: EntityId, appearances: Appearances, velocity: Vec3) -> Self {
        Self {
            id,
            appearances,
            velocity,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.id.position
    }
}

impl PartialEq for EntityContact {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EntityContact {}

impl PartialOrd for EntityContact {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityContact {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| cmp_vec3(self.velocity, other.velocity))
            .then_with(|| self.appearances.cmp(&other.appearances))
    }
}
