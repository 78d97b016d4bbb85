use glam::{IVec3, UVec3, Vec3};
use serde::{Deserialize, Serialize};
use shardspace_common::ShardGeometry;

/// Inconsistency coverage: a bitmap over `resolution³` sub-cells of the shard
/// volume. A set bit means the cell was computed from missing or stale
/// neighbor input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InconsistencyCoverage {
    resolution: u32,
    words: Vec<u64>,
    population: u32,
}

impl InconsistencyCoverage {
    /// A fully consistent coverage.
    pub fn new(resolution: u32) -> Self {
        assert!(resolution > 0, "resolution must be positive");
        let cells = (resolution as usize).pow(3);
        Self {
            resolution,
            words: vec![0; cells.div_ceil(64)],
            population: 0,
        }
    }

    /// Every cell flagged. Used for shards whose input is entirely unknown.
    pub fn fully_inconsistent(resolution: u32) -> Self {
        let mut ic = Self::new(resolution);
        for x in 0..resolution {
            for y in 0..resolution {
                for z in 0..resolution {
                    ic.set(UVec3::new(x, y, z));
                }
            }
        }
        ic
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn population_count(&self) -> u32 {
        self.population
    }

    pub fn is_fully_consistent(&self) -> bool {
        self.population == 0
    }

    pub fn get(&self, cell: UVec3) -> bool {
        let (word, bit) = self.locate(cell);
        self.words[word] & (1 << bit) != 0
    }

    /// Flag a cell. Returns whether it was previously clear.
    pub fn set(&mut self, cell: UVec3) -> bool {
        let (word, bit) = self.locate(cell);
        let mask = 1u64 << bit;
        if self.words[word] & mask != 0 {
            return false;
        }
        self.words[word] |= mask;
        self.population += 1;
        true
    }

    /// Clear a cell. Returns whether it was previously set.
    pub fn clear(&mut self, cell: UVec3) -> bool {
        let (word, bit) = self.locate(cell);
        let mask = 1u64 << bit;
        if self.words[word] & mask == 0 {
            return false;
        }
        self.words[word] &= !mask;
        self.population -= 1;
        true
    }

    /// Cell containing `p`, if `p` lies inside `geometry`.
    pub fn cell_of(&self, geometry: &ShardGeometry, p: Vec3) -> Option<UVec3> {
        if !geometry.contains(p) {
            return None;
        }
        let rel = (p - geometry.min) / geometry.size() * self.resolution as f32;
        let max = self.resolution - 1;
        Some(UVec3::new(
            (rel.x as u32).min(max),
            (rel.y as u32).min(max),
            (rel.z as u32).min(max),
        ))
    }

    /// Flag the cell containing `p`; positions outside the shard are ignored.
    pub fn mark_position(&mut self, geometry: &ShardGeometry, p: Vec3) -> bool {
        match self.cell_of(geometry, p) {
            Some(cell) => self.set(cell),
            None => false,
        }
    }

    /// Whether the cell containing `p` is flagged.
    pub fn is_inconsistent_at(&self, geometry: &ShardGeometry, p: Vec3) -> bool {
        self.cell_of(geometry, p).is_some_and(|cell| self.get(cell))
    }

    /// Flag the `depth`-cell band along the face, edge or corner that faces
    /// the neighbor at `direction` (components in -1..=1).
    pub fn mark_border(&mut self, direction: IVec3, depth: u32) {
        let res = self.resolution;
        let depth = depth.min(res);
        let span = |d: i32| match d.signum() {
            -1 => 0..depth,
            1 => res - depth..res,
            _ => 0..res,
        };
        for x in span(direction.x) {
            for y in span(direction.y) {
                for z in span(direction.z) {
                    self.set(UVec3::new(x, y, z));
                }
            }
        }
    }

    /// Chebyshev dilation by `radius` cells: every flagged cell flags its
    /// neighborhood. Models inconsistency spreading through interactions.
    pub fn grown(&self, radius: u32) -> Self {
        if radius == 0 || self.population == 0 {
            return self.clone();
        }
        let mut out = self.clone();
        for axis in 0..3 {
            out = out.dilate_axis(axis, radius);
        }
        out
    }

    /// Flag every cell flagged in `other`.
    pub fn union_with(&mut self, other: &InconsistencyCoverage) {
        assert_eq!(
            self.resolution, other.resolution,
            "coverage resolutions must match"
        );
        for (mine, theirs) in self.words.iter_mut().zip(&other.words) {
            *mine |= *theirs;
        }
        self.population = self.words.iter().map(|w| w.count_ones()).sum();
    }

    pub fn is_subset_of(&self, other: &InconsistencyCoverage) -> bool {
        self.resolution == other.resolution
            && self
                .words
                .iter()
                .zip(&other.words)
                .all(|(mine, theirs)| mine & !theirs == 0)
    }

    /// Flagged cells in index order.
    pub fn flagged_cells(&self) -> impl Iterator<Item = UVec3> + '_ {
        let res = self.resolution;
        let cells = (res as usize).pow(3);
        (0..cells)
            .filter(move |&i| self.words[i / 64] & (1 << (i % 64)) != 0)
            .map(move |i| {
                let i = i as u32;
                UVec3::new(i / (res * res), (i / res) % res, i % res)
            })
    }

    fn dilate_axis(&self, axis: usize, radius: u32) -> Self {
        let max = self.resolution - 1;
        let mut out = Self::new(self.resolution);
        for cell in self.flagged_cells() {
            let lo = cell[axis].saturating_sub(radius);
            let hi = (cell[axis] + radius).min(max);
            for v in lo..=hi {
                let mut c = cell;
                c[axis] = v;
                out.set(c);
            }
        }
        out
    }

    fn locate(&self, cell: UVec3) -> (usize, usize) {
        let res = self.resolution;
        assert!(
            cell.x < res && cell.y < res && cell.z < res,
            "cell {cell} outside resolution {res}"
        );
        let index = ((cell.x * res + cell.y) * res + cell.z) as usize;
        (index / 64, index % 64)
    }
}
