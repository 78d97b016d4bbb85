use glam::Vec3;

/// Static, balanced 3D k-d tree.
///
/// Points are stored in an implicit layout: for any subrange `[lo, hi)` the
/// median `lo + (hi - lo) / 2` is the splitting node, split axis cycles x, y,
/// z with depth, and the two halves on either side are its subtrees. The
/// tree is immutable once built; structural changes require a new build.
#[derive(Debug, Clone)]
pub struct KdTree<T> {
    points: Vec<(Vec3, T)>,
}

impl<T> Default for KdTree<T> {
    fn default() -> Self {
        Self { points: Vec::new() }
    }
}

impl<T> KdTree<T> {
    /// Build a tree from `(position, payload)` pairs.
    pub fn build(mut points: Vec<(Vec3, T)>) -> Self {
        build_range(&mut points, 0);
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Vec3, T)> {
        self.points.iter()
    }

    /// Visit every point within `radius` of `center` (inclusive).
    ///
    /// The visitor receives the point, its payload and the squared distance.
    /// Visit order follows the tree layout, not distance.
    pub fn visit_within(&self, center: Vec3, radius: f32, visitor: &mut dyn FnMut(Vec3, &T, f32)) {
        if radius < 0.0 || !radius.is_finite() {
            return;
        }
        self.visit_range(0, self.points.len(), 0, center, radius * radius, visitor);
    }

    /// Collect payloads within `radius` of `center`.
    pub fn within_radius(&self, center: Vec3, radius: f32) -> Vec<&T> {
        if radius < 0.0 || !radius.is_finite() {
            return Vec::new();
        }
        let mut indices = Vec::new();
        self.visit_indices(0, self.points.len(), 0, center, radius * radius, &mut indices);
        indices.into_iter().map(|i| &self.points[i].1).collect()
    }

    /// Closest point to `center` accepted by `filter`, with its squared distance.
    pub fn nearest_where(
        &self,
        center: Vec3,
        filter: &dyn Fn(&T) -> bool,
    ) -> Option<(Vec3, &T, f32)> {
        let mut best: Option<(usize, f32)> = None;
        self.nearest_range(0, self.points.len(), 0, center, filter, &mut best);
        best.map(|(i, d)| (self.points[i].0, &self.points[i].1, d))
    }

    pub fn nearest(&self, center: Vec3) -> Option<(Vec3, &T, f32)> {
        self.nearest_where(center, &|_| true)
    }

    fn visit_range(
        &self,
        lo: usize,
        hi: usize,
        depth: usize,
        center: Vec3,
        radius_sq: f32,
        visitor: &mut dyn FnMut(Vec3, &T, f32),
    ) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let (p, item) = &self.points[mid];
        let d_sq = p.distance_squared(center);
        if d_sq <= radius_sq {
            visitor(*p, item, d_sq);
        }
        let axis = depth % 3;
        let diff = center[axis] - p[axis];
        if diff <= 0.0 || diff * diff <= radius_sq {
            self.visit_range(lo, mid, depth + 1, center, radius_sq, visitor);
        }
        if diff >= 0.0 || diff * diff <= radius_sq {
            self.visit_range(mid + 1, hi, depth + 1, center, radius_sq, visitor);
        }
    }

    fn visit_indices(
        &self,
        lo: usize,
        hi: usize,
        depth: usize,
        center: Vec3,
        radius_sq: f32,
        out: &mut Vec<usize>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let p = self.points[mid].0;
        if p.distance_squared(center) <= radius_sq {
            out.push(mid);
        }
        let axis = depth % 3;
        let diff = center[axis] - p[axis];
        if diff <= 0.0 || diff * diff <= radius_sq {
            self.visit_indices(lo, mid, depth + 1, center, radius_sq, out);
        }
        if diff >= 0.0 || diff * diff <= radius_sq {
            self.visit_indices(mid + 1, hi, depth + 1, center, radius_sq, out);
        }
    }

    fn nearest_range(
        &self,
        lo: usize,
        hi: usize,
        depth: usize,
        center: Vec3,
        filter: &dyn Fn(&T) -> bool,
        best: &mut Option<(usize, f32)>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let (p, item) = &self.points[mid];
        let d_sq = p.distance_squared(center);
        if filter(item) && best.is_none_or(|(_, b)| d_sq < b) {
            *best = Some((mid, d_sq));
        }
        let axis = depth % 3;
        let diff = center[axis] - p[axis];
        let (near, far) = if diff <= 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };
        self.nearest_range(near.0, near.1, depth + 1, center, filter, best);
        if best.is_none_or(|(_, b)| diff * diff <= b) {
            self.nearest_range(far.0, far.1, depth + 1, center, filter, best);
        }
    }
}

fn build_range<T>(slice: &mut [(Vec3, T)], depth: usize) {
    if slice.len() <= 1 {
        return;
    }
    let mid = slice.len() / 2;
    let axis = depth % 3;
    slice.select_nth_unstable_by(mid, |a, b| a.0[axis].total_cmp(&b.0[axis]));
    let (left, rest) = slice.split_at_mut(mid);
    build_range(left, depth + 1);
    build_range(&mut rest[1..], depth + 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_points(n: usize, seed: u64) -> Vec<(Vec3, usize)> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let p = Vec3::new(
                    rng.gen_range(0.0..10.0),
                    rng.gen_range(0.0..10.0),
                    rng.gen_range(0.0..10.0),
                );
                (p, i)
            })
            .collect()
    }

    #[test]
    fn empty_tree_finds_nothing() {
        let tree: KdTree<u32> = KdTree::build(Vec::new());
        assert!(tree.is_empty());
        assert!(tree.within_radius(Vec3::ZERO, 100.0).is_empty());
        assert!(tree.nearest(Vec3::ZERO).is_none());
    }

    #[test]
    fn radius_query_matches_brute_force() {
        let points = random_points(500, 11);
        let tree = KdTree::build(points.clone());
        for (k, center) in [Vec3::splat(5.0), Vec3::ZERO, Vec3::new(9.0, 1.0, 3.0)]
            .into_iter()
            .enumerate()
        {
            let radius = 1.0 + k as f32;
            let mut expected: Vec<usize> = points
                .iter()
                .filter(|(p, _)| p.distance_squared(center) <= radius * radius)
                .map(|(_, i)| *i)
                .collect();
            let mut got: Vec<usize> = tree.within_radius(center, radius).into_iter().copied().collect();
            expected.sort();
            got.sort();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn radius_is_inclusive() {
        let tree = KdTree::build(vec![(Vec3::ZERO, 'a'), (Vec3::new(2.0, 0.0, 0.0), 'b')]);
        let hits = tree.within_radius(Vec3::ZERO, 2.0);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn visitor_reports_squared_distance() {
        let tree = KdTree::build(vec![(Vec3::new(0.0, 3.0, 4.0), ())]);
        let mut seen = Vec::new();
        tree.visit_within(Vec3::ZERO, 5.0, &mut |_, _, d| seen.push(d));
        assert_eq!(seen, vec![25.0]);
    }

    #[test]
    fn nearest_matches_brute_force() {
        let points = random_points(300, 5);
        let tree = KdTree::build(points.clone());
        let center = Vec3::new(4.2, 7.7, 1.1);
        let expected = points
            .iter()
            .min_by(|a, b| {
                a.0.distance_squared(center)
                    .total_cmp(&b.0.distance_squared(center))
            })
            .map(|(_, i)| *i);
        assert_eq!(tree.nearest(center).map(|(_, i, _)| *i), expected);
    }

    #[test]
    fn nearest_where_skips_filtered() {
        let tree = KdTree::build(vec![(Vec3::ZERO, 0), (Vec3::X, 1)]);
        let hit = tree.nearest_where(Vec3::ZERO, &|i| *i != 0);
        assert_eq!(hit.map(|(_, i, _)| *i), Some(1));
    }

    #[test]
    fn duplicate_positions_all_reported() {
        let tree = KdTree::build((0..10).map(|i| (Vec3::ONE, i)).collect());
        assert_eq!(tree.within_radius(Vec3::ONE, 0.0).len(), 10);
    }
}
