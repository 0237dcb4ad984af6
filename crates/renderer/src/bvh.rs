//! Median-split BVH over drawable world AABBs, rebuilt after the object
//! update. Selection and probe queries walk it instead of scanning every
//! drawable.

use glam::Vec3;
use helio_ecs::Aabb;

#[derive(Clone, Copy, Debug)]
struct BvhNode {
    aabb: Aabb,
    /// Index of the left child; right child is `left + 1`. Leaf when 0.
    left: u32,
    first: u32,
    count: u32,
}

#[derive(Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    /// Drawable indices, partitioned per leaf.
    indices: Vec<u32>,
}

const LEAF_SIZE: u32 = 4;

impl Bvh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.indices.clear();
    }

    /// Rebuilds the tree over `aabbs`; empty boxes are kept in leaves but
    /// never intersect anything.
    pub fn build(&mut self, aabbs: &[Aabb]) {
        self.clear();
        if aabbs.is_empty() {
            return;
        }
        self.indices = (0..aabbs.len() as u32).collect();
        let root = BvhNode {
            aabb: bounds_of(aabbs, &self.indices),
            left: 0,
            first: 0,
            count: aabbs.len() as u32,
        };
        self.nodes.push(root);
        self.subdivide(0, aabbs);
    }

    fn subdivide(&mut self, node_index: usize, aabbs: &[Aabb]) {
        let (first, count, aabb) = {
            let node = &self.nodes[node_index];
            (node.first, node.count, node.aabb)
        };
        if count <= LEAF_SIZE {
            return;
        }

        let extent = aabb.max - aabb.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };

        let range = &mut self.indices[first as usize..(first + count) as usize];
        range.sort_by(|a, b| {
            let ca = center_axis(&aabbs[*a as usize], axis);
            let cb = center_axis(&aabbs[*b as usize], axis);
            ca.total_cmp(&cb)
        });
        let half = count / 2;

        let left = BvhNode {
            aabb: bounds_of(aabbs, &self.indices[first as usize..(first + half) as usize]),
            left: 0,
            first,
            count: half,
        };
        let right = BvhNode {
            aabb: bounds_of(
                aabbs,
                &self.indices[(first + half) as usize..(first + count) as usize],
            ),
            left: 0,
            first: first + half,
            count: count - half,
        };
        let left_index = self.nodes.len() as u32;
        self.nodes[node_index].left = left_index;
        self.nodes[node_index].count = 0;
        self.nodes.push(left);
        self.nodes.push(right);
        self.subdivide(left_index as usize, aabbs);
        self.subdivide(left_index as usize + 1, aabbs);
    }

    /// Collects the indices whose AABB intersects `query`.
    pub fn intersect_aabb(&self, aabbs: &[Aabb], query: &Aabb, out: &mut Vec<u32>) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![0usize];
        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index];
            if !aabbs_overlap(&node.aabb, query) {
                continue;
            }
            if node.count > 0 {
                for i in node.first..node.first + node.count {
                    let drawable = self.indices[i as usize];
                    if aabbs_overlap(&aabbs[drawable as usize], query) {
                        out.push(drawable);
                    }
                }
            } else {
                stack.push(node.left as usize);
                stack.push(node.left as usize + 1);
            }
        }
    }

    /// Collects the indices whose AABB contains `point`.
    pub fn intersect_point(&self, aabbs: &[Aabb], point: Vec3, out: &mut Vec<u32>) {
        let query = Aabb::new(point, point);
        self.intersect_aabb(aabbs, &query, out);
    }
}

fn center_axis(aabb: &Aabb, axis: usize) -> f32 {
    (aabb.min[axis] + aabb.max[axis]) * 0.5
}

fn bounds_of(aabbs: &[Aabb], indices: &[u32]) -> Aabb {
    let mut bounds = Aabb::EMPTY;
    for index in indices {
        bounds.merge(&aabbs[*index as usize]);
    }
    bounds
}

fn aabbs_overlap(a: &Aabb, b: &Aabb) -> bool {
    a.min.x <= b.max.x
        && b.min.x <= a.max.x
        && a.min.y <= b.max.y
        && b.min.y <= a.max.y
        && a.min.z <= b.max.z
        && b.min.z <= a.max.z
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    #[test]
    fn queries_match_linear_scan() {
        let mut rng = Pcg64::seed_from_u64(11);
        let aabbs: Vec<Aabb> = (0..300)
            .map(|_| {
                let center = vec3(
                    rng.gen_range(-100.0..100.0),
                    rng.gen_range(-100.0..100.0),
                    rng.gen_range(-100.0..100.0),
                );
                Aabb::from_center_radius(center, rng.gen_range(0.5..8.0))
            })
            .collect();
        let mut bvh = Bvh::new();
        bvh.build(&aabbs);

        for _ in 0..50 {
            let center = vec3(
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
            );
            let query = Aabb::from_center_radius(center, rng.gen_range(1.0..20.0));

            let mut from_bvh = Vec::new();
            bvh.intersect_aabb(&aabbs, &query, &mut from_bvh);
            from_bvh.sort_unstable();

            let expected: Vec<u32> = aabbs
                .iter()
                .enumerate()
                .filter(|(_, aabb)| aabbs_overlap(aabb, &query))
                .map(|(i, _)| i as u32)
                .collect();
            assert_eq!(from_bvh, expected);
        }
    }

    #[test]
    fn empty_build_is_harmless() {
        let mut bvh = Bvh::new();
        bvh.build(&[]);
        let mut out = Vec::new();
        bvh.intersect_point(&[], Vec3::ZERO, &mut out);
        assert!(out.is_empty());
    }
}
