//! Region quadtree over province bounding boxes.
//!
//! Each id lives at the deepest node whose bounds fully contain its box, so
//! boxes straddling a split line stay at the parent and boxes outside the
//! world stay at the root. Query results are filtered against the stored
//! boxes, not just node bounds.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use bevy_ecs::prelude::Resource;

use crate::geometry::{BoundingBox, Coordinate};
use crate::map_config::{MapConfig, QuadTreeConfig};
use crate::province::{ProvinceId, ProvinceRecord};

#[derive(Debug, Clone)]
pub struct QuadTreeNode {
    bounds: BoundingBox,
    ids: Vec<ProvinceId>,
    children: Option<Box<[QuadTreeNode; 4]>>,
    depth: u32,
}

struct SplitRules<'a> {
    max_depth: u32,
    capacity: usize,
    entries: &'a HashMap<ProvinceId, BoundingBox>,
}

impl QuadTreeNode {
    fn new(bounds: BoundingBox, depth: u32) -> Self {
        Self {
            bounds,
            ids: Vec::new(),
            children: None,
            depth,
        }
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn ids(&self) -> &[ProvinceId] {
        &self.ids
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn children(&self) -> Option<&[QuadTreeNode; 4]> {
        self.children.as_deref()
    }

    fn quadrants(&self) -> [QuadTreeNode; 4] {
        let b = &self.bounds;
        let mid = b.center();
        let depth = self.depth + 1;
        [
            QuadTreeNode::new(BoundingBox::new(b.min_x, b.min_y, mid.x, mid.y), depth),
            QuadTreeNode::new(BoundingBox::new(mid.x, b.min_y, b.max_x, mid.y), depth),
            QuadTreeNode::new(BoundingBox::new(b.min_x, mid.y, mid.x, b.max_y), depth),
            QuadTreeNode::new(BoundingBox::new(mid.x, mid.y, b.max_x, b.max_y), depth),
        ]
    }

    /// Returns the number of nodes created.
    fn insert(&mut self, id: ProvinceId, bounds: &BoundingBox, rules: &SplitRules<'_>) -> usize {
        if let Some(children) = self.children.as_deref_mut() {
            if let Some(child) = children.iter_mut().find(|c| c.bounds.contains_box(bounds)) {
                return child.insert(id, bounds, rules);
            }
            self.ids.push(id);
            return 0;
        }

        self.ids.push(id);
        if self.ids.len() > rules.capacity && self.depth < rules.max_depth {
            self.split(rules)
        } else {
            0
        }
    }

    fn split(&mut self, rules: &SplitRules<'_>) -> usize {
        let mut children = Box::new(self.quadrants());
        let mut created = children.len();
        let mut kept = Vec::new();
        for id in std::mem::take(&mut self.ids) {
            let Some(bounds) = rules.entries.get(&id) else {
                continue;
            };
            match children.iter_mut().find(|c| c.bounds.contains_box(bounds)) {
                Some(child) => created += child.insert(id, bounds, rules),
                None => kept.push(id),
            }
        }
        self.ids = kept;
        self.children = Some(children);
        created
    }

    fn remove(&mut self, id: ProvinceId, bounds: &BoundingBox) -> bool {
        if let Some(children) = self.children.as_deref_mut() {
            if let Some(child) = children.iter_mut().find(|c| c.bounds.contains_box(bounds)) {
                return child.remove(id, bounds);
            }
        }
        match self.ids.iter().position(|&other| other == id) {
            Some(pos) => {
                self.ids.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    fn visit<'a>(&'a self, prune: &dyn Fn(&BoundingBox) -> bool, out: &mut Vec<&'a [ProvinceId]>) {
        out.push(&self.ids);
        if let Some(children) = self.children.as_deref() {
            for child in children.iter().filter(|c| prune(&c.bounds)) {
                child.visit(prune, out);
            }
        }
    }

    #[cfg(test)]
    fn count_nodes(&self) -> usize {
        1 + self
            .children
            .as_deref()
            .map_or(0, |children| children.iter().map(Self::count_nodes).sum())
    }

    fn deepest(&self) -> u32 {
        self.children
            .as_deref()
            .map_or(self.depth, |children| {
                children.iter().map(Self::deepest).max().unwrap_or(self.depth)
            })
    }
}

enum Candidate<'a> {
    Node(&'a QuadTreeNode),
    Province(ProvinceId),
}

struct Ranked<'a> {
    distance_sq: f64,
    candidate: Candidate<'a>,
}

impl Ranked<'_> {
    fn rank(&self) -> (u8, ProvinceId) {
        match self.candidate {
            Candidate::Province(id) => (0, id),
            Candidate::Node(_) => (1, 0),
        }
    }
}

// Reversed so `BinaryHeap` pops the closest candidate first; provinces win
// ties against nodes.
impl Ord for Ranked<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance_sq
            .total_cmp(&self.distance_sq)
            .then_with(|| other.rank().cmp(&self.rank()))
    }
}

impl PartialOrd for Ranked<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked<'_> {}

#[derive(Resource, Debug, Clone)]
pub struct QuadTreeIndex {
    config: QuadTreeConfig,
    root: QuadTreeNode,
    entries: HashMap<ProvinceId, BoundingBox>,
    node_count: usize,
}

impl Default for QuadTreeIndex {
    fn default() -> Self {
        Self::new(QuadTreeConfig::default())
    }
}

impl QuadTreeIndex {
    pub fn new(config: QuadTreeConfig) -> Self {
        Self {
            root: QuadTreeNode::new(config.world_bounds, 0),
            config,
            entries: HashMap::new(),
            node_count: 1,
        }
    }

    pub fn from_config(config: &MapConfig) -> Self {
        Self::new(config.quadtree)
    }

    pub fn config(&self) -> &QuadTreeConfig {
        &self.config
    }

    pub fn root(&self) -> &QuadTreeNode {
        &self.root
    }

    /// Rebuild from scratch using each province's bounds.
    pub fn build(&mut self, provinces: &[ProvinceRecord]) {
        self.clear();
        for province in provinces {
            self.insert(province.id, province.bounds);
        }
        tracing::info!(
            target: "map_core::spatial",
            provinces = self.entries.len(),
            nodes = self.node_count,
            depth = self.max_depth(),
            "quadtree.built"
        );
    }

    /// Index `id` with `bounds`; an id already present is re-inserted.
    pub fn insert(&mut self, id: ProvinceId, bounds: BoundingBox) {
        if self.entries.contains_key(&id) {
            self.remove(id);
        }
        if !self.config.world_bounds.contains_box(&bounds) {
            tracing::debug!(
                target: "map_core::spatial",
                province = id,
                "quadtree.outside_world_bounds"
            );
        }
        self.entries.insert(id, bounds);
        let rules = SplitRules {
            max_depth: self.config.max_depth,
            capacity: self.config.node_capacity.max(1),
            entries: &self.entries,
        };
        self.node_count += self.root.insert(id, &bounds, &rules);
    }

    pub fn remove(&mut self, id: ProvinceId) -> bool {
        let Some(bounds) = self.entries.remove(&id) else {
            return false;
        };
        let removed = self.root.remove(id, &bounds);
        if !removed {
            tracing::warn!(
                target: "map_core::spatial",
                province = id,
                "quadtree.remove_missing_node_entry"
            );
        }
        removed
    }

    pub fn update(&mut self, id: ProvinceId, bounds: BoundingBox) {
        self.remove(id);
        self.insert(id, bounds);
    }

    fn collect(
        &self,
        prune: &dyn Fn(&BoundingBox) -> bool,
        keep: impl Fn(&BoundingBox) -> bool,
    ) -> Vec<ProvinceId> {
        let mut slices = Vec::new();
        self.root.visit(prune, &mut slices);
        let mut found: Vec<ProvinceId> = slices
            .into_iter()
            .flatten()
            .copied()
            .filter(|id| self.entries.get(id).is_some_and(&keep))
            .collect();
        found.sort_unstable();
        found
    }

    /// Provinces whose box contains the point.
    pub fn query_point(&self, x: f64, y: f64) -> Vec<ProvinceId> {
        self.collect(&|node| node.contains(x, y), |bounds| bounds.contains(x, y))
    }

    /// Provinces whose box intersects `region`.
    pub fn query_region(&self, region: &BoundingBox) -> Vec<ProvinceId> {
        self.collect(&|node| node.intersects(region), |bounds| bounds.intersects(region))
    }

    /// Provinces whose box intersects the square around `center`.
    pub fn query_radius(&self, center: Coordinate, radius: f64) -> Vec<ProvinceId> {
        self.query_region(&BoundingBox::around(center, radius.max(0.0)))
    }

    pub fn find_nearest(&self, point: Coordinate) -> Option<ProvinceId> {
        self.find_n_nearest(point, 1).into_iter().next()
    }

    /// Up to `count` provinces ranked by the distance from `point` to their
    /// box (zero when inside), using a best-first walk of the tree.
    pub fn find_n_nearest(&self, point: Coordinate, count: usize) -> Vec<ProvinceId> {
        let mut found = Vec::with_capacity(count.min(self.entries.len()));
        if count == 0 || self.entries.is_empty() {
            return found;
        }

        let mut heap = BinaryHeap::new();
        // The root may hold boxes outside its own bounds.
        heap.push(Ranked {
            distance_sq: 0.0,
            candidate: Candidate::Node(&self.root),
        });
        while let Some(Ranked { candidate, .. }) = heap.pop() {
            match candidate {
                Candidate::Province(id) => {
                    found.push(id);
                    if found.len() == count {
                        break;
                    }
                }
                Candidate::Node(node) => {
                    for &id in &node.ids {
                        if let Some(bounds) = self.entries.get(&id) {
                            heap.push(Ranked {
                                distance_sq: bounds.distance_squared_to(point),
                                candidate: Candidate::Province(id),
                            });
                        }
                    }
                    if let Some(children) = node.children.as_deref() {
                        for child in children {
                            heap.push(Ranked {
                                distance_sq: child.bounds.distance_squared_to(point),
                                candidate: Candidate::Node(child),
                            });
                        }
                    }
                }
            }
        }
        found
    }

    pub fn bounds_of(&self, id: ProvinceId) -> Option<&BoundingBox> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: ProvinceId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Depth of the deepest node, 0 for an unsplit root.
    pub fn max_depth(&self) -> u32 {
        self.root.deepest()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.root = QuadTreeNode::new(self.config.world_bounds, 0);
        self.entries.clear();
        self.node_count = 1;
    }

    #[cfg(test)]
    fn recount_nodes(&self) -> usize {
        self.root.count_nodes()
    }
}
