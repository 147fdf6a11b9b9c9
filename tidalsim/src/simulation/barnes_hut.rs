//! # Barnes–Hut Octree (3D)
//!
//! This module implements a **3D Barnes–Hut octree** for approximating the
//! self-gravity of an `N`-body system. The goal is to replace the naive
//! `O(N²)` all-pairs force calculation with an approximate `O(N log N)`
//! method while preserving good accuracy for distant interactions.
//!
//! ## Core Concepts
//!
//! A group of distant bodies is treated as a single pseudo-body located at
//! their center of mass, optionally corrected by the group's quadrupole
//! moment. For sufficiently far cells, evaluating one interaction is
//! drastically cheaper than computing many individual forces.
//!
//! - The bounding cube of all bodies is recursively subdivided into 8 octants.
//! - Each octant becomes a node of the octree. Children are created only for
//!   octants that receive bodies, so some of the 8 slots may stay empty.
//! - A leaf holds up to `leaf_capacity` bodies; past that it splits. At
//!   `max_depth` leaves stop splitting, which bounds the work for coincident
//!   bodies.
//! - Each node stores:
//!   - total mass of its subtree
//!   - center of mass (COM)
//!   - quadrupole tensor about the COM
//!   - `bmax²`, the squared distance from the COM to the farthest cell corner
//!   - bounding box (for subdivision and the containment test)
//!
//! ## Storage
//!
//! Nodes live in one `Vec` and refer to their children by index. A parent
//! is always pushed before its children, and the whole arena is rebuilt from
//! scratch for every force evaluation, so nothing survives between steps.
//!
//! ## Multipole pass
//!
//! Moments are computed bottom-up one depth level at a time, deepest first.
//! Nodes on the same level only read their children, so each level is a
//! parallel map followed by a write-back.
//!
//! ## Opening criterion
//!
//! With the Salmon & Warren (1993) test a cell is accepted as a single source
//! for a body at distance `d` from its COM when `bmax < theta * d`. A cell
//! whose box contains the body is always opened.

use nalgebra::Matrix3;
use rayon::prelude::*;

use crate::simulation::engine::{Criterion, Engine};
use crate::simulation::states::{NVec3, System};

/// Smallest half-width of the root cube, for systems whose bodies all coincide
const MIN_HALF_EXTENT: f64 = 1.0e-9;

/// A single octree node.
///
/// Each node represents a cubic region of space and is either:
/// - a leaf (`children` all `None`), holding the indices in `bodies`
/// - an internal node whose bodies are held by its descendants
pub struct BarnesHutNode {
    pub mass: f64,
    pub com: NVec3,
    pub quad: Matrix3<f64>, // sum m (3 d d^T - |d|^2 I), d relative to com
    pub bmax2: f64,
    pub bbox_min: NVec3,
    pub bbox_max: NVec3,
    pub depth: usize,
    pub children: [Option<usize>; 8], // indices into BarnesHutTree::nodes
    pub bodies: Vec<usize>, // body indices, only non-empty for leaves
}

impl BarnesHutNode {
    fn empty(bbox_min: NVec3, bbox_max: NVec3, depth: usize) -> Self {
        Self {
            mass: 0.0,
            com: NVec3::zeros(),
            quad: Matrix3::zeros(),
            bmax2: 0.0,
            bbox_min,
            bbox_max,
            depth,
            children: [None; 8],
            bodies: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(|c| c.is_none())
    }

    /// Whether `p` lies inside (or on the boundary of) this node's box
    pub fn contains(&self, p: &NVec3) -> bool {
        (0..3).all(|k| p[k] >= self.bbox_min[k] && p[k] <= self.bbox_max[k])
    }

    pub fn size(&self) -> f64 {
        let size_vec = self.bbox_max - self.bbox_min;
        size_vec.x.max(size_vec.y).max(size_vec.z)
    }
}

/// Aggregate multipole data computed for one node during the bottom-up pass
struct Moments {
    mass: f64,
    com: NVec3,
    quad: Matrix3<f64>,
    bmax2: f64,
}

/// Settings of one tree walk
#[derive(Debug, Clone, Copy)]
pub struct WalkParams {
    pub g: f64, // gravitational constant
    pub eps2: f64, // softening added to distance squared
    pub theta: f64, // opening angle
    pub criterion: Criterion,
    pub use_quadrupole: bool,
}

/// Shape summary of a built tree, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    pub nodes: usize,
    pub leaves: usize,
    pub depth: usize,
    pub bodies: usize,
}

/// A complete 3D Barnes–Hut octree built over an N-body system.
///
/// This structure owns:
/// - a vector of all octree nodes (`nodes`)
/// - an index into that list representing the root (`root`)
pub struct BarnesHutTree {
    pub nodes: Vec<BarnesHutNode>,
    pub root: usize,
    leaf_capacity: usize,
    max_depth: usize,
}

impl BarnesHutTree {
    /// Build an octree from the current state of the system.
    ///
    /// This:
    /// 1. Computes a global cubic bounding box that encloses all bodies.
    /// 2. Creates a root node covering that bounding volume.
    /// 3. Inserts each body into the tree, splitting full leaves as needed.
    /// 4. Computes mass, COM, quadrupole and `bmax²` for every node (bottom-up).
    ///
    /// # Parameters
    /// - `sys`   : The system whose bodies will be inserted.
    /// - `engine`: Supplies `leaf_capacity` and `max_depth`.
    pub fn build(sys: &System, engine: &Engine) -> Self {
        let (bbox_min, bbox_max) = compute_global_bbox(sys);

        let mut tree = BarnesHutTree {
            nodes: vec![BarnesHutNode::empty(bbox_min, bbox_max, 0)],
            root: 0,
            leaf_capacity: engine.leaf_capacity.max(1),
            max_depth: engine.max_depth,
        };

        for i in 0..sys.bodies.len() {
            tree.insert_body(i, sys);
        }

        tree.compute_moments(sys);

        tree
    }

    /// Compute the gravitational acceleration on body `i` using the tree.
    ///
    /// Traverses the octree from the root. Accepted cells contribute their
    /// monopole (plus quadrupole when enabled); leaves reached by the walk
    /// contribute exact softened pairwise terms, skipping body `i` itself.
    ///
    /// # Returns
    /// The net acceleration on body `i` due to all other bodies.
    pub fn force_on_body(&self, i: usize, sys: &System, walk: &WalkParams) -> NVec3 {
        let pos_i = sys.bodies[i].x;
        let mut acc = NVec3::zeros();
        self.traverse_node(self.root, Some(i), &pos_i, sys, walk, &mut acc);
        acc
    }

    /// Acceleration at an arbitrary point due to every body in the tree
    pub fn acceleration_at(&self, pos: &NVec3, sys: &System, walk: &WalkParams) -> NVec3 {
        let mut acc = NVec3::zeros();
        self.traverse_node(self.root, None, pos, sys, walk, &mut acc);
        acc
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            nodes: self.nodes.len(),
            leaves: self.nodes.iter().filter(|n| n.is_leaf()).count(),
            depth: self.nodes.iter().map(|n| n.depth).max().unwrap_or(0),
            bodies: self.nodes.iter().map(|n| n.bodies.len()).sum(),
        }
    }

    // helpers ==============================================================================

    /// Insert a single body, walking down from the root.
    ///
    /// - A leaf with room (or at `max_depth`) takes the body.
    /// - A full leaf is split: its bodies move one level down into the
    ///   octants they fall in, and the walk continues from the same node.
    /// - An internal node forwards the body to the octant containing it,
    ///   creating that child if needed.
    fn insert_body(&mut self, body_idx: usize, sys: &System) {
        let pos = sys.bodies[body_idx].x;
        let mut node_idx = self.root;

        loop {
            if self.nodes[node_idx].is_leaf() {
                let node = &self.nodes[node_idx];
                if node.bodies.len() < self.leaf_capacity || node.depth >= self.max_depth {
                    self.nodes[node_idx].bodies.push(body_idx);
                    return;
                }

                // full leaf -> push its bodies down one level
                let existing = std::mem::take(&mut self.nodes[node_idx].bodies);
                for b in existing {
                    let child = self.child_for_point(node_idx, &sys.bodies[b].x);
                    self.nodes[child].bodies.push(b);
                }
            }

            node_idx = self.child_for_point(node_idx, &pos);
        }
    }

    /// Index of the child octant of `node_idx` containing `p`, created on demand
    fn child_for_point(&mut self, node_idx: usize, p: &NVec3) -> usize {
        let bbox_min = self.nodes[node_idx].bbox_min;
        let bbox_max = self.nodes[node_idx].bbox_max;
        let octant = child_index_for_point(p, &bbox_min, &bbox_max);

        if let Some(idx) = self.nodes[node_idx].children[octant] {
            return idx;
        }

        let (cmin, cmax) = child_bbox(&bbox_min, &bbox_max, octant);
        let depth = self.nodes[node_idx].depth + 1;
        let new_idx = self.nodes.len();
        self.nodes.push(BarnesHutNode::empty(cmin, cmax, depth));
        self.nodes[node_idx].children[octant] = Some(new_idx);
        new_idx
    }

    /// Bottom-up multipole pass, one depth level at a time.
    ///
    /// Every node on a level only reads its own bodies or its children's
    /// (already final) moments, so a level is evaluated in parallel and written
    /// back once the whole level has joined.
    fn compute_moments(&mut self, sys: &System) {
        let deepest = self.nodes.iter().map(|n| n.depth).max().unwrap_or(0);
        let mut levels: Vec<Vec<usize>> = vec![Vec::new(); deepest + 1];
        for (idx, node) in self.nodes.iter().enumerate() {
            levels[node.depth].push(idx);
        }

        for level in levels.iter().rev() {
            let moments: Vec<Moments> = level
                .par_iter()
                .map(|&idx| self.node_moments(idx, sys))
                .collect();

            for (&idx, m) in level.iter().zip(moments) {
                let node = &mut self.nodes[idx];
                node.mass = m.mass;
                node.com = m.com;
                node.quad = m.quad;
                node.bmax2 = m.bmax2;
            }
        }
    }

    /// Exact moments of one node from its bodies (leaf) or its children (internal)
    fn node_moments(&self, idx: usize, sys: &System) -> Moments {
        let node = &self.nodes[idx];

        // (mass, position, quadrupole about that position) of each constituent
        let parts: Vec<(f64, NVec3, Matrix3<f64>)> = if node.is_leaf() {
            node.bodies
                .iter()
                .map(|&b| (sys.bodies[b].m, sys.bodies[b].x, Matrix3::zeros()))
                .collect()
        } else {
            node.children
                .iter()
                .flatten()
                .map(|&c| {
                    let child = &self.nodes[c];
                    (child.mass, child.com, child.quad)
                })
                .collect()
        };

        let mass: f64 = parts.iter().map(|p| p.0).sum();
        let com = if mass > 0.0 {
            parts.iter().fold(NVec3::zeros(), |acc, p| acc + p.1 * p.0) / mass
        } else {
            (node.bbox_min + node.bbox_max) * 0.5
        };

        // parallel-axis shift of every part's quadrupole onto the node COM
        let quad = parts.iter().fold(Matrix3::zeros(), |acc, (m, x, q)| {
            let d = x - com;
            acc + q + (d * d.transpose() * 3.0 - Matrix3::identity() * d.norm_squared()) * *m
        });

        let bmax2 = (0..3)
            .map(|k| {
                let lo = com[k] - node.bbox_min[k];
                let hi = node.bbox_max[k] - com[k];
                let far = lo.max(hi);
                far * far
            })
            .sum();

        Moments { mass, com, quad, bmax2 }
    }

    /// Recursively traverse a subtree to accumulate acceleration at `pos_i`.
    ///
    /// - **Empty node** (`mass == 0.0`): no contribution.
    /// - **Leaf**: exact softened pairwise terms for each body it holds,
    ///   skipping `skip` (the body under evaluation).
    /// - **Internal node**: if the criterion accepts it, one monopole term at
    ///   its COM plus the quadrupole correction; otherwise visit every child.
    fn traverse_node(&self, node_idx: usize, skip: Option<usize>, pos_i: &NVec3, sys: &System, walk: &WalkParams, acc: &mut NVec3) {
        let node = &self.nodes[node_idx];

        // Skip empty nodes
        if node.mass == 0.0 {
            return;
        }

        if node.is_leaf() {
            for &bidx in &node.bodies {
                if Some(bidx) == skip {
                    continue; // don't self-interact
                }
                let b = &sys.bodies[bidx];
                let r = b.x - pos_i;
                let dist2 = r.norm_squared() + walk.eps2;
                let inv_r = dist2.sqrt().recip();
                let inv_r3 = inv_r * inv_r * inv_r;

                *acc += walk.g * b.m * inv_r3 * r;
            }
            return;
        }

        let r = node.com - pos_i;
        let r2 = r.norm_squared();

        let accept = !node.contains(pos_i)
            && match walk.criterion {
                Criterion::Sw93 => node.bmax2 < walk.theta * walk.theta * r2,
            };

        if accept {
            *acc += cell_acceleration(node, &r, walk);
        } else {
            for child_idx in node.children.iter().flatten() {
                self.traverse_node(*child_idx, skip, pos_i, sys, walk, acc);
            }
        }
    }
}

/// Monopole (and optional quadrupole) acceleration of an accepted cell.
///
/// `r` points from the body to the cell COM. With `dr2 = |r|² + eps²`:
///
/// ```text
/// a = G M r / dr2^(3/2)
///   + G [ (5/2) (rᵀ Q r) r / dr2^(7/2) - Q r / dr2^(5/2) ]
/// ```
fn cell_acceleration(node: &BarnesHutNode, r: &NVec3, walk: &WalkParams) -> NVec3 {
    let dr2 = r.norm_squared() + walk.eps2;
    let drab = dr2.sqrt();
    let mor3 = node.mass / (dr2 * drab);
    let mut acc = mor3 * *r;

    if walk.use_quadrupole {
        let dr5inv = 1.0 / (dr2 * dr2 * drab);
        let quad_dr = node.quad * *r;
        let dr_quad_dr = r.dot(&quad_dr);
        let phi_quad = -0.5 * dr5inv * dr_quad_dr;

        acc -= (5.0 * phi_quad / dr2) * *r;
        acc -= quad_dr * dr5inv;
    }

    walk.g * acc
}

// helpers ===========================================================================

/// Compute a global cubic bounding box that encloses all bodies in the system.
///
/// Finds the axis-aligned extent of all positions and expands it into a cube
/// around its center with the largest half-extent over x/y/z. The cube is
/// never thinner than `MIN_HALF_EXTENT`, so coincident bodies still get a
/// box that can be split.
fn compute_global_bbox(sys: &System) -> (NVec3, NVec3) {
    if sys.bodies.is_empty() {
        let half = NVec3::repeat(1.0);
        return (-half, half);
    }

    let mut min = NVec3::repeat(f64::INFINITY);
    let mut max = NVec3::repeat(f64::NEG_INFINITY);

    for b in &sys.bodies {
        min.x = min.x.min(b.x.x);
        min.y = min.y.min(b.x.y);
        min.z = min.z.min(b.x.z);

        max.x = max.x.max(b.x.x);
        max.y = max.y.max(b.x.y);
        max.z = max.z.max(b.x.z);
    }

    // Expand to a cube so size is well-defined
    let center = (min + max) * 0.5;
    let half = (max - min) * 0.5;
    let max_half = half.x.max(half.y).max(half.z).max(MIN_HALF_EXTENT);
    let half = NVec3::repeat(max_half);

    (center - half, center + half)
}

/// Compute the octant index for a point within a node's bounding box.
///
/// The index is encoded using 3 bits:
/// - Bit 0 (value 1): X axis: 0 for x < center.x, 1 otherwise
/// - Bit 1 (value 2): Y axis: 0 for y < center.y, 1 otherwise
/// - Bit 2 (value 4): Z axis: 0 for z < center.z, 1 otherwise
///
/// This encoding matches the layout of `children[0..8]` in the octree nodes.
fn child_index_for_point(p: &NVec3, bbox_min: &NVec3, bbox_max: &NVec3) -> usize {
    let center = (bbox_min + bbox_max) * 0.5;
    let mut idx = 0;

    if p.x >= center.x { idx |= 1; } // bit 0
    if p.y >= center.y { idx |= 2; } // bit 1
    if p.z >= center.z { idx |= 4; } // bit 2

    idx
}

/// Compute the bounding box of child octant `child_idx` (same bit encoding as
/// [`child_index_for_point`]) by splitting the parent box at its center.
fn child_bbox(parent_min: &NVec3, parent_max: &NVec3, child_idx: usize) -> (NVec3, NVec3) {
    let center = (parent_min + parent_max) * 0.5;

    let mut min = *parent_min;
    let mut max = *parent_max;

    for axis in 0..3 {
        if (child_idx >> axis) & 1 == 0 {
            max[axis] = center[axis];
        } else {
            min[axis] = center[axis];
        }
    }

    (min, max)
}
