//! Occupancy octree and axis-aligned boxes.
//!
//! An [`OcTree`] stores the centres of occupied cells of a regular grid with
//! side `resolution`, indexed by a recursive octree so that overlap queries
//! against a robot link's box only visit nearby cells.  It is the payload of
//! the single `<octomap>` world object and travels on the wire as an
//! [`OctomapMsg`] in one of two encodings:
//!
//! | Encoding | Per cell |
//! |----------|----------|
//! | binary   | three little-endian `i32` grid keys (`round(coord / resolution)`) |
//! | full     | three little-endian `f32` coordinates + one `f32` occupancy probability |
//!
//! In the full encoding only cells with probability ≥ 0.5 are occupied.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::Point3;
//! use planscene_geometry::octree::{Aabb, OcTree};
//!
//! let tree = OcTree::from_cells(0.1, [Point3::new(1.0, 2.0, 3.0)]);
//! assert_eq!(tree.len(), 1);
//!
//! let query = Aabb::new(Point3::new(0.96, 1.96, 2.96), Point3::new(1.0, 2.0, 3.0));
//! assert!(tree.query_aabb(&query));
//!
//! // Encodings round-trip through the wire message.
//! let msg = tree.to_msg(true);
//! assert_eq!(OcTree::from_msg(&msg).unwrap(), tree);
//! ```

use std::collections::BTreeSet;

use nalgebra::{Point3, Vector3};
use planscene_types::{OctomapMsg, Pose, SceneError};

/// The only octomap id accepted by [`OcTree::from_msg`].
pub const OCTOMAP_ID: &str = "OcTree";

/// Octomap id used in diff messages to say "the octomap was removed".
pub const CLEARED_OCTOMAP_ID: &str = "cleared";

const NODE_CAPACITY: usize = 8;
const MAX_DEPTH: usize = 16;
const OCCUPANCY_THRESHOLD: f32 = 0.5;

// ────────────────────────────────────────────────────────────────────────────
// Aabb
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a bounding box from two opposite corners (normalised so that
    /// `min ≤ max` per axis).
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Self {
        Self {
            min: a.inf(&b),
            max: a.sup(&b),
        }
    }

    /// Box of half-size `half` around `centre`.
    pub fn from_half_extents(centre: Point3<f64>, half: Vector3<f64>) -> Self {
        Self::new(centre - half, centre + half)
    }

    /// Smallest box containing every point, `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Point3<f64>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |acc, p| Self {
            min: acc.min.inf(&p),
            max: acc.max.sup(&p),
        }))
    }

    pub fn centre(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn extents(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn volume(&self) -> f64 {
        let e = self.extents();
        e.x * e.y * e.z
    }

    /// True when the point lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// True when `other` overlaps (intersects or touches) this box.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && self.max[i] >= other.min[i])
    }

    /// The overlapping region, if any.
    pub fn intersection(&self, other: &Aabb) -> Option<Aabb> {
        self.overlaps(other).then(|| Aabb {
            min: self.min.sup(&other.min),
            max: self.max.inf(&other.max),
        })
    }

    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Grow every face outward by `padding` (negative values shrink, never
    /// past the centre).
    pub fn padded(&self, padding: f64) -> Aabb {
        let half = (self.extents() * 0.5).add_scalar(padding).map(|v| v.max(0.0));
        Self::from_half_extents(self.centre(), half)
    }

    /// Scale the box about its centre.
    pub fn scaled(&self, scale: f64) -> Aabb {
        Self::from_half_extents(self.centre(), self.extents() * (0.5 * scale.abs()))
    }

    /// World-space box enclosing this box after applying `pose`.
    pub fn transformed(&self, pose: &Pose) -> Aabb {
        let corners = (0..8).map(|i| {
            Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        });
        let mut out = corners.map(|c| pose.transform_point(&c));
        // Eight corners always yield a box.
        let first = out.next().unwrap_or(self.min);
        out.fold(Aabb::new(first, first), |acc, p| Aabb {
            min: acc.min.inf(&p),
            max: acc.max.sup(&p),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OcTree
// ────────────────────────────────────────────────────────────────────────────

/// Occupied cells of a regular grid, indexed by a bounded point octree.
///
/// Cells are deduplicated on their integer grid key; every stored point is a
/// cell centre (`key * resolution`).
#[derive(Debug, Clone)]
pub struct OcTree {
    resolution: f64,
    keys: BTreeSet<[i32; 3]>,
    root: Option<OctreeNode>,
}

impl OcTree {
    /// An empty tree.
    pub fn new(resolution: f64) -> Self {
        Self {
            resolution,
            keys: BTreeSet::new(),
            root: None,
        }
    }

    /// Build a tree marking the cells containing `points` as occupied.
    pub fn from_cells(resolution: f64, points: impl IntoIterator<Item = Point3<f64>>) -> Self {
        let keys = points
            .into_iter()
            .map(|p| key_of(&p, resolution))
            .collect::<BTreeSet<_>>();
        Self::from_keys(resolution, keys)
    }

    fn from_keys(resolution: f64, keys: BTreeSet<[i32; 3]>) -> Self {
        let centres: Vec<Point3<f64>> = keys.iter().map(|k| centre_of(k, resolution)).collect();
        let root = Aabb::from_points(centres.iter().copied()).map(|bounds| {
            let mut node = OctreeNode::new(bounds.padded(resolution * 0.5));
            for c in &centres {
                node.insert(*c, 0);
            }
            node
        });
        Self {
            resolution,
            keys,
            root,
        }
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Occupied cell centres in key order.
    pub fn cells(&self) -> Vec<Point3<f64>> {
        self.keys.iter().map(|k| centre_of(k, self.resolution)).collect()
    }

    /// Cube occupied by the cell centred at `centre`.
    pub fn cell_box(&self, centre: &Point3<f64>) -> Aabb {
        Aabb::from_half_extents(*centre, Vector3::repeat(self.resolution * 0.5))
    }

    /// Box enclosing every occupied cell.
    pub fn bounding_box(&self) -> Option<Aabb> {
        self.root.as_ref().map(|r| r.bounds)
    }

    /// True when any occupied cell overlaps `region`.
    pub fn query_aabb(&self, region: &Aabb) -> bool {
        let grown = region.padded(self.resolution * 0.5);
        self.root.as_ref().is_some_and(|r| r.query_aabb(&grown))
    }

    /// Cubes of every occupied cell overlapping `region`.
    pub fn overlapping_cells(&self, region: &Aabb) -> Vec<Aabb> {
        let grown = region.padded(self.resolution * 0.5);
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.collect_in(&grown, &mut out);
        }
        out.into_iter().map(|c| self.cell_box(&c)).collect()
    }

    // ── Wire encoding ───────────────────────────────────────────────────────

    /// Decode an octomap message.
    pub fn from_msg(msg: &OctomapMsg) -> Result<Self, SceneError> {
        if msg.id != OCTOMAP_ID {
            return Err(SceneError::InvalidOctomap(format!(
                "unsupported octree type '{}'",
                msg.id
            )));
        }
        if !(msg.resolution > 0.0) {
            return Err(SceneError::InvalidOctomap(format!(
                "resolution must be positive, got {}",
                msg.resolution
            )));
        }
        if msg.binary {
            Self::decode_binary(msg.resolution, &msg.data)
        } else {
            Self::decode_full(msg.resolution, &msg.data)
        }
    }

    /// Encode into a message (id `"OcTree"`, empty header).
    pub fn to_msg(&self, binary: bool) -> OctomapMsg {
        let data = if binary {
            self.encode_binary()
        } else {
            self.encode_full()
        };
        OctomapMsg {
            binary,
            id: OCTOMAP_ID.to_string(),
            resolution: self.resolution,
            data,
            ..OctomapMsg::default()
        }
    }

    fn encode_binary(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.keys.len() * 12);
        for key in &self.keys {
            for k in key {
                out.extend_from_slice(&k.to_le_bytes());
            }
        }
        out
    }

    fn encode_full(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.keys.len() * 16);
        for c in self.cells() {
            for v in [c.x as f32, c.y as f32, c.z as f32, 1.0_f32] {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }

    fn decode_binary(resolution: f64, data: &[u8]) -> Result<Self, SceneError> {
        if data.len() % 12 != 0 {
            return Err(SceneError::InvalidOctomap(format!(
                "binary payload of {} bytes is not a whole number of cells",
                data.len()
            )));
        }
        let keys = data
            .chunks_exact(12)
            .map(|cell| [read_i32(&cell[0..4]), read_i32(&cell[4..8]), read_i32(&cell[8..12])])
            .collect();
        Ok(Self::from_keys(resolution, keys))
    }

    fn decode_full(resolution: f64, data: &[u8]) -> Result<Self, SceneError> {
        if data.len() % 16 != 0 {
            return Err(SceneError::InvalidOctomap(format!(
                "full payload of {} bytes is not a whole number of cells",
                data.len()
            )));
        }
        let mut points = Vec::with_capacity(data.len() / 16);
        for cell in data.chunks_exact(16) {
            let [x, y, z, p] = [
                read_f32(&cell[0..4]),
                read_f32(&cell[4..8]),
                read_f32(&cell[8..12]),
                read_f32(&cell[12..16]),
            ];
            if !(x.is_finite() && y.is_finite() && z.is_finite()) {
                return Err(SceneError::InvalidOctomap("non-finite cell coordinate".into()));
            }
            if p >= OCCUPANCY_THRESHOLD {
                points.push(Point3::new(x as f64, y as f64, z as f64));
            }
        }
        Ok(Self::from_cells(resolution, points))
    }
}

impl PartialEq for OcTree {
    fn eq(&self, other: &Self) -> bool {
        self.resolution == other.resolution && self.keys == other.keys
    }
}

fn key_of(p: &Point3<f64>, resolution: f64) -> [i32; 3] {
    [
        (p.x / resolution).round() as i32,
        (p.y / resolution).round() as i32,
        (p.z / resolution).round() as i32,
    ]
}

fn centre_of(key: &[i32; 3], resolution: f64) -> Point3<f64> {
    Point3::new(
        key[0] as f64 * resolution,
        key[1] as f64 * resolution,
        key[2] as f64 * resolution,
    )
}

fn read_i32(bytes: &[u8]) -> i32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    i32::from_le_bytes(buf)
}

fn read_f32(bytes: &[u8]) -> f32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    f32::from_le_bytes(buf)
}

// ────────────────────────────────────────────────────────────────────────────
// OctreeNode – internal implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct OctreeNode {
    bounds: Aabb,
    /// Cell centres stored at this node (only non-empty for leaves).
    points: Vec<Point3<f64>>,
    /// Eight children; `None` while this node is a leaf.
    children: Option<Box<[OctreeNode; 8]>>,
}

impl OctreeNode {
    fn new(bounds: Aabb) -> Self {
        Self {
            bounds,
            points: Vec::new(),
            children: None,
        }
    }

    fn insert(&mut self, point: Point3<f64>, depth: usize) {
        if !self.bounds.contains_point(&point) {
            return;
        }
        match self.children.as_mut() {
            None => {
                self.points.push(point);
                if self.points.len() > NODE_CAPACITY && depth < MAX_DEPTH {
                    self.subdivide(depth);
                }
            }
            Some(children) => {
                if let Some(child) = children.iter_mut().find(|c| c.bounds.contains_point(&point)) {
                    child.insert(point, depth + 1);
                }
            }
        }
    }

    fn query_aabb(&self, region: &Aabb) -> bool {
        if !self.bounds.overlaps(region) {
            return false;
        }
        match &self.children {
            None => self.points.iter().any(|p| region.contains_point(p)),
            Some(children) => children.iter().any(|c| c.query_aabb(region)),
        }
    }

    fn collect_in(&self, region: &Aabb, out: &mut Vec<Point3<f64>>) {
        if !self.bounds.overlaps(region) {
            return;
        }
        match &self.children {
            None => out.extend(self.points.iter().filter(|p| region.contains_point(p))),
            Some(children) => {
                for child in children.iter() {
                    child.collect_in(region, out);
                }
            }
        }
    }

    /// Split this leaf into eight children and redistribute its points.
    fn subdivide(&mut self, depth: usize) {
        let c = self.bounds.centre();
        let (min, max) = (self.bounds.min, self.bounds.max);
        let octants = [
            Aabb::new(min, c),
            Aabb::new(Point3::new(c.x, min.y, min.z), Point3::new(max.x, c.y, c.z)),
            Aabb::new(Point3::new(min.x, c.y, min.z), Point3::new(c.x, max.y, c.z)),
            Aabb::new(Point3::new(c.x, c.y, min.z), Point3::new(max.x, max.y, c.z)),
            Aabb::new(Point3::new(min.x, min.y, c.z), Point3::new(c.x, c.y, max.z)),
            Aabb::new(Point3::new(c.x, min.y, c.z), Point3::new(max.x, c.y, max.z)),
            Aabb::new(Point3::new(min.x, c.y, c.z), Point3::new(c.x, max.y, max.z)),
            Aabb::new(c, max),
        ];
        let mut children = Box::new(octants.map(OctreeNode::new));
        for p in std::mem::take(&mut self.points) {
            if let Some(child) = children.iter_mut().find(|ch| ch.bounds.contains_point(&p)) {
                child.insert(p, depth + 1);
            }
        }
        self.children = Some(children);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
