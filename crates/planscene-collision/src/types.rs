//! Collision request / result vocabulary.

use std::collections::BTreeMap;

use nalgebra::{Point3, Vector3};
use planscene_geometry::Aabb;

/// Kind of entity taking part in a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyType {
    RobotLink,
    RobotAttached,
    WorldObject,
}

/// One point of contact between two bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub pos: Point3<f64>,
    pub normal: Vector3<f64>,
    pub depth: f64,
    pub body_name_1: String,
    pub body_type_1: BodyType,
    pub body_name_2: String,
    pub body_type_2: BodyType,
}

impl Contact {
    /// True when either participant is the named body.
    pub fn involves(&self, name: &str) -> bool {
        self.body_name_1 == name || self.body_name_2 == name
    }
}

/// A region of space contributing to the collision cost of a state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostSource {
    pub aabb: Aabb,
    pub cost: f64,
}

impl CostSource {
    pub fn new(aabb: Aabb) -> Self {
        Self {
            cost: aabb.volume(),
            aabb,
        }
    }

    pub fn volume(&self) -> f64 {
        self.aabb.volume()
    }
}

/// What a collision query should compute.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionRequest {
    /// Restrict the robot side to the links of this group (all links when
    /// empty or unknown).
    pub group_name: String,
    pub distance: bool,
    pub cost: bool,
    pub contacts: bool,
    pub max_contacts: usize,
    pub max_contacts_per_pair: usize,
    pub max_cost_sources: usize,
    pub verbose: bool,
    pub pad_environment_collisions: bool,
    pub pad_self_collisions: bool,
}

impl Default for CollisionRequest {
    fn default() -> Self {
        Self {
            group_name: String::new(),
            distance: false,
            cost: false,
            contacts: false,
            max_contacts: 1,
            max_contacts_per_pair: 1,
            max_cost_sources: 1,
            verbose: false,
            pad_environment_collisions: true,
            pad_self_collisions: false,
        }
    }
}

/// Outcome of a collision query.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionResult {
    pub collision: bool,
    /// Smallest separation found (only computed on request).
    pub distance: f64,
    pub contact_count: usize,
    /// Contacts keyed by the (ordered) pair of body names.
    pub contacts: BTreeMap<(String, String), Vec<Contact>>,
    /// Sorted by decreasing cost.
    pub cost_sources: Vec<CostSource>,
}

impl Default for CollisionResult {
    fn default() -> Self {
        Self {
            collision: false,
            distance: f64::MAX,
            contact_count: 0,
            contacts: BTreeMap::new(),
            cost_sources: Vec::new(),
        }
    }
}

impl CollisionResult {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// All contacts, pair by pair.
    pub fn all_contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values().flatten()
    }

    /// Record a contact within the request limits.  Returns false when the
    /// contact was not stored because a limit was reached.
    pub fn add_contact(&mut self, req: &CollisionRequest, contact: Contact) -> bool {
        self.collision = true;
        if !req.contacts || self.contact_count >= req.max_contacts {
            return false;
        }
        let key = if contact.body_name_1 <= contact.body_name_2 {
            (contact.body_name_1.clone(), contact.body_name_2.clone())
        } else {
            (contact.body_name_2.clone(), contact.body_name_1.clone())
        };
        let list = self.contacts.entry(key).or_default();
        if list.len() >= req.max_contacts_per_pair.max(1) {
            return false;
        }
        list.push(contact);
        self.contact_count += 1;
        true
    }

    /// True when no further contact could change the answer.
    pub fn is_saturated(&self, req: &CollisionRequest) -> bool {
        self.collision && !req.cost && !req.distance && (!req.contacts || self.contact_count >= req.max_contacts)
    }

    pub fn add_cost_source(&mut self, req: &CollisionRequest, source: CostSource) {
        self.cost_sources.push(source);
        sort_cost_sources(&mut self.cost_sources);
        self.cost_sources.truncate(req.max_cost_sources);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cost-source set operations
// ────────────────────────────────────────────────────────────────────────────

/// Sort by decreasing cost, then by box corners; drop exact duplicates.
pub fn sort_cost_sources(sources: &mut Vec<CostSource>) {
    sources.sort_by(|a, b| {
        b.cost
            .total_cmp(&a.cost)
            .then_with(|| cmp_point(&a.aabb.min, &b.aabb.min))
            .then_with(|| cmp_point(&a.aabb.max, &b.aabb.max))
    });
    sources.dedup();
}

fn cmp_point(a: &Point3<f64>, b: &Point3<f64>) -> std::cmp::Ordering {
    a.x.total_cmp(&b.x)
        .then_with(|| a.y.total_cmp(&b.y))
        .then_with(|| a.z.total_cmp(&b.z))
}

fn intersection_volume(a: &CostSource, b: &CostSource) -> Option<(Aabb, f64)> {
    a.aabb.intersection(&b.aabb).map(|i| (i, i.volume()))
}

/// Drop every source that another, costlier source overlaps by at least
/// `overlap_fraction` of its volume.
pub fn remove_overlapping(sources: &mut Vec<CostSource>, overlap_fraction: f64) {
    sort_cost_sources(sources);
    let mut kept: Vec<CostSource> = Vec::with_capacity(sources.len());
    for s in sources.drain(..) {
        let redundant = kept.iter().any(|k| {
            intersection_volume(k, &s).is_some_and(|(_, v)| v > 0.0 && v >= s.volume() * overlap_fraction)
        });
        if !redundant {
            kept.push(s);
        }
    }
    *sources = kept;
}

/// Remove from `sources` the space covered by `to_remove`.  Sources overlapped
/// by at least `overlap_fraction` of their volume are dropped; smaller
/// overlaps split the source into the parts outside the overlap.
pub fn remove_cost_sources(sources: &mut Vec<CostSource>, to_remove: &[CostSource], overlap_fraction: f64) {
    for rem in to_remove {
        let mut next = Vec::with_capacity(sources.len());
        for s in sources.drain(..) {
            let Some((overlap, volume)) = intersection_volume(&s, rem) else {
                next.push(s);
                continue;
            };
            if volume <= 0.0 {
                next.push(s);
            } else if volume >= s.volume() * overlap_fraction {
                continue;
            } else {
                let density = if s.volume() > 0.0 { s.cost / s.volume() } else { 0.0 };
                for axis in 0..3 {
                    if s.aabb.max[axis] > overlap.max[axis] {
                        let mut piece = s.aabb;
                        piece.min[axis] = overlap.max[axis];
                        push_piece(&mut next, piece, density);
                    }
                    if s.aabb.min[axis] < overlap.min[axis] {
                        let mut piece = s.aabb;
                        piece.max[axis] = overlap.min[axis];
                        push_piece(&mut next, piece, density);
                    }
                }
            }
        }
        *sources = next;
    }
    sort_cost_sources(sources);
}

fn push_piece(out: &mut Vec<CostSource>, aabb: Aabb, density: f64) {
    let volume = aabb.volume();
    if volume > f64::EPSILON {
        out.push(CostSource {
            aabb,
            cost: volume * density,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(min: f64, max: f64) -> CostSource {
        CostSource::new(Aabb::new(Point3::new(min, min, min), Point3::new(max, max, max)))
    }

    fn contact(a: &str, b: &str) -> Contact {
        Contact {
            pos: Point3::origin(),
            normal: Vector3::z(),
            depth: 0.1,
            body_name_1: a.into(),
            body_type_1: BodyType::RobotLink,
            body_name_2: b.into(),
            body_type_2: BodyType::WorldObject,
        }
    }

    // ── Contacts ────────────────────────────────────────────────────────────

    #[test]
    fn contacts_respect_limits() {
        let req = CollisionRequest {
            contacts: true,
            max_contacts: 2,
            max_contacts_per_pair: 1,
            ..CollisionRequest::default()
        };
        let mut res = CollisionResult::default();
        assert!(res.add_contact(&req, contact("hand", "box")));
        assert!(!res.add_contact(&req, contact("box", "hand")));
        assert!(res.add_contact(&req, contact("arm", "box")));
        assert!(!res.add_contact(&req, contact("base", "box")));
        assert!(res.collision);
        assert_eq!(res.contact_count, 2);
        assert!(res.contacts.contains_key(&("box".to_string(), "hand".to_string())));
        assert!(res.is_saturated(&req));
    }

    #[test]
    fn contacts_not_stored_unless_requested() {
        let req = CollisionRequest::default();
        let mut res = CollisionResult::default();
        assert!(!res.add_contact(&req, contact("a", "b")));
        assert!(res.collision);
        assert!(res.contacts.is_empty());
        assert!(res.is_saturated(&req));
    }

    // ── Cost sources ────────────────────────────────────────────────────────

    #[test]
    fn cost_sources_keep_the_largest() {
        let req = CollisionRequest {
            max_cost_sources: 2,
            ..CollisionRequest::default()
        };
        let mut res = CollisionResult::default();
        for s in [cube(0.0, 1.0), cube(0.0, 3.0), cube(0.0, 2.0)] {
            res.add_cost_source(&req, s);
        }
        let costs: Vec<f64> = res.cost_sources.iter().map(|c| c.cost).collect();
        assert_eq!(costs, vec![27.0, 8.0]);
    }

    #[test]
    fn overlapping_smaller_sources_are_dropped() {
        let mut sources = vec![cube(0.0, 1.0), cube(0.0, 2.0), cube(5.0, 6.0)];
        remove_overlapping(&mut sources, 0.5);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].cost, 8.0);
    }

    #[test]
    fn removal_drops_covered_and_splits_partial() {
        let mut sources = vec![cube(0.0, 1.0)];
        remove_cost_sources(&mut sources, &[cube(-1.0, 2.0)], 0.5);
        assert!(sources.is_empty());

        let mut sources = vec![CostSource::new(Aabb::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 1.0, 1.0),
        ))];
        let hole = CostSource::new(Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 2.0, 2.0)));
        remove_cost_sources(&mut sources, &[hole], 0.5);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].aabb.min.x, 1.0);
        assert_eq!(sources[0].cost, 3.0);
    }
}
