//! Bounding-volume reference engine.
//!
//! Every shape is approximated by its world-space axis-aligned box.  Two
//! exceptions keep the approximation honest for unbounded or sparse
//! geometry: planes are tested as half-spaces and octrees as their occupied
//! cells.
//!
//! | Robot side | Volume |
//! |------------|--------|
//! | link geometry | box, scaled by the link scale then grown by the link padding |
//! | attached body shape | box, unpadded |
//!
//! Contacts sit at the centre of the overlap region; the penetration depth
//! is the smallest overlap extent and the normal points along that axis.
//! Cost sources are the overlap regions themselves.

use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use planscene_geometry::{Aabb, OcTree, Shape};
use planscene_robot::{AttachedBody, RobotModel, RobotState};
use planscene_types::Pose;
use tracing::debug;

use crate::acm::AllowedCollisionMatrix;
use crate::env::{CollisionDetectorAllocator, CollisionEnv, LinkMargins};
use crate::types::{BodyType, CollisionRequest, CollisionResult, Contact, CostSource};
use crate::world::World;

pub const BOUNDING_VOLUME_DETECTOR: &str = "BoundingVolume";

// ────────────────────────────────────────────────────────────────────────────
// Allocator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct BoundingVolumeAllocator;

impl BoundingVolumeAllocator {
    /// The allocator as the shared handle scenes store.
    pub fn shared() -> Arc<dyn CollisionDetectorAllocator> {
        Arc::new(Self)
    }
}

impl CollisionDetectorAllocator for BoundingVolumeAllocator {
    fn name(&self) -> &str {
        BOUNDING_VOLUME_DETECTOR
    }

    fn allocate_env(&self, _world: &World, model: Arc<RobotModel>) -> Box<dyn CollisionEnv> {
        Box::new(BoundingVolumeEnv::new(model))
    }

    fn allocate_env_from(&self, existing: &dyn CollisionEnv, _world: &World) -> Box<dyn CollisionEnv> {
        let mut env = BoundingVolumeEnv::new(Arc::clone(existing.robot_model()));
        env.copy_padding_and_scale_from(existing);
        Box::new(env)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Volumes
// ────────────────────────────────────────────────────────────────────────────

enum Volume {
    Box(Aabb),
    /// `normal · p + offset ≤ 0`, in the model frame.
    HalfSpace { normal: Vector3<f64>, offset: f64 },
    Cells { tree: Arc<OcTree>, pose: Pose },
}

impl Volume {
    fn of(shape: &Shape, pose: &Pose) -> Option<Volume> {
        match shape {
            Shape::Plane { a, b, c, d } => {
                let normal = pose.rotation * Vector3::new(*a, *b, *c);
                let offset = d - normal.dot(&pose.translation.vector);
                Some(Volume::HalfSpace { normal, offset })
            }
            Shape::OcTree(tree) => Some(Volume::Cells {
                tree: Arc::clone(tree),
                pose: *pose,
            }),
            other => other.world_aabb(pose).map(Volume::Box),
        }
    }
}

struct Overlap {
    region: Aabb,
    depth: f64,
    normal: Vector3<f64>,
}

fn box_overlap(a: &Aabb, b: &Aabb) -> Option<Overlap> {
    let region = a.intersection(b)?;
    let e = region.extents();
    let axis = e.imin();
    let mut normal = Vector3::zeros();
    normal[axis] = if b.centre()[axis] >= a.centre()[axis] { 1.0 } else { -1.0 };
    Some(Overlap {
        region,
        depth: e[axis],
        normal,
    })
}

fn box_distance(a: &Aabb, b: &Aabb) -> f64 {
    let gap = Vector3::from_fn(|i, _| (a.min[i] - b.max[i]).max(b.min[i] - a.max[i]).max(0.0));
    gap.norm()
}

/// Signed value of `normal · p + offset` at the box corner deepest into the
/// half-space.
fn deepest_corner(aabb: &Aabb, normal: &Vector3<f64>) -> (Point3<f64>, f64) {
    let p = Point3::from(Vector3::from_fn(|i, _| {
        if normal[i] > 0.0 { aabb.min[i] } else { aabb.max[i] }
    }));
    (p, normal.dot(&p.coords))
}

fn overlaps(body: &Aabb, volume: &Volume) -> Vec<Overlap> {
    match volume {
        Volume::Box(b) => box_overlap(body, b).into_iter().collect(),
        Volume::HalfSpace { normal, offset } => {
            let norm = normal.norm();
            if norm <= f64::EPSILON {
                return Vec::new();
            }
            let (_, value) = deepest_corner(body, normal);
            let value = value + offset;
            if value > 0.0 {
                return Vec::new();
            }
            vec![Overlap {
                region: *body,
                depth: -value / norm,
                normal: normal / norm,
            }]
        }
        Volume::Cells { tree, pose } => {
            let local = body.transformed(&pose.inverse());
            tree.overlapping_cells(&local)
                .into_iter()
                .filter_map(|cell| box_overlap(body, &cell.transformed(pose)))
                .collect()
        }
    }
}

fn distance(body: &Aabb, volume: &Volume) -> f64 {
    match volume {
        Volume::Box(b) => box_distance(body, b),
        Volume::HalfSpace { normal, offset } => {
            let norm = normal.norm();
            if norm <= f64::EPSILON {
                return f64::MAX;
            }
            let (_, value) = deepest_corner(body, normal);
            ((value + offset) / norm).max(0.0)
        }
        Volume::Cells { tree, pose } => tree
            .bounding_box()
            .map_or(f64::MAX, |bb| box_distance(body, &bb.transformed(pose))),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Robot bodies
// ────────────────────────────────────────────────────────────────────────────

struct RobotBody<'a> {
    name: &'a str,
    kind: BodyType,
    /// Link the geometry moves with.
    link: &'a str,
    attached: Option<&'a AttachedBody>,
    aabb: Aabb,
}

// ────────────────────────────────────────────────────────────────────────────
// Environment
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BoundingVolumeEnv {
    model: Arc<RobotModel>,
    margins: LinkMargins,
}

impl BoundingVolumeEnv {
    pub fn new(model: Arc<RobotModel>) -> Self {
        Self {
            model,
            margins: LinkMargins::new(),
        }
    }

    /// Links the request is about: the group's links, or every link when the
    /// group is empty or unknown.
    fn active_links(&self, req: &CollisionRequest) -> Option<&[String]> {
        if req.group_name.is_empty() {
            return None;
        }
        self.model.group(&req.group_name)
    }

    fn robot_bodies<'a>(&self, state: &'a RobotState) -> Vec<RobotBody<'a>> {
        let mut out = Vec::new();
        for link in state.model().links() {
            if link.collision.is_empty() {
                continue;
            }
            let Some(link_pose) = state.global_link_transform(&link.name) else {
                continue;
            };
            let scale = self.margins.scale(&link.name);
            let padding = self.margins.padding(&link.name);
            for geometry in &link.collision {
                if let Some(aabb) = geometry.shape.world_aabb(&(link_pose * geometry.origin)) {
                    out.push(RobotBody {
                        name: &link.name,
                        kind: BodyType::RobotLink,
                        link: &link.name,
                        attached: None,
                        aabb: aabb.scaled(scale).padded(padding),
                    });
                }
            }
        }
        for body in state.attached_bodies() {
            let poses = state.attached_body_global_shape_poses(body);
            for (shape, pose) in body.shapes.iter().zip(&poses) {
                if let Some(aabb) = shape.world_aabb(pose) {
                    out.push(RobotBody {
                        name: &body.id,
                        kind: BodyType::RobotAttached,
                        link: &body.link,
                        attached: Some(body),
                        aabb,
                    });
                }
            }
        }
        out
    }

    fn in_group(active: Option<&[String]>, body: &RobotBody<'_>) -> bool {
        active.is_none_or(|links| links.iter().any(|l| l == body.link))
    }

    /// Report one overlap.  Returns true once the result is saturated.
    fn report(
        &self,
        req: &CollisionRequest,
        res: &mut CollisionResult,
        acm: Option<&AllowedCollisionMatrix>,
        contact: Contact,
        region: Aabb,
    ) -> bool {
        let allowed = acm
            .and_then(|m| m.allowed_collision(&contact.body_name_1, &contact.body_name_2))
            .is_some_and(|v| v.allows(&contact));
        if allowed {
            if req.verbose {
                debug!(
                    first = %contact.body_name_1,
                    second = %contact.body_name_2,
                    "Collision allowed by the allowed-collision matrix"
                );
            }
            return false;
        }
        if req.verbose {
            debug!(
                first = %contact.body_name_1,
                second = %contact.body_name_2,
                depth = contact.depth,
                "Found collision"
            );
        }
        res.distance = res.distance.min(0.0);
        res.add_contact(req, contact);
        if req.cost {
            res.add_cost_source(req, CostSource::new(region));
        }
        res.is_saturated(req)
    }
}

fn contact(first: &RobotBody<'_>, name_2: &str, type_2: BodyType, overlap: &Overlap) -> Contact {
    Contact {
        pos: overlap.region.centre(),
        normal: overlap.normal,
        depth: overlap.depth,
        body_name_1: first.name.to_string(),
        body_type_1: first.kind,
        body_name_2: name_2.to_string(),
        body_type_2: type_2,
    }
}

/// True when the pair can never be a meaningful collision.
fn skip_self_pair(a: &RobotBody<'_>, b: &RobotBody<'_>) -> bool {
    match (a.attached, b.attached) {
        (None, None) => a.name == b.name,
        (Some(body), None) => body.may_touch(b.link),
        (None, Some(body)) => body.may_touch(a.link),
        (Some(x), Some(y)) => x.id == y.id || x.link == y.link,
    }
}

impl CollisionEnv for BoundingVolumeEnv {
    fn robot_model(&self) -> &Arc<RobotModel> {
        &self.model
    }

    fn margins(&self) -> &LinkMargins {
        &self.margins
    }

    fn margins_mut(&mut self) -> &mut LinkMargins {
        &mut self.margins
    }

    fn check_robot_collision(
        &self,
        req: &CollisionRequest,
        res: &mut CollisionResult,
        state: &RobotState,
        world: &World,
        acm: Option<&AllowedCollisionMatrix>,
    ) {
        let active = self.active_links(req);
        let bodies = self.robot_bodies(state);
        for body in bodies.iter().filter(|b| Self::in_group(active, b)) {
            for obj in world.objects() {
                let poses = obj.global_shape_poses();
                for (shape, pose) in obj.shapes.iter().zip(&poses) {
                    let Some(volume) = Volume::of(shape, pose) else {
                        continue;
                    };
                    let found = overlaps(&body.aabb, &volume);
                    if found.is_empty() {
                        if req.distance {
                            res.distance = res.distance.min(distance(&body.aabb, &volume));
                        }
                        continue;
                    }
                    for overlap in found {
                        let c = contact(body, &obj.id, BodyType::WorldObject, &overlap);
                        if self.report(req, res, acm, c, overlap.region) {
                            return;
                        }
                    }
                }
            }
        }
    }

    fn check_self_collision(
        &self,
        req: &CollisionRequest,
        res: &mut CollisionResult,
        state: &RobotState,
        acm: Option<&AllowedCollisionMatrix>,
    ) {
        let active = self.active_links(req);
        let bodies = self.robot_bodies(state);
        for (i, a) in bodies.iter().enumerate() {
            for b in &bodies[i + 1..] {
                if skip_self_pair(a, b) {
                    continue;
                }
                if !Self::in_group(active, a) && !Self::in_group(active, b) {
                    continue;
                }
                match box_overlap(&a.aabb, &b.aabb) {
                    Some(overlap) => {
                        let c = contact(a, b.name, b.kind, &overlap);
                        if self.report(req, res, acm, c, overlap.region) {
                            return;
                        }
                    }
                    None if req.distance => {
                        res.distance = res.distance.min(box_distance(&a.aabb, &b.aabb));
                    }
                    None => {}
                }
            }
        }
    }

    fn box_clone(&self) -> Box<dyn CollisionEnv> {
        Box::new(self.clone())
    }
}
