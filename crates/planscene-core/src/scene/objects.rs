//! World-object and octomap message processing.
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `Add` | replace any object with the id by the message geometry |
//! | `Append` | add the message geometry to the object (creating it) |
//! | `Remove` | remove the object, or every object when the id is empty |
//! | `Move` | re-pose the object and optionally each of its shapes |
//!
//! The reserved id [`OCTOMAP_NS`] is only reachable through the octomap
//! entry points.

use std::collections::BTreeMap;
use std::sync::Arc;

use planscene_geometry::shapes::shapes_of;
use planscene_geometry::{OcTree, Shape};
use planscene_types::{
    CollisionObject, Header, OCTOMAP_NS, OctomapMsg, OctomapWithPose, Operation, Pose, PoseMsg, SceneError,
};
use tracing::{debug, error, warn};

use super::Scene;

/// Object pose, shapes and shape poses decoded from a message, all relative
/// to the message header frame.
pub(super) struct DecodedShapes {
    pub pose: Pose,
    pub shapes: Vec<Arc<Shape>>,
    pub shape_poses: Vec<Pose>,
}

/// Subframes of a collision object message.
pub(super) fn subframes_of(obj: &CollisionObject) -> BTreeMap<String, Pose> {
    obj.subframe_names
        .iter()
        .zip(&obj.subframe_poses)
        .map(|(name, pose)| (name.clone(), pose.to_isometry()))
        .collect()
}

fn same_pose(a: &Pose, b: &Pose) -> bool {
    let eps = f64::EPSILON * 100.0;
    (a.translation.vector - b.translation.vector).norm() <= eps && a.rotation.angle_to(&b.rotation) <= eps
}

impl Scene {
    /// Decode the shapes of `obj`.  Missing shape poses default to identity.
    /// A single shape with an empty object pose takes its shape pose as the
    /// object pose.
    pub(super) fn decode_shapes(&self, obj: &CollisionObject) -> Result<DecodedShapes, SceneError> {
        for (kind, shapes, poses) in [
            ("primitive", obj.primitives.len(), obj.primitive_poses.len()),
            ("mesh", obj.meshes.len(), obj.mesh_poses.len()),
            ("plane", obj.planes.len(), obj.plane_poses.len()),
        ] {
            if poses > shapes {
                error!(parent: &self.span, object = %obj.id, kind, "More shape poses than shapes in collision object");
                return Err(SceneError::TooManyShapePoses {
                    id: obj.id.clone(),
                    kind,
                });
            }
        }

        let entries = shapes_of(obj);
        let mut pose = obj.pose.to_isometry();
        let mut shapes = Vec::with_capacity(entries.len());
        let mut shape_poses = Vec::with_capacity(entries.len());
        for (msg, shape_pose) in entries {
            let shape = Shape::from_msg(&msg).inspect_err(|e| {
                error!(parent: &self.span, object = %obj.id, error = %e, "Unable to construct shape");
            })?;
            shapes.push(Arc::new(shape));
            shape_poses.push(shape_pose.unwrap_or_default().to_isometry());
        }
        if shapes.len() == 1 && obj.pose.is_empty() {
            pose = shape_poses[0];
            shape_poses[0] = Pose::identity();
        }
        Ok(DecodedShapes {
            pose,
            shapes,
            shape_poses,
        })
    }

    /// Apply one collision-object message to the world.
    pub fn process_collision_object_msg(&mut self, obj: &CollisionObject) -> Result<(), SceneError> {
        if obj.id == OCTOMAP_NS {
            error!(parent: &self.span, object = %obj.id, "The ID cannot be used for collision objects (name reserved)");
            return Err(SceneError::ReservedId(obj.id.clone()));
        }
        match obj.operation {
            Operation::Add | Operation::Append => self.process_collision_object_add(obj),
            Operation::Remove => self.process_collision_object_remove(obj),
            Operation::Move => self.process_collision_object_move(obj),
            Operation::Unknown => {
                error!(parent: &self.span, object = %obj.id, "Unknown collision object operation");
                Err(SceneError::Unsupported(format!("unknown operation on object '{}'", obj.id)))
            }
        }
    }

    fn process_collision_object_add(&mut self, obj: &CollisionObject) -> Result<(), SceneError> {
        let frame = obj.header.frame_id.as_str();
        let Ok(world_to_header) = self.try_frame_transform(frame) else {
            error!(parent: &self.span, object = %obj.id, frame = %frame, "Unknown frame");
            return Err(SceneError::UnknownFrame(frame.to_string()));
        };
        if !obj.has_geometry() {
            error!(parent: &self.span, object = %obj.id, "There are no shapes specified in the collision object message");
            return Err(SceneError::NoGeometry(obj.id.clone()));
        }
        let decoded = self.decode_shapes(obj)?;

        if obj.operation == Operation::Add && self.world().has_object(&obj.id) {
            self.world_mut().remove_object(&obj.id);
        }
        self.world_mut().add_to_object(
            &obj.id,
            world_to_header * decoded.pose,
            decoded.shapes,
            decoded.shape_poses,
        );
        if !obj.object_type.is_empty() {
            self.set_object_type(&obj.id, obj.object_type.clone());
        }
        self.world_mut().set_subframes_of_object(&obj.id, subframes_of(obj));
        Ok(())
    }

    fn process_collision_object_remove(&mut self, obj: &CollisionObject) -> Result<(), SceneError> {
        if obj.id.is_empty() {
            self.remove_all_collision_objects();
            return Ok(());
        }
        if !self.world_mut().remove_object(&obj.id) {
            warn!(parent: &self.span, object = %obj.id, "Tried to remove world object, but it does not exist in this scene");
            return Err(SceneError::ObjectNotFound(obj.id.clone()));
        }
        self.forget_object(&obj.id);
        Ok(())
    }

    fn process_collision_object_move(&mut self, obj: &CollisionObject) -> Result<(), SceneError> {
        let Some(shape_count) = self.world().object(&obj.id).map(|o| o.shapes.len()) else {
            error!(parent: &self.span, object = %obj.id, "World object not found for moving");
            return Err(SceneError::ObjectNotFound(obj.id.clone()));
        };
        if obj.has_geometry() {
            warn!(parent: &self.span, object = %obj.id, "Move operation ignores the geometry in the message");
        }
        let given = obj.shape_pose_count();
        if given > 0 && given != shape_count {
            error!(
                parent: &self.span,
                object = %obj.id,
                expected = shape_count,
                given,
                "Number of supplied shape poses does not match existing shapes"
            );
            return Err(SceneError::ShapePoseCountMismatch {
                id: obj.id.clone(),
                expected: shape_count,
                given,
            });
        }
        let frame = obj.header.frame_id.as_str();
        let world_to_header = self.try_frame_transform(frame).inspect_err(|_| {
            error!(parent: &self.span, object = %obj.id, frame = %frame, "Unknown frame");
        })?;

        self.world_mut()
            .set_object_pose(&obj.id, world_to_header * obj.pose.to_isometry());
        if given > 0 {
            let poses: Vec<Pose> = obj
                .primitive_poses
                .iter()
                .chain(&obj.mesh_poses)
                .chain(&obj.plane_poses)
                .map(PoseMsg::to_isometry)
                .collect();
            self.world_mut().move_shapes_in_object(&obj.id, &poses);
        }
        Ok(())
    }

    /// Remove every world object except the octomap, with its color, type
    /// and collision-matrix entry.
    pub fn remove_all_collision_objects(&mut self) {
        let ids = self.world().object_ids();
        for id in ids {
            if id == OCTOMAP_NS {
                continue;
            }
            self.world_mut().remove_object(&id);
            self.forget_object(&id);
        }
    }

    /// Drop the color, type and collision-matrix entries of a removed object.
    /// The matrix is only written when it mentions `id`.
    fn forget_object(&mut self, id: &str) {
        self.remove_object_color(id);
        self.remove_object_type(id);
        if self.allowed_collision_matrix().has_entry(id) {
            self.allowed_collision_matrix_mut().remove_entry(id);
        }
    }

    // ── Octomap ─────────────────────────────────────────────────────────────

    /// Replace the octomap.  Empty data clears it.
    pub fn process_octomap_msg(&mut self, map: &OctomapWithPose) -> Result<(), SceneError> {
        self.world_mut().remove_object(OCTOMAP_NS);
        if map.octomap.data.is_empty() {
            return Ok(());
        }
        let tree = self.decode_octomap(&map.octomap)?;
        let pose = self.header_pose(&map.header) * map.origin.to_isometry();
        self.add_octomap(tree, pose);
        Ok(())
    }

    /// Replace the octomap with a bare map placed at its header frame.
    pub fn process_octomap(&mut self, map: &OctomapMsg) -> Result<(), SceneError> {
        self.world_mut().remove_object(OCTOMAP_NS);
        if map.data.is_empty() {
            return Ok(());
        }
        let tree = self.decode_octomap(map)?;
        let pose = self.header_pose(&map.header);
        self.add_octomap(tree, pose);
        Ok(())
    }

    /// Install an already decoded octree at `pose`.
    ///
    /// Passing the tree that is already installed does not rebuild anything:
    /// at the same pose only a replacement is recorded in the world diff, at
    /// a new pose the shape is moved.
    pub fn process_octomap_tree(&mut self, tree: Arc<OcTree>, pose: Pose) {
        let current = self.world().object(OCTOMAP_NS).and_then(|obj| match obj.shapes.as_slice() {
            [shape] => match shape.as_ref() {
                Shape::OcTree(t) if Arc::ptr_eq(t, &tree) => Some((Arc::clone(shape), obj.shape_poses[0])),
                _ => None,
            },
            _ => None,
        });
        if let Some((shape, current_pose)) = current {
            if same_pose(&current_pose, &pose) {
                if let Some(diff) = self.world_mut().diff_mut() {
                    diff.set(
                        OCTOMAP_NS,
                        planscene_collision::Action::DESTROY
                            | planscene_collision::Action::CREATE
                            | planscene_collision::Action::ADD_SHAPE,
                    );
                }
            } else {
                self.world_mut().move_shape_in_object(OCTOMAP_NS, &shape, pose);
            }
            return;
        }
        self.world_mut().remove_object(OCTOMAP_NS);
        self.add_octomap(tree, pose);
    }

    fn decode_octomap(&self, map: &OctomapMsg) -> Result<Arc<OcTree>, SceneError> {
        OcTree::from_msg(map).map(Arc::new).inspect_err(|e| {
            error!(parent: &self.span, error = %e, "Unable to decode octomap");
        })
    }

    fn header_pose(&self, header: &Header) -> Pose {
        if header.frame_id.is_empty() {
            Pose::identity()
        } else {
            self.frame_transform(&header.frame_id)
        }
    }

    fn add_octomap(&mut self, tree: Arc<OcTree>, pose: Pose) {
        debug!(parent: &self.span, cells = tree.len(), "Installing octomap");
        self.world_mut().add_to_object(
            OCTOMAP_NS,
            Pose::identity(),
            vec![Arc::new(Shape::OcTree(tree))],
            vec![pose],
        );
    }

    /// The installed octomap, origin in the planning frame.
    pub fn octomap_msg(&self) -> Option<OctomapWithPose> {
        let world = self.world();
        let obj = world.object(OCTOMAP_NS)?;
        match (obj.shapes.as_slice(), obj.shape_poses.as_slice()) {
            ([shape], [pose]) => match shape.as_ref() {
                Shape::OcTree(tree) => {
                    let mut octomap = tree.to_msg(false);
                    octomap.header = Header::new(self.planning_frame());
                    Some(OctomapWithPose {
                        header: Header::new(self.planning_frame()),
                        origin: PoseMsg::from_isometry(&(obj.pose * pose)),
                        octomap,
                    })
                }
                _ => {
                    error!(parent: &self.span, "Octomap object does not hold an octree");
                    None
                }
            },
            _ => {
                error!(parent: &self.span, shapes = obj.shapes.len(), "Unexpected number of shapes in octomap collision object");
                None
            }
        }
    }

    // ── Message getters ─────────────────────────────────────────────────────

    /// World object `id` as an `Add` message in the planning frame.
    pub fn collision_object_msg(&self, id: &str) -> Option<CollisionObject> {
        let world = self.world();
        let obj = world.object(id)?;
        let mut msg = CollisionObject::new(id, Operation::Add);
        msg.header = Header::new(self.planning_frame());
        msg.pose = PoseMsg::from_isometry(&obj.pose);
        for (shape, pose) in obj.shapes.iter().zip(&obj.shape_poses) {
            if let Some(shape_msg) = shape.to_msg() {
                shape_msg.append_to(&mut msg, PoseMsg::from_isometry(pose));
            }
        }
        if msg.has_geometry() {
            if let Some(t) = self.object_type(id) {
                msg.object_type = t;
            }
        }
        for (name, pose) in &obj.subframes {
            msg.subframe_names.push(name.clone());
            msg.subframe_poses.push(PoseMsg::from_isometry(pose));
        }
        Some(msg)
    }

    /// Every world object except the octomap.
    pub fn collision_object_msgs(&self) -> Vec<CollisionObject> {
        self.world()
            .object_ids()
            .iter()
            .filter(|id| id.as_str() != OCTOMAP_NS)
            .filter_map(|id| self.collision_object_msg(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use planscene_robot::RobotModelBuilder;
    use planscene_types::{ObjectType, SolidPrimitive};

    fn scene() -> Scene {
        Scene::new(Arc::new(RobotModelBuilder::new("bot", "base").build().unwrap()))
    }

    fn boxes(id: &str, op: Operation, offsets: &[f64]) -> CollisionObject {
        let mut obj = CollisionObject::new(id, op);
        obj.header = Header::new("base");
        for x in offsets {
            obj.primitives.push(SolidPrimitive::cuboid(0.1, 0.1, 0.1));
            obj.primitive_poses.push(PoseMsg::from_translation(*x, 0.0, 0.0));
        }
        obj
    }

    fn octomap(points: &[[f64; 3]]) -> OctomapWithPose {
        let tree = OcTree::from_cells(0.1, points.iter().map(|p| Point3::new(p[0], p[1], p[2])));
        OctomapWithPose {
            header: Header::new("base"),
            origin: PoseMsg::identity(),
            octomap: tree.to_msg(true),
        }
    }

    // ── Add / Append ────────────────────────────────────────────────────────

    #[test]
    fn single_shape_pose_becomes_object_pose() {
        let mut s = scene();
        s.process_collision_object_msg(&boxes("box1", Operation::Add, &[0.5])).unwrap();
        let obj = s.world().object("box1").cloned().unwrap();
        assert_relative_eq!(obj.pose.translation.vector.x, 0.5);
        assert_eq!(obj.shape_poses[0], Pose::identity());
    }

    #[test]
    fn add_replaces_and_append_extends() {
        let mut s = scene();
        s.process_collision_object_msg(&boxes("box1", Operation::Add, &[0.0, 1.0])).unwrap();
        s.process_collision_object_msg(&boxes("box1", Operation::Add, &[0.0, 1.0])).unwrap();
        assert_eq!(s.world().object("box1").unwrap().shapes.len(), 2);

        let mut more = boxes("box1", Operation::Append, &[2.0]);
        more.pose = PoseMsg::identity();
        s.process_collision_object_msg(&more).unwrap();
        assert_eq!(s.world().object("box1").unwrap().shapes.len(), 3);
    }

    #[test]
    fn add_records_type_and_subframes() {
        let mut s = scene();
        let mut obj = boxes("box1", Operation::Add, &[0.5]);
        obj.object_type = ObjectType::new("crate", "warehouse");
        obj.subframe_names.push("lid".into());
        obj.subframe_poses.push(PoseMsg::from_translation(0.0, 0.0, 0.05));
        s.process_collision_object_msg(&obj).unwrap();

        assert_eq!(s.object_type("box1"), Some(ObjectType::new("crate", "warehouse")));
        assert_relative_eq!(s.frame_transform("box1/lid").translation.vector.z, 0.05);
    }

    #[test]
    fn add_rejections() {
        let mut s = scene();
        let mut obj = boxes("box1", Operation::Add, &[0.0]);
        obj.header = Header::new("mars");
        assert!(matches!(s.process_collision_object_msg(&obj), Err(SceneError::UnknownFrame(_))));

        let obj = boxes("box1", Operation::Add, &[]);
        assert!(matches!(s.process_collision_object_msg(&obj), Err(SceneError::NoGeometry(_))));

        let mut obj = boxes("box1", Operation::Add, &[0.0]);
        obj.primitive_poses.push(PoseMsg::identity());
        assert!(matches!(
            s.process_collision_object_msg(&obj),
            Err(SceneError::TooManyShapePoses { kind: "primitive", .. })
        ));

        let obj = boxes(OCTOMAP_NS, Operation::Add, &[0.0]);
        assert!(matches!(s.process_collision_object_msg(&obj), Err(SceneError::ReservedId(_))));

        let obj = boxes("box1", Operation::Unknown, &[0.0]);
        assert!(matches!(s.process_collision_object_msg(&obj), Err(SceneError::Unsupported(_))));
        assert!(s.world().is_empty());
    }

    // ── Remove ──────────────────────────────────────────────────────────────

    #[test]
    fn remove_one_and_all() {
        let mut s = scene();
        for id in ["a", "b"] {
            s.process_collision_object_msg(&boxes(id, Operation::Add, &[0.0])).unwrap();
            s.set_object_color(id, planscene_types::ColorRgba::new(1.0, 1.0, 1.0, 1.0));
            s.allowed_collision_matrix_mut().set_entry(id, "base", true);
        }
        s.process_octomap_msg(&octomap(&[[1.0, 1.0, 1.0]])).unwrap();

        s.process_collision_object_msg(&CollisionObject::new("a", Operation::Remove)).unwrap();
        assert!(!s.world().has_object("a"));
        assert!(!s.has_object_color("a"));
        assert!(!s.allowed_collision_matrix().has_entry("a"));

        assert!(matches!(
            s.process_collision_object_msg(&CollisionObject::new("a", Operation::Remove)),
            Err(SceneError::ObjectNotFound(_))
        ));

        s.process_collision_object_msg(&CollisionObject::new("", Operation::Remove)).unwrap();
        assert_eq!(s.world().object_ids(), vec![OCTOMAP_NS.to_string()]);
        assert!(!s.has_object_color("b"));
    }

    // ── Move ────────────────────────────────────────────────────────────────

    #[test]
    fn move_updates_pose_and_shapes() {
        let mut s = scene();
        s.process_collision_object_msg(&boxes("box1", Operation::Add, &[0.0, 1.0])).unwrap();

        let mut mv = CollisionObject::new("box1", Operation::Move);
        mv.header = Header::new("base");
        mv.pose = PoseMsg::from_translation(0.0, 2.0, 0.0);
        mv.primitive_poses = vec![PoseMsg::from_translation(0.0, 0.0, 0.1), PoseMsg::from_translation(0.0, 0.0, 0.2)];
        s.process_collision_object_msg(&mv).unwrap();

        let obj = s.world().object("box1").cloned().unwrap();
        assert_relative_eq!(obj.pose.translation.vector.y, 2.0);
        assert_relative_eq!(obj.shape_poses[1].translation.vector.z, 0.2);
    }

    #[test]
    fn move_with_wrong_pose_count_changes_nothing() {
        let mut s = scene();
        s.process_collision_object_msg(&boxes("box1", Operation::Add, &[0.0, 1.0])).unwrap();
        let before = s.world().object("box1").unwrap().as_ref().clone();

        let mut mv = CollisionObject::new("box1", Operation::Move);
        mv.header = Header::new("base");
        mv.pose = PoseMsg::from_translation(5.0, 5.0, 5.0);
        mv.primitive_poses = vec![PoseMsg::identity(); 3];
        assert!(matches!(
            s.process_collision_object_msg(&mv),
            Err(SceneError::ShapePoseCountMismatch { expected: 2, given: 3, .. })
        ));
        assert_eq!(s.world().object("box1").unwrap().as_ref(), &before);
    }

    #[test]
    fn move_missing_object() {
        let mut s = scene();
        let mut mv = CollisionObject::new("ghost", Operation::Move);
        mv.header = Header::new("base");
        assert!(matches!(s.process_collision_object_msg(&mv), Err(SceneError::ObjectNotFound(_))));
    }

    // ── Octomap ─────────────────────────────────────────────────────────────

    #[test]
    fn octomap_replaces_previous() {
        let mut s = scene();
        s.process_octomap_msg(&octomap(&[[1.0, 0.0, 0.0], [2.0, 0.0, 0.0]])).unwrap();
        let b = octomap(&[[0.0, 3.0, 0.0]]);
        s.process_octomap_msg(&b).unwrap();

        let obj = s.world().object(OCTOMAP_NS).cloned().unwrap();
        assert_eq!(obj.shapes.len(), 1);
        match obj.shapes[0].as_ref() {
            Shape::OcTree(tree) => assert_eq!(tree.len(), 1),
            other => panic!("unexpected shape {other:?}"),
        }
        assert_eq!(s.octomap_msg().unwrap().octomap.resolution, 0.1);
    }

    #[test]
    fn invalid_octomap_leaves_none() {
        let mut s = scene();
        s.process_octomap_msg(&octomap(&[[1.0, 0.0, 0.0]])).unwrap();
        let mut bad = octomap(&[[1.0, 0.0, 0.0]]);
        bad.octomap.id = "ColorOcTree".into();
        assert!(matches!(s.process_octomap_msg(&bad), Err(SceneError::InvalidOctomap(_))));
        assert!(!s.world().has_object(OCTOMAP_NS));
    }

    #[test]
    fn empty_octomap_clears() {
        let mut s = scene();
        s.process_octomap_msg(&octomap(&[[1.0, 0.0, 0.0]])).unwrap();
        s.process_octomap_msg(&OctomapWithPose::default()).unwrap();
        assert!(s.octomap_msg().is_none());
    }

    #[test]
    fn same_tree_fast_path() {
        let parent = scene();
        let mut child = parent.diff();
        let tree = Arc::new(OcTree::from_cells(0.1, [Point3::new(1.0, 0.0, 0.0)]));

        child.process_octomap_tree(Arc::clone(&tree), Pose::identity());
        child.world_mut().reset_diff();
        child.process_octomap_tree(Arc::clone(&tree), Pose::identity());
        let expected = planscene_collision::Action::DESTROY
            | planscene_collision::Action::CREATE
            | planscene_collision::Action::ADD_SHAPE;
        assert_eq!(child.world_diff().unwrap().get(OCTOMAP_NS), Some(expected));

        child.process_octomap_tree(Arc::clone(&tree), Pose::translation(0.0, 0.0, 1.0));
        let obj = child.world().object(OCTOMAP_NS).cloned().unwrap();
        assert_relative_eq!(obj.shape_poses[0].translation.vector.z, 1.0);
        assert!(matches!(obj.shapes[0].as_ref(), Shape::OcTree(t) if Arc::ptr_eq(t, &tree)));
    }

    // ── Getters ─────────────────────────────────────────────────────────────

    #[test]
    fn collision_object_msg_round_trip() {
        let mut s = scene();
        let mut obj = boxes("box1", Operation::Add, &[0.0, 1.0]);
        obj.pose = PoseMsg::from_translation(0.0, 0.0, 0.5);
        obj.object_type = ObjectType::new("crate", "");
        s.process_collision_object_msg(&obj).unwrap();

        let msg = s.collision_object_msg("box1").unwrap();
        assert_eq!(msg.header.frame_id, "base");
        assert_eq!(msg.primitives.len(), 2);
        assert_eq!(msg.object_type.key, "crate");

        let mut other = scene();
        other.process_collision_object_msg(&msg).unwrap();
        assert_eq!(other.world().object("box1"), s.world().object("box1"));
        assert_eq!(s.collision_object_msgs().len(), 1);
    }
}
