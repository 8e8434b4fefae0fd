//! Scene messages: full snapshots, component-selected snapshots and diffs.
//!
//! A diff message carries only what a child scene changed locally: its
//! materialised state, matrix and transforms, its local colors, and one
//! entry per world object touched since it was derived.  Applying the diff
//! of a child to a copy of its parent reproduces the child.

use planscene_collision::{Action, AllowedCollisionMatrix};
use planscene_geometry::FixedTransforms;
use planscene_geometry::octree::CLEARED_OCTOMAP_ID;
use planscene_robot::RobotState;
use planscene_types::{
    AttachedCollisionObject, CollisionObject, Header, OCTOMAP_NS, ObjectColorMsg, Operation, PlanningSceneMsg,
    PlanningSceneWorld, RobotStateMsg, SceneComponents, SceneError,
};
use tracing::{debug, error, warn};

use super::Scene;

impl Scene {
    // ── Producing messages ──────────────────────────────────────────────────

    fn robot_state_msg(&self, state: &RobotState, copy_attached: bool) -> RobotStateMsg {
        let mut msg = state.to_msg(copy_attached);
        for attached in &mut msg.attached_collision_objects {
            if let Some(t) = self.object_type(&attached.object.id) {
                attached.object.object_type = t;
            }
        }
        msg
    }

    /// Local changes of this scene relative to its parent.
    pub fn planning_scene_diff_msg(&self) -> PlanningSceneMsg {
        let mut msg = PlanningSceneMsg {
            name: self.name.clone(),
            robot_model_name: self.robot_model.name().to_string(),
            is_diff: true,
            ..PlanningSceneMsg::default()
        };

        if let Some(transforms) = self.local_transforms() {
            msg.fixed_frame_transforms = transforms.copy_transforms();
        }
        if let Some(state) = self.local_state() {
            msg.robot_state = self.robot_state_msg(&state, true);
        }
        msg.robot_state.is_diff = true;
        if let Some(acm) = self.local_acm() {
            msg.allowed_collision_matrix = acm.to_msg();
        }

        let env = self.active_collision_env();
        msg.link_padding = env.padding_msg();
        msg.link_scale = env.scale_msg();

        if let Some(colors) = self.local_object_colors() {
            msg.object_colors = colors
                .into_iter()
                .map(|(id, color)| ObjectColorMsg { id, color })
                .collect();
        }

        if let Some(diff) = self.world_diff() {
            let mut octomap_action = None;
            for (id, action) in diff.iter() {
                if id == OCTOMAP_NS {
                    octomap_action = Some(action);
                } else if action == Action::DESTROY {
                    // An object that moved onto the robot is recreated by the
                    // attached entry; a world removal would race with it.
                    let attached_here = msg
                        .robot_state
                        .attached_collision_objects
                        .iter()
                        .any(|a| a.object.id == id && a.object.operation == Operation::Add);
                    if !attached_here {
                        let mut remove = CollisionObject::new(id, Operation::Remove);
                        remove.header = Header::new(self.planning_frame());
                        msg.world.collision_objects.push(remove);
                    }
                } else if let Some(obj) = self.collision_object_msg(id) {
                    msg.world.collision_objects.push(obj);
                }
            }
            match octomap_action {
                Some(action) if action == Action::DESTROY => {
                    msg.world.octomap.octomap.id = CLEARED_OCTOMAP_ID.to_string();
                }
                Some(_) => {
                    if let Some(octomap) = self.octomap_msg() {
                        msg.world.octomap = octomap;
                    }
                }
                None => {}
            }
        }

        if let (Some(parent), Some(state)) = (self.parent_state(), self.local_state()) {
            for body in parent.attached_bodies() {
                if !state.has_attached_body(&body.id) {
                    let mut detach = AttachedCollisionObject {
                        link_name: body.link.clone(),
                        ..AttachedCollisionObject::default()
                    };
                    detach.object.id = body.id.clone();
                    detach.object.operation = Operation::Remove;
                    msg.robot_state.attached_collision_objects.push(detach);
                }
            }
        }
        msg
    }

    /// Everything the scene holds, as seen through its parents.
    pub fn planning_scene_msg(&self) -> PlanningSceneMsg {
        self.planning_scene_msg_components(SceneComponents::all())
    }

    /// A snapshot limited to `components`.
    ///
    /// [`SceneComponents::ROBOT_STATE_ATTACHED_OBJECTS`] implies the robot
    /// state; [`SceneComponents::WORLD_OBJECT_NAMES`] without geometry yields
    /// one id-and-type entry per world object.
    pub fn planning_scene_msg_components(&self, components: SceneComponents) -> PlanningSceneMsg {
        let mut msg = PlanningSceneMsg::default();

        if components.contains(SceneComponents::SCENE_SETTINGS) {
            msg.name = self.name.clone();
            msg.robot_model_name = self.robot_model.name().to_string();
        }
        if components.contains(SceneComponents::TRANSFORMS) {
            msg.fixed_frame_transforms = self.transforms().copy_transforms();
        }
        if components.contains(SceneComponents::ROBOT_STATE_ATTACHED_OBJECTS) {
            msg.robot_state = self.robot_state_msg(&self.current_state(), true);
        } else if components.contains(SceneComponents::ROBOT_STATE) {
            msg.robot_state = self.robot_state_msg(&self.current_state(), false);
        }
        if components.contains(SceneComponents::ALLOWED_COLLISION_MATRIX) {
            msg.allowed_collision_matrix = self.allowed_collision_matrix().to_msg();
        }
        if components.contains(SceneComponents::LINK_PADDING_AND_SCALING) {
            let env = self.active_collision_env();
            msg.link_padding = env.padding_msg();
            msg.link_scale = env.scale_msg();
        }
        if components.contains(SceneComponents::OBJECT_COLORS) {
            msg.object_colors = self.object_color_msgs();
        }

        if components.contains(SceneComponents::WORLD_OBJECT_GEOMETRY) {
            msg.world.collision_objects = self.collision_object_msgs();
        } else if components.contains(SceneComponents::WORLD_OBJECT_NAMES) {
            msg.world.collision_objects = self
                .world()
                .object_ids()
                .into_iter()
                .filter(|id| id != OCTOMAP_NS)
                .map(|id| {
                    let mut obj = CollisionObject::new(id.as_str(), Operation::Add);
                    if let Some(t) = self.object_type(&id) {
                        obj.object_type = t;
                    }
                    obj
                })
                .collect();
        }
        if components.contains(SceneComponents::OCTOMAP) {
            if let Some(octomap) = self.octomap_msg() {
                msg.world.octomap = octomap;
            }
        }
        msg
    }

    // ── Applying messages ───────────────────────────────────────────────────

    /// Apply a full snapshot or a diff, depending on `msg.is_diff`.
    pub fn use_planning_scene_msg(&mut self, msg: &PlanningSceneMsg) -> Result<(), SceneError> {
        if msg.is_diff {
            self.set_planning_scene_diff_msg(msg)
        } else {
            self.set_planning_scene_msg(msg)
        }
    }

    /// Apply the parts of `msg` that are present.  Every part is attempted;
    /// failures are returned together.
    pub fn set_planning_scene_diff_msg(&mut self, msg: &PlanningSceneMsg) -> Result<(), SceneError> {
        debug!(parent: &self.span, name = %msg.name, "Applying planning scene diff");
        if !msg.name.is_empty() {
            self.set_name(msg.name.clone());
        }
        self.warn_on_model_mismatch(msg);

        let mut results = Vec::new();
        if !msg.fixed_frame_transforms.is_empty() {
            results.push(self.transforms_mut().set_transforms(&msg.fixed_frame_transforms));
        }

        let state = &msg.robot_state;
        if !state.joint_state.name.is_empty() || !state.attached_collision_objects.is_empty() {
            results.push(self.set_current_state_msg(state));
        }

        if !msg.allowed_collision_matrix.entry_names.is_empty() {
            self.set_allowed_collision_matrix(AllowedCollisionMatrix::from_msg(&msg.allowed_collision_matrix));
        }

        if !msg.link_padding.is_empty() || !msg.link_scale.is_empty() {
            let mut env = self.collision_env_mut();
            env.set_padding_msg(&msg.link_padding);
            env.set_scale_msg(&msg.link_scale);
        }

        for c in &msg.object_colors {
            self.set_object_color(&c.id, c.color);
        }

        for obj in &msg.world.collision_objects {
            results.push(self.process_collision_object_msg(obj));
        }

        if !msg.world.octomap.octomap.id.is_empty() {
            results.push(self.process_octomap_msg(&msg.world.octomap));
        }
        SceneError::collect(results)
    }

    /// Replace the whole scene with the snapshot `msg`.  A child scene is
    /// decoupled from its parent first.
    pub fn set_planning_scene_msg(&mut self, msg: &PlanningSceneMsg) -> Result<(), SceneError> {
        debug!(parent: &self.span, name = %msg.name, "Setting new planning scene");
        self.set_name(msg.name.clone());
        self.warn_on_model_mismatch(msg);
        self.decouple_parent();

        self.reset_object_metadata();

        let mut results = Vec::new();
        let mut transforms = FixedTransforms::new(self.planning_frame());
        results.push(transforms.set_transforms(&msg.fixed_frame_transforms));
        *self.transforms_mut() = transforms;

        results.push(self.set_current_state_msg(&msg.robot_state));
        self.set_allowed_collision_matrix(AllowedCollisionMatrix::from_msg(&msg.allowed_collision_matrix));

        {
            let mut env = self.collision_env_mut();
            env.set_padding_msg(&msg.link_padding);
            env.set_scale_msg(&msg.link_scale);
        }

        for c in &msg.object_colors {
            self.set_object_color(&c.id, c.color);
        }

        self.world_mut().clear_objects();
        results.push(self.process_planning_scene_world_msg(&msg.world));
        SceneError::collect(results)
    }

    /// Process every collision object, then the octomap.
    pub fn process_planning_scene_world_msg(&mut self, world: &PlanningSceneWorld) -> Result<(), SceneError> {
        let mut results: Vec<_> = world
            .collision_objects
            .iter()
            .map(|obj| self.process_collision_object_msg(obj))
            .collect();
        results.push(self.process_octomap_msg(&world.octomap));
        SceneError::collect(results)
    }

    /// Set joint values and process attached objects.
    ///
    /// A message that is not a diff describes the complete set of attached
    /// bodies: existing ones are cleared and only `Add` entries are honoured.
    pub fn set_current_state_msg(&mut self, msg: &RobotStateMsg) -> Result<(), SceneError> {
        {
            let mut state = self.current_state_mut();
            state.set_joint_state(&msg.joint_state);
            if !msg.is_diff {
                state.clear_attached_bodies();
            }
            state.update();
        }

        let mut results = Vec::new();
        for attached in &msg.attached_collision_objects {
            if !msg.is_diff && attached.object.operation != Operation::Add {
                error!(
                    parent: &self.span,
                    object = %attached.object.id,
                    "The robot state is not a diff; only additions of attached objects are supported. Object is ignored"
                );
                continue;
            }
            results.push(self.process_attached_collision_object_msg(attached));
        }
        SceneError::collect(results)
    }

    /// A copy of the current state with the joint values of `msg` applied.
    pub fn current_state_updated(&self, msg: &RobotStateMsg) -> RobotState {
        let mut state = self.current_state().clone();
        state.set_joint_state(&msg.joint_state);
        state.update();
        state
    }

    fn warn_on_model_mismatch(&self, msg: &PlanningSceneMsg) {
        if !msg.robot_model_name.is_empty() && msg.robot_model_name != self.robot_model.name() {
            warn!(
                parent: &self.span,
                message_model = %msg.robot_model_name,
                scene_model = %self.robot_model.name(),
                "Setting the scene for a different robot model"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use planscene_geometry::OcTree;
    use planscene_robot::model::{Joint, RobotModelBuilder};
    use planscene_types::{
        ColorRgba, JointStateMsg, ObjectType, OctomapWithPose, Pose, PoseMsg, SolidPrimitive, TransformStamped,
    };
    use std::sync::Arc;

    fn scene() -> Scene {
        let model = RobotModelBuilder::new("bot", "base")
            .link(
                "hand",
                "base",
                Joint::prismatic("lift", [0.0, 0.0, 1.0]).with_limits(0.0, 2.0),
            )
            .build()
            .unwrap();
        Scene::new(Arc::new(model))
    }

    fn add_box(s: &mut Scene, id: &str, x: f64) {
        let mut obj = CollisionObject::new(id, Operation::Add);
        obj.header = Header::new("base");
        obj.primitives.push(SolidPrimitive::cuboid(0.1, 0.1, 0.1));
        obj.primitive_poses.push(PoseMsg::from_translation(x, 0.0, 0.0));
        s.process_collision_object_msg(&obj).unwrap();
    }

    fn octomap() -> OctomapWithPose {
        let tree = OcTree::from_cells(0.1, [Point3::new(1.0, 0.0, 0.0)]);
        OctomapWithPose {
            header: Header::new("base"),
            origin: PoseMsg::identity(),
            octomap: tree.to_msg(true),
        }
    }

    fn world_ops(msg: &PlanningSceneMsg) -> Vec<(String, Operation)> {
        msg.world
            .collision_objects
            .iter()
            .map(|o| (o.id.clone(), o.operation))
            .collect()
    }

    // ── Diff messages ───────────────────────────────────────────────────────

    #[test]
    fn diff_msg_lists_only_local_changes() {
        let mut parent = scene();
        add_box(&mut parent, "old", 1.0);
        add_box(&mut parent, "kept", 2.0);

        let mut child = parent.diff();
        child.process_collision_object_msg(&CollisionObject::new("old", Operation::Remove))
            .unwrap();
        add_box(&mut child, "new", 3.0);

        let msg = child.planning_scene_diff_msg();
        assert!(msg.is_diff);
        assert!(msg.robot_state.is_diff);
        assert!(msg.robot_state.joint_state.name.is_empty());
        assert!(msg.allowed_collision_matrix.entry_names.is_empty());
        assert!(msg.fixed_frame_transforms.is_empty());
        assert!(msg.object_colors.is_empty());
        let ops = world_ops(&msg);
        assert_eq!(ops.len(), 2);
        assert!(ops.contains(&("old".to_string(), Operation::Remove)));
        assert!(ops.contains(&("new".to_string(), Operation::Add)));
    }

    #[test]
    fn diff_msg_of_attach_omits_world_removal() {
        let mut parent = scene();
        add_box(&mut parent, "part", 0.5);

        let mut child = parent.diff();
        child
            .process_attached_collision_object_msg(&AttachedCollisionObject {
                link_name: "hand".into(),
                object: CollisionObject::new("part", Operation::Add),
                ..AttachedCollisionObject::default()
            })
            .unwrap();

        let msg = child.planning_scene_diff_msg();
        assert!(msg.world.collision_objects.is_empty());
        assert_eq!(msg.robot_state.attached_collision_objects.len(), 1);
        assert_eq!(msg.robot_state.attached_collision_objects[0].object.operation, Operation::Add);

        let mut replica = parent.clone_scene();
        replica.set_planning_scene_diff_msg(&msg).unwrap();
        assert!(!replica.world().has_object("part"));
        assert!(replica.current_state().has_attached_body("part"));
    }

    #[test]
    fn diff_msg_of_detach_lists_removal() {
        let mut parent = scene();
        add_box(&mut parent, "part", 0.5);
        parent.process_attached_collision_object_msg(&AttachedCollisionObject {
            link_name: "hand".into(),
            object: CollisionObject::new("part", Operation::Add),
            ..AttachedCollisionObject::default()
        })
        .unwrap();

        let mut child = parent.diff();
        let mut detach = AttachedCollisionObject::default();
        detach.object.id = "part".into();
        detach.object.operation = Operation::Remove;
        child.process_attached_collision_object_msg(&detach).unwrap();

        let msg = child.planning_scene_diff_msg();
        let removals: Vec<_> = msg
            .robot_state
            .attached_collision_objects
            .iter()
            .filter(|a| a.object.operation == Operation::Remove)
            .collect();
        assert_eq!(removals.len(), 1);
        assert_eq!(removals[0].link_name, "hand");

        let mut replica = parent.clone_scene();
        replica.set_planning_scene_diff_msg(&msg).unwrap();
        assert!(!replica.current_state().has_attached_body("part"));
        assert!(replica.world().has_object("part"));
    }

    #[test]
    fn diff_msg_reports_cleared_octomap() {
        let mut parent = scene();
        parent.process_octomap_msg(&octomap()).unwrap();

        let mut child = parent.diff();
        child.process_octomap_msg(&OctomapWithPose::default()).unwrap();
        let msg = child.planning_scene_diff_msg();
        assert_eq!(msg.world.octomap.octomap.id, CLEARED_OCTOMAP_ID);

        let mut replica = parent.clone_scene();
        assert!(replica.octomap_msg().is_some());
        replica.set_planning_scene_diff_msg(&msg).unwrap();
        assert!(replica.octomap_msg().is_none());
    }

    #[test]
    fn diff_msg_carries_local_colors_and_state() {
        let parent = scene();
        let mut child = parent.diff();
        child.set_object_color("ghost", ColorRgba::new(0.0, 1.0, 0.0, 1.0));
        child.current_state_mut().set_variable_position("lift", 1.5);

        let msg = child.planning_scene_diff_msg();
        assert_eq!(msg.object_colors.len(), 1);
        assert_eq!(msg.robot_state.joint_state.name, ["lift"]);

        let mut replica = parent.clone_scene();
        replica.set_planning_scene_diff_msg(&msg).unwrap();
        assert_eq!(replica.current_state().variable_position("lift"), Some(1.5));
        assert!(replica.has_object_color("ghost"));
    }

    #[test]
    fn diff_msg_applies_to_live_parent() {
        let mut parent = scene();
        let mut child = parent.diff();
        add_box(&mut child, "crate", 1.0);
        child.current_state_mut().set_variable_position("lift", 0.3);

        let msg = child.planning_scene_diff_msg();
        parent.set_planning_scene_diff_msg(&msg).unwrap();
        assert!(parent.world().has_object("crate"));
        assert_eq!(parent.current_state().variable_position("lift"), Some(0.3));

        child.clear_diffs();
        assert!(child.planning_scene_diff_msg().world.collision_objects.is_empty());
        assert!(child.world().has_object("crate"));
    }

    #[test]
    fn diff_application_is_best_effort() {
        let mut s = scene();
        let mut bad = CollisionObject::new("floating", Operation::Add);
        bad.header = Header::new("nowhere");
        bad.primitives.push(SolidPrimitive::sphere(0.1));
        let mut good = CollisionObject::new("grounded", Operation::Add);
        good.header = Header::new("base");
        good.primitives.push(SolidPrimitive::sphere(0.1));

        let msg = PlanningSceneMsg {
            is_diff: true,
            world: PlanningSceneWorld {
                collision_objects: vec![bad, good],
                ..PlanningSceneWorld::default()
            },
            ..PlanningSceneMsg::default()
        };
        match s.set_planning_scene_diff_msg(&msg) {
            Err(SceneError::Batch(errors)) => {
                assert_eq!(errors.len(), 1);
                assert!(matches!(errors[0], SceneError::UnknownFrame(_)));
            }
            other => panic!("expected a batch error, got {other:?}"),
        }
        assert!(s.world().has_object("grounded"));
        assert!(!s.world().has_object("floating"));
    }

    // ── Full messages ───────────────────────────────────────────────────────

    #[test]
    fn full_msg_round_trip() {
        let mut src = scene();
        src.set_name("kitchen");
        add_box(&mut src, "table", 1.0);
        src.set_object_color("table", ColorRgba::new(0.5, 0.5, 0.5, 1.0));
        src.set_object_type("table", ObjectType::new("table", "furniture"));
        src.current_state_mut().set_variable_position("lift", 0.7);
        src.transforms_mut().set_transform("camera", Pose::translation(0.0, 0.0, 2.0));
        src.collision_env_mut().set_link_padding("hand", 0.02);
        src.process_octomap_msg(&octomap()).unwrap();

        let msg = src.planning_scene_msg();
        assert!(!msg.is_diff);

        let mut dst = scene();
        add_box(&mut dst, "stale", 5.0);
        dst.set_planning_scene_msg(&msg).unwrap();

        assert_eq!(dst.name(), "kitchen");
        assert_eq!(dst.world().object_ids(), src.world().object_ids());
        assert_eq!(dst.object_type("table").unwrap().db, "furniture");
        assert_eq!(dst.object_color("table"), src.object_color("table"));
        assert_eq!(dst.current_state().variable_position("lift"), Some(0.7));
        assert_relative_eq!(dst.frame_transform("camera").translation.vector.z, 2.0);
        assert_relative_eq!(dst.active_collision_env().link_padding("hand"), 0.02);
        assert!(dst.octomap_msg().is_some());
    }

    #[test]
    fn full_msg_decouples_child() {
        let parent = scene();
        let mut child = parent.diff();
        let mut msg = parent.planning_scene_msg();
        msg.name = "snapshot".into();
        child.set_planning_scene_msg(&msg).unwrap();
        assert!(!child.is_diff());
        assert_eq!(child.name(), "snapshot");
    }

    #[test]
    fn use_msg_dispatches_on_diff_flag() {
        let mut s = scene();
        add_box(&mut s, "table", 1.0);
        let mut diff = PlanningSceneMsg {
            is_diff: true,
            ..PlanningSceneMsg::default()
        };
        diff.fixed_frame_transforms.push(TransformStamped {
            header: Header::new("base"),
            child_frame_id: "camera".into(),
            transform: PoseMsg::from_translation(0.0, 0.0, 1.0),
        });
        s.use_planning_scene_msg(&diff).unwrap();
        assert!(s.world().has_object("table"));
        assert!(s.knows_frame_transform("camera"));

        s.use_planning_scene_msg(&PlanningSceneMsg::default()).unwrap();
        assert!(!s.world().has_object("table"));
        assert!(!s.knows_frame_transform("camera"));
    }

    #[test]
    fn component_selection() {
        let mut s = scene();
        add_box(&mut s, "table", 1.0);
        s.set_object_type("table", ObjectType::new("table", "furniture"));
        s.process_octomap_msg(&octomap()).unwrap();

        let names = s.planning_scene_msg_components(SceneComponents::WORLD_OBJECT_NAMES);
        assert_eq!(names.world.collision_objects.len(), 1);
        let table = &names.world.collision_objects[0];
        assert!(!table.has_geometry());
        assert_eq!(table.object_type.key, "table");
        assert!(names.world.octomap.octomap.data.is_empty());
        assert!(names.name.is_empty());

        let state = s.planning_scene_msg_components(SceneComponents::ROBOT_STATE | SceneComponents::OCTOMAP);
        assert_eq!(state.robot_state.joint_state.name, ["lift"]);
        assert!(state.world.collision_objects.is_empty());
        assert!(!state.world.octomap.octomap.data.is_empty());
    }

    // ── Robot state messages ────────────────────────────────────────────────

    fn attached_add(id: &str) -> AttachedCollisionObject {
        let mut a = AttachedCollisionObject {
            link_name: "hand".into(),
            object: CollisionObject::new(id, Operation::Add),
            ..AttachedCollisionObject::default()
        };
        a.object.header = Header::new("hand");
        a.object.primitives.push(SolidPrimitive::sphere(0.05));
        a
    }

    #[test]
    fn full_state_msg_replaces_attached_bodies() {
        let mut s = scene();
        s.process_attached_collision_object_msg(&attached_add("old")).unwrap();

        let mut remove = attached_add("other");
        remove.object.operation = Operation::Remove;
        let msg = RobotStateMsg {
            joint_state: JointStateMsg {
                name: vec!["lift".into()],
                position: vec![0.4],
            },
            attached_collision_objects: vec![attached_add("new"), remove],
            is_diff: false,
        };
        s.set_current_state_msg(&msg).unwrap();

        let state = s.current_state();
        assert!(!state.has_attached_body("old"));
        assert!(state.has_attached_body("new"));
        assert!(!state.has_attached_body("other"));
        assert_eq!(state.variable_position("lift"), Some(0.4));
    }

    #[test]
    fn diff_state_msg_keeps_attached_bodies() {
        let mut s = scene();
        s.process_attached_collision_object_msg(&attached_add("old")).unwrap();
        let msg = RobotStateMsg {
            attached_collision_objects: vec![attached_add("new")],
            is_diff: true,
            ..RobotStateMsg::default()
        };
        s.set_current_state_msg(&msg).unwrap();
        assert_eq!(s.current_state().attached_bodies().count(), 2);
    }

    #[test]
    fn updated_state_leaves_scene_alone() {
        let s = scene();
        let msg = RobotStateMsg {
            joint_state: JointStateMsg {
                name: vec!["lift".into()],
                position: vec![1.0],
            },
            ..RobotStateMsg::default()
        };
        let updated = s.current_state_updated(&msg);
        assert_eq!(updated.variable_position("lift"), Some(1.0));
        assert_eq!(s.current_state().variable_position("lift"), Some(0.0));
        assert!(!updated.dirty());
    }
}
