//! Shared fixtures for the scene integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use planscene_core::Scene;
use planscene_geometry::Shape;
use planscene_robot::RobotModel;
use planscene_robot::model::{Joint, RobotModelBuilder};
use planscene_types::{
    AttachedCollisionObject, CollisionObject, Header, Operation, Pose, PoseMsg, SolidPrimitive,
};

/// A carriage on a rail along X with a gripper 0.2 m above it.
///
/// The base link has no collision geometry, so an object at the origin is
/// only hit when the carriage is driven over it.
pub fn rail_robot() -> Arc<RobotModel> {
    Arc::new(
        RobotModelBuilder::new("rail_bot", "base")
            .link(
                "carriage",
                "base",
                Joint::prismatic("rail", [1.0, 0.0, 0.0]).with_limits(-3.0, 3.0),
            )
            .collision("carriage", Shape::Box { size: [0.2; 3] }, Pose::identity())
            .link(
                "gripper",
                "carriage",
                Joint::fixed("wrist").with_origin(Pose::translation(0.0, 0.0, 0.2)),
            )
            .collision("gripper", Shape::Box { size: [0.1; 3] }, Pose::identity())
            .group("arm", &["carriage", "gripper"])
            .build()
            .expect("fixture model is valid"),
    )
}

pub fn scene() -> Scene {
    Scene::new(rail_robot())
}

/// Carriage moved to `x` in a copy of the scene's current state.
pub fn state_at(scene: &Scene, x: f64) -> planscene_robot::RobotState {
    let mut state = scene.current_state().clone();
    state.set_variable_position("rail", x);
    state.update();
    state
}

/// `Add` message for a cube of side `size` centred at `(x, y, z)` in the
/// base frame.
pub fn cube(id: &str, size: f64, [x, y, z]: [f64; 3]) -> CollisionObject {
    let mut obj = CollisionObject::new(id, Operation::Add);
    obj.header = Header::new("base");
    obj.pose = PoseMsg::from_translation(x, y, z);
    obj.primitives.push(SolidPrimitive::cuboid(size, size, size));
    obj.primitive_poses.push(PoseMsg::identity());
    obj
}

pub fn attach(id: &str, link: &str) -> AttachedCollisionObject {
    AttachedCollisionObject {
        link_name: link.into(),
        object: CollisionObject::new(id, Operation::Add),
        ..AttachedCollisionObject::default()
    }
}

pub fn detach(id: &str) -> AttachedCollisionObject {
    let mut msg = AttachedCollisionObject::default();
    msg.object.id = id.into();
    msg.object.operation = Operation::Remove;
    msg
}
