//! Copy-on-write hierarchy: children read through to parents, and their
//! local changes can be pushed back or shipped as a diff message.

mod common;

use approx::assert_relative_eq;
use common::{attach, cube, scene};
use planscene_core::Scene;
use planscene_types::{
    CollisionObject, ColorRgba, Header, ObjectType, Operation, PlanningSceneMsg, Pose, PoseMsg,
};

fn red() -> ColorRgba {
    ColorRgba::new(1.0, 0.0, 0.0, 1.0)
}

fn blue() -> ColorRgba {
    ColorRgba::new(0.0, 0.0, 1.0, 1.0)
}

/// Parent with a table, a shelf and a cup; the table is red.
fn parent() -> Scene {
    let mut s = scene();
    s.set_name("kitchen");
    s.process_collision_object_msg(&cube("table", 0.5, [2.0, 0.0, 0.0]))
        .unwrap();
    s.process_collision_object_msg(&cube("shelf", 0.5, [0.0, 2.0, 0.0]))
        .unwrap();
    s.process_collision_object_msg(&cube("cup", 0.05, [0.0, 0.0, 0.3]))
        .unwrap();
    s.set_object_color("table", red());
    s
}

/// A child touching every kind of state.
fn busy_child(parent: &Scene) -> Scene {
    let mut child = parent.diff();
    child
        .process_collision_object_msg(&CollisionObject::new("shelf", Operation::Remove))
        .unwrap();

    let mut crate_box = cube("crate", 0.3, [0.0, -2.0, 0.0]);
    crate_box.object_type = ObjectType::new("crate", "warehouse");
    child.process_collision_object_msg(&crate_box).unwrap();
    child.set_object_color("crate", blue());

    let mut mv = CollisionObject::new("table", Operation::Move);
    mv.header = Header::new("base");
    mv.pose = PoseMsg::from_translation(2.5, 0.0, 0.0);
    child.process_collision_object_msg(&mv).unwrap();

    child
        .process_attached_collision_object_msg(&attach("cup", "gripper"))
        .unwrap();
    child.current_state_mut().set_variable_position("rail", 0.3);
    child
        .allowed_collision_matrix_mut()
        .set_entry("crate", "carriage", true);
    child
        .transforms_mut()
        .set_transform("camera", Pose::translation(0.0, 0.0, 1.5));
    child.collision_env_mut().set_link_padding("gripper", 0.01);
    child
}

fn snapshot(scene: &Scene) -> PlanningSceneMsg {
    let mut msg = scene.planning_scene_msg();
    msg.name.clear();
    msg
}

// ── Read-through ────────────────────────────────────────────────────────────

#[test]
fn child_sees_parent_until_it_writes() {
    let parent = parent();
    let child = parent.diff();
    assert_eq!(child.name(), "kitchen+");
    assert_eq!(child.world().object_ids(), parent.world().object_ids());
    assert_eq!(child.object_color("table"), Some(red()));
    assert_eq!(snapshot(&child), snapshot(&parent));
}

#[test]
fn grandchild_reads_through_two_levels() {
    let root = parent();
    let mut middle = root.diff();
    middle.set_object_color("shelf", blue());
    middle.current_state_mut().set_variable_position("rail", 1.0);

    let leaf = middle.diff();
    assert_eq!(leaf.name(), "kitchen++");
    assert_eq!(leaf.object_color("table"), Some(red()));
    assert_eq!(leaf.object_color("shelf"), Some(blue()));
    assert_eq!(leaf.current_state().variable_position("rail"), Some(1.0));
    assert_eq!(root.current_state().variable_position("rail"), Some(0.0));
}

#[test]
fn child_changes_leave_parent_alone() {
    let parent = parent();
    let before = snapshot(&parent);
    let child = busy_child(&parent);
    assert_ne!(snapshot(&child), before);
    assert_eq!(snapshot(&parent), before);
    assert!(parent.world().has_object("cup"));
    assert!(!parent.current_state().has_attached_body("cup"));
}

// ── Flattening ──────────────────────────────────────────────────────────────

#[test]
fn push_diffs_reproduces_child() {
    let parent = parent();
    let child = busy_child(&parent);
    let mut target = parent.clone_scene();
    child.push_diffs(&mut target);
    assert_eq!(snapshot(&target), snapshot(&child));
}

#[test]
fn push_diffs_into_live_parent_then_clear() {
    let mut parent = parent();
    let mut child = busy_child(&parent);
    let expected = snapshot(&child);

    child.push_diffs(&mut parent);
    assert_eq!(snapshot(&parent), expected);

    child.clear_diffs();
    assert!(child.world_diff().is_some_and(|diff| diff.is_empty()));
    assert_eq!(snapshot(&child), expected);
    assert!(child.current_state().has_attached_body("cup"));
}

#[test]
fn parent_edits_reach_unwritten_child_fields() {
    let mut parent = parent();
    let mut child = parent.diff();
    child.set_object_color("shelf", blue());

    parent
        .process_collision_object_msg(&cube("bin", 0.2, [-2.0, 0.0, 0.0]))
        .unwrap();
    parent.current_state_mut().set_variable_position("rail", 0.7);
    parent.set_object_color("table", blue());

    assert!(child.world().has_object("bin"));
    assert_eq!(child.current_state().variable_position("rail"), Some(0.7));
    assert_eq!(child.object_color("table"), Some(blue()));
    assert_eq!(child.object_color("shelf"), Some(blue()));
    assert_eq!(parent.object_color("shelf"), None);
}

#[test]
fn push_diffs_always_carries_padding() {
    let parent = parent();
    let untouched = parent.diff();
    let mut target = parent.clone_scene();
    target.collision_env_mut().set_link_padding("carriage", 0.2);
    untouched.push_diffs(&mut target);
    assert_relative_eq!(target.active_collision_env().link_padding("carriage"), 0.0);
    assert_eq!(target.world().object_ids(), parent.world().object_ids());
}

#[test]
fn decoupled_child_matches_and_stands_alone() {
    let parent = parent();
    let mut child = busy_child(&parent);
    let before = snapshot(&child);
    child.decouple_parent();
    assert!(!child.is_diff());
    assert!(child.world_diff().is_none());
    assert_eq!(snapshot(&child), before);
}

#[test]
fn clear_diffs_returns_to_parent_view() {
    let parent = parent();
    let mut child = busy_child(&parent);
    child.clear_diffs();
    assert!(child.is_diff());
    assert_eq!(snapshot(&child), snapshot(&parent));
}

// ── Diff messages ───────────────────────────────────────────────────────────

#[test]
fn diff_message_replay_reproduces_child() {
    let parent = parent();
    let child = busy_child(&parent);
    let msg = child.planning_scene_diff_msg();

    let mut replica = parent.clone_scene();
    replica.set_planning_scene_diff_msg(&msg).unwrap();

    assert_eq!(replica.name(), child.name());
    assert_eq!(replica.world().object_ids(), child.world().object_ids());
    assert_eq!(replica.known_object_colors(), child.known_object_colors());
    assert_eq!(replica.known_object_types(), child.known_object_types());
    assert_eq!(
        replica.current_state().variable_position("rail"),
        child.current_state().variable_position("rail")
    );
    assert!(replica.current_state().has_attached_body("cup"));
    assert!(
        replica
            .allowed_collision_matrix()
            .entry("crate", "carriage")
            .is_some()
    );
    let camera = replica.frame_transform("camera");
    assert_relative_eq!(camera.translation.vector.z, 1.5, epsilon = 1e-12);
    assert_relative_eq!(
        replica.active_collision_env().link_padding("gripper"),
        0.01
    );

    let table = replica.world().object("table").cloned().unwrap();
    assert_relative_eq!(table.pose.translation.vector.x, 2.5, epsilon = 1e-12);
    let cup = replica.frame_transform("cup");
    let expected = child.frame_transform("cup");
    assert_relative_eq!(
        cup.translation.vector,
        expected.translation.vector,
        epsilon = 1e-9
    );
}

#[test]
fn diff_with_msg_builds_child() {
    let parent = parent();
    let msg = busy_child(&parent).planning_scene_diff_msg();
    let child = parent.diff_with_msg(&msg).unwrap();
    assert!(child.is_diff());
    assert!(child.world().has_object("crate"));
    assert!(!child.world().has_object("shelf"));
    assert!(parent.world().has_object("shelf"));
}
