//! Wire messages exchanged with planning-scene clients.
//!
//! All messages are plain serde structs.  Every field has a default so that a
//! sparse JSON document (a *diff*) deserializes with absent fields left empty,
//! which the scene reads as "no change".

use serde::{Deserialize, Serialize};

use crate::{ColorRgba, ObjectType, PoseMsg};

/// Frame a message's poses are expressed in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Header {
    pub frame_id: String,
}

impl Header {
    pub fn new(frame_id: impl Into<String>) -> Self {
        Self {
            frame_id: frame_id.into(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shapes
// ────────────────────────────────────────────────────────────────────────────

/// Primitive solid kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    #[default]
    Box,
    Sphere,
    Cylinder,
    Cone,
}

/// A primitive solid.
///
/// `dimensions` layout: box `[x, y, z]`, sphere `[radius]`,
/// cylinder / cone `[height, radius]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolidPrimitive {
    pub kind: PrimitiveKind,
    pub dimensions: Vec<f64>,
}

impl SolidPrimitive {
    pub fn cuboid(x: f64, y: f64, z: f64) -> Self {
        Self {
            kind: PrimitiveKind::Box,
            dimensions: vec![x, y, z],
        }
    }

    pub fn sphere(radius: f64) -> Self {
        Self {
            kind: PrimitiveKind::Sphere,
            dimensions: vec![radius],
        }
    }

    pub fn cylinder(height: f64, radius: f64) -> Self {
        Self {
            kind: PrimitiveKind::Cylinder,
            dimensions: vec![height, radius],
        }
    }

    pub fn cone(height: f64, radius: f64) -> Self {
        Self {
            kind: PrimitiveKind::Cone,
            dimensions: vec![height, radius],
        }
    }
}

/// Triangle mesh.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshMsg {
    pub vertices: Vec<[f64; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

/// Plane `a·x + b·y + c·z + d = 0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneMsg {
    pub coef: [f64; 4],
}

// ────────────────────────────────────────────────────────────────────────────
// Collision objects
// ────────────────────────────────────────────────────────────────────────────

/// What a collision-object message asks the scene to do.
///
/// Codes this build does not know deserialize to [`Operation::Unknown`] and
/// are rejected by the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Add,
    Remove,
    Append,
    Move,
    #[serde(other)]
    Unknown,
}

/// A world object (or the geometry of an object to attach).
///
/// Shape poses are relative to `pose`, which itself is relative to
/// `header.frame_id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionObject {
    pub header: Header,
    pub pose: PoseMsg,
    pub id: String,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub primitives: Vec<SolidPrimitive>,
    pub primitive_poses: Vec<PoseMsg>,
    pub meshes: Vec<MeshMsg>,
    pub mesh_poses: Vec<PoseMsg>,
    pub planes: Vec<PlaneMsg>,
    pub plane_poses: Vec<PoseMsg>,
    pub subframe_names: Vec<String>,
    pub subframe_poses: Vec<PoseMsg>,
    pub operation: Operation,
}

impl CollisionObject {
    /// A bare message naming `id` with the given operation.
    pub fn new(id: impl Into<String>, operation: Operation) -> Self {
        Self {
            id: id.into(),
            operation,
            ..Self::default()
        }
    }

    /// True when the message carries at least one shape.
    pub fn has_geometry(&self) -> bool {
        !self.primitives.is_empty() || !self.meshes.is_empty() || !self.planes.is_empty()
    }

    /// Total number of shape poses carried (primitive, mesh, plane).
    pub fn shape_pose_count(&self) -> usize {
        self.primitive_poses.len() + self.mesh_poses.len() + self.plane_poses.len()
    }
}

/// Joint-space trajectory (used for detach postures and paths).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JointTrajectory {
    pub joint_names: Vec<String>,
    pub points: Vec<JointTrajectoryPoint>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JointTrajectoryPoint {
    pub positions: Vec<f64>,
    pub time_from_start: f64,
}

/// A collision object bound (or to be bound) to a robot link.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachedCollisionObject {
    pub link_name: String,
    pub object: CollisionObject,
    pub touch_links: Vec<String>,
    pub detach_posture: JointTrajectory,
    pub weight: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Robot state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JointStateMsg {
    pub name: Vec<String>,
    pub position: Vec<f64>,
}

/// Snapshot (or diff) of a robot state: joint values plus attached objects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotStateMsg {
    pub joint_state: JointStateMsg,
    pub attached_collision_objects: Vec<AttachedCollisionObject>,
    pub is_diff: bool,
}

impl RobotStateMsg {
    /// True when the message would change nothing.
    pub fn is_empty(&self) -> bool {
        self.joint_state.name.is_empty() && self.attached_collision_objects.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Allowed collisions, padding, colors, transforms
// ────────────────────────────────────────────────────────────────────────────

/// Dense form of an allowed-collision matrix.
///
/// `entry_values[i][j]` says whether `entry_names[i]` may touch
/// `entry_names[j]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowedCollisionMatrixMsg {
    pub entry_names: Vec<String>,
    pub entry_values: Vec<Vec<bool>>,
    pub default_entry_names: Vec<String>,
    pub default_entry_values: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkPadding {
    pub link_name: String,
    pub padding: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkScale {
    pub link_name: String,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectColorMsg {
    pub id: String,
    pub color: ColorRgba,
}

/// Fixed transform from `header.frame_id` to `child_frame_id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformStamped {
    pub header: Header,
    pub child_frame_id: String,
    pub transform: PoseMsg,
}

// ────────────────────────────────────────────────────────────────────────────
// Octomap
// ────────────────────────────────────────────────────────────────────────────

/// Serialized occupancy map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OctomapMsg {
    pub header: Header,
    pub binary: bool,
    pub id: String,
    pub resolution: f64,
    pub data: Vec<u8>,
}

/// Occupancy map placed at `origin` relative to `header.frame_id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OctomapWithPose {
    pub header: Header,
    pub origin: PoseMsg,
    pub octomap: OctomapMsg,
}

// ────────────────────────────────────────────────────────────────────────────
// Scene
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningSceneWorld {
    pub collision_objects: Vec<CollisionObject>,
    pub octomap: OctomapWithPose,
}

/// Full scene snapshot (`is_diff == false`) or diff against a parent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningSceneMsg {
    pub name: String,
    pub robot_model_name: String,
    pub fixed_frame_transforms: Vec<TransformStamped>,
    pub robot_state: RobotStateMsg,
    pub allowed_collision_matrix: AllowedCollisionMatrixMsg,
    pub link_padding: Vec<LinkPadding>,
    pub link_scale: Vec<LinkScale>,
    pub object_colors: Vec<ObjectColorMsg>,
    pub world: PlanningSceneWorld,
    pub is_diff: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Constraints and trajectories
// ────────────────────────────────────────────────────────────────────────────

/// Keep a single joint within `[position - tolerance_below, position + tolerance_above]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JointConstraintMsg {
    pub joint_name: String,
    pub position: f64,
    pub tolerance_above: f64,
    pub tolerance_below: f64,
    pub weight: f64,
}

/// Keep the origin of `link_name` inside an axis-aligned box expressed in
/// `header.frame_id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConstraintMsg {
    pub header: Header,
    pub link_name: String,
    pub region_min: [f64; 3],
    pub region_max: [f64; 3],
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintsMsg {
    pub name: String,
    pub joint_constraints: Vec<JointConstraintMsg>,
    pub position_constraints: Vec<PositionConstraintMsg>,
}

impl ConstraintsMsg {
    pub fn is_empty(&self) -> bool {
        self.joint_constraints.is_empty() && self.position_constraints.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotTrajectoryMsg {
    pub joint_trajectory: JointTrajectory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_diff_deserializes_with_defaults() {
        let json = r#"{ "is_diff": true, "object_colors": [ { "id": "box1" } ] }"#;
        let msg: PlanningSceneMsg = serde_json::from_str(json).unwrap();
        assert!(msg.is_diff);
        assert!(msg.name.is_empty());
        assert!(msg.world.collision_objects.is_empty());
        assert_eq!(msg.object_colors[0].id, "box1");
        assert!(msg.object_colors[0].color.is_unset());
    }

    #[test]
    fn unknown_operation_code_maps_to_unknown() {
        let json = r#"{ "id": "box1", "operation": "explode" }"#;
        let obj: CollisionObject = serde_json::from_str(json).unwrap();
        assert_eq!(obj.operation, Operation::Unknown);
    }

    #[test]
    fn object_type_field_is_named_type() {
        let mut obj = CollisionObject::new("box1", Operation::Add);
        obj.object_type = ObjectType::new("mug", "kitchen");
        let json = serde_json::to_string(&obj).unwrap();
        assert!(json.contains(r#""type":{"key":"mug","db":"kitchen"}"#));
    }

    #[test]
    fn has_geometry_and_pose_count() {
        let mut obj = CollisionObject::new("o", Operation::Add);
        assert!(!obj.has_geometry());
        obj.planes.push(PlaneMsg { coef: [0.0, 0.0, 1.0, 0.0] });
        obj.primitive_poses.push(PoseMsg::identity());
        obj.mesh_poses.push(PoseMsg::identity());
        assert!(obj.has_geometry());
        assert_eq!(obj.shape_pose_count(), 2);
    }
}
