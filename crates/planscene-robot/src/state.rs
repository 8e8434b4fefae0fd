//! Robot state: joint values, link poses and attached bodies.
//!
//! Link poses are derived data.  Changing a joint value marks them dirty;
//! [`RobotState::update`] recomputes them, and every `&self` query computes
//! the affected chain on demand while dirty so reads are never stale.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use planscene_robot::model::{Joint, RobotModelBuilder};
//! use planscene_robot::RobotState;
//! use planscene_types::Pose;
//!
//! let model = Arc::new(
//!     RobotModelBuilder::new("rail", "base")
//!         .link("cart", "base", Joint::prismatic("slide", [1.0, 0.0, 0.0]))
//!         .build()
//!         .unwrap(),
//! );
//! let mut state = RobotState::new(model);
//! state.set_variable_position("slide", 0.75);
//! assert!(state.dirty_link_transforms());
//!
//! let cart = state.global_link_transform("cart").unwrap();
//! assert!((cart.translation.x - 0.75).abs() < 1e-12);
//!
//! state.update();
//! assert!(!state.dirty_link_transforms());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use nalgebra::{Translation3, Unit, UnitQuaternion, Vector3};
use planscene_types::{JointStateMsg, Pose, RobotStateMsg};
use tracing::warn;

use crate::attached::AttachedBody;
use crate::model::{Joint, JointKind, RobotModel};

/// Invoked with `(body, true)` after a body is attached and `(body, false)`
/// after it is removed.
pub type AttachedBodyCallback = Arc<dyn Fn(&AttachedBody, bool) + Send + Sync>;

#[derive(Clone)]
pub struct RobotState {
    model: Arc<RobotModel>,
    positions: Vec<f64>,
    link_transforms: Vec<Pose>,
    dirty_link_transforms: bool,
    dirty_collision_body_transforms: bool,
    attached: BTreeMap<String, AttachedBody>,
    attached_callback: Option<AttachedBodyCallback>,
}

impl fmt::Debug for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RobotState")
            .field("model", &self.model.name())
            .field("positions", &self.positions)
            .field("attached", &self.attached.keys().collect::<Vec<_>>())
            .field("dirty_link_transforms", &self.dirty_link_transforms)
            .finish()
    }
}

/// Two states are equal when they describe the same configuration: same
/// model, joint values and attached bodies.
impl PartialEq for RobotState {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.model, &other.model) || self.model == other.model)
            && self.positions == other.positions
            && self.attached == other.attached
    }
}

impl RobotState {
    /// A state at default joint values with no attached bodies.
    pub fn new(model: Arc<RobotModel>) -> Self {
        let positions = model.default_positions();
        let link_transforms = vec![Pose::identity(); model.links().len()];
        Self {
            model,
            positions,
            link_transforms,
            dirty_link_transforms: true,
            dirty_collision_body_transforms: true,
            attached: BTreeMap::new(),
            attached_callback: None,
        }
    }

    pub fn model(&self) -> &Arc<RobotModel> {
        &self.model
    }

    // ── Joint values ────────────────────────────────────────────────────────

    pub fn set_to_default_values(&mut self) {
        self.positions = self.model.default_positions();
        self.mark_dirty();
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    /// Set every variable at once; extra values are ignored, missing ones
    /// keep their current value.
    pub fn set_positions(&mut self, values: &[f64]) {
        for (dst, src) in self.positions.iter_mut().zip(values) {
            *dst = *src;
        }
        self.mark_dirty();
    }

    pub fn variable_position(&self, name: &str) -> Option<f64> {
        self.model.variable_index(name).map(|i| self.positions[i])
    }

    /// Returns false when the model has no variable called `name`.
    pub fn set_variable_position(&mut self, name: &str, value: f64) -> bool {
        match self.model.variable_index(name) {
            Some(i) => {
                self.positions[i] = value;
                self.mark_dirty();
                true
            }
            None => false,
        }
    }

    /// Apply the named values of a joint-state message.  Unknown names are
    /// logged and skipped.
    pub fn set_joint_state(&mut self, msg: &JointStateMsg) {
        for (name, value) in msg.name.iter().zip(&msg.position) {
            if !self.set_variable_position(name, *value) {
                warn!(joint = %name, model = %self.model.name(), "Joint not found in robot model");
            }
        }
        if msg.name.len() != msg.position.len() {
            warn!(
                names = msg.name.len(),
                positions = msg.position.len(),
                "Joint state message has mismatched name and position counts"
            );
        }
    }

    pub fn joint_state_msg(&self) -> JointStateMsg {
        JointStateMsg {
            name: self.model.variable_names().to_vec(),
            position: self.positions.clone(),
        }
    }

    /// True when every variable is within its joint limits.
    pub fn satisfies_bounds(&self) -> bool {
        self.positions.iter().enumerate().all(|(i, v)| {
            self.model
                .variable_joint(i)
                .is_none_or(|j| j.within_limits(*v))
        })
    }

    // ── Forward kinematics ──────────────────────────────────────────────────

    fn mark_dirty(&mut self) {
        self.dirty_link_transforms = true;
        self.dirty_collision_body_transforms = true;
    }

    pub fn dirty_link_transforms(&self) -> bool {
        self.dirty_link_transforms
    }

    pub fn dirty_collision_body_transforms(&self) -> bool {
        self.dirty_collision_body_transforms
    }

    /// True when any derived transform is stale.
    pub fn dirty(&self) -> bool {
        self.dirty_link_transforms || self.dirty_collision_body_transforms
    }

    /// Recompute every link pose and clear the dirty flags.
    pub fn update(&mut self) {
        if self.dirty_link_transforms {
            let model = Arc::clone(&self.model);
            for link in model.links() {
                self.link_transforms[link.index] = match (link.parent, &link.joint) {
                    (Some(p), Some(joint)) => {
                        self.link_transforms[p] * self.joint_transform(joint)
                    }
                    _ => Pose::identity(),
                };
            }
            self.dirty_link_transforms = false;
        }
        self.dirty_collision_body_transforms = false;
    }

    fn joint_transform(&self, joint: &Joint) -> Pose {
        let value = joint.variable.map_or(0.0, |i| self.positions[i]);
        let motion = match joint.kind {
            JointKind::Fixed => Pose::identity(),
            JointKind::Revolute { axis } => match Unit::try_new(Vector3::from(axis), f64::EPSILON) {
                Some(axis) => Pose::from_parts(
                    Translation3::identity(),
                    UnitQuaternion::from_axis_angle(&axis, value),
                ),
                None => Pose::identity(),
            },
            JointKind::Prismatic { axis } => {
                let axis = Vector3::from(axis);
                let norm = axis.norm();
                if norm > f64::EPSILON {
                    Pose::from_parts(
                        Translation3::from(axis * (value / norm)),
                        UnitQuaternion::identity(),
                    )
                } else {
                    Pose::identity()
                }
            }
        };
        joint.origin * motion
    }

    fn compute_link_transform(&self, index: usize) -> Pose {
        let link = &self.model.links()[index];
        match (link.parent, &link.joint) {
            (Some(p), Some(joint)) => self.compute_link_transform(p) * self.joint_transform(joint),
            _ => Pose::identity(),
        }
    }

    fn link_pose_by_index(&self, index: usize) -> Pose {
        if self.dirty_link_transforms {
            self.compute_link_transform(index)
        } else {
            self.link_transforms[index]
        }
    }

    /// Pose of `link` in the model frame.
    pub fn global_link_transform(&self, link: &str) -> Option<Pose> {
        self.model
            .link_index(link)
            .map(|i| self.link_pose_by_index(i))
    }

    // ── Attached bodies ─────────────────────────────────────────────────────

    pub fn set_attached_body_update_callback(&mut self, callback: Option<AttachedBodyCallback>) {
        self.attached_callback = callback;
    }

    /// Attach `body`, replacing any body with the same id.
    pub fn attach_body(&mut self, body: AttachedBody) {
        let id = body.id.clone();
        self.attached.insert(id.clone(), body);
        if let (Some(cb), Some(body)) = (&self.attached_callback, self.attached.get(&id)) {
            cb(body, true);
        }
    }

    /// Remove the body `id`; false when nothing was attached under it.
    pub fn clear_attached_body(&mut self, id: &str) -> bool {
        match self.attached.remove(id) {
            Some(body) => {
                if let Some(cb) = &self.attached_callback {
                    cb(&body, false);
                }
                true
            }
            None => false,
        }
    }

    pub fn clear_attached_bodies_on_link(&mut self, link: &str) {
        let ids: Vec<String> = self
            .attached_bodies_on_link(link)
            .into_iter()
            .map(|b| b.id.clone())
            .collect();
        for id in ids {
            self.clear_attached_body(&id);
        }
    }

    pub fn clear_attached_bodies(&mut self) {
        let ids: Vec<String> = self.attached.keys().cloned().collect();
        for id in ids {
            self.clear_attached_body(&id);
        }
    }

    pub fn has_attached_body(&self, id: &str) -> bool {
        self.attached.contains_key(id)
    }

    pub fn attached_body(&self, id: &str) -> Option<&AttachedBody> {
        self.attached.get(id)
    }

    /// All attached bodies in id order.
    pub fn attached_bodies(&self) -> impl Iterator<Item = &AttachedBody> {
        self.attached.values()
    }

    pub fn attached_bodies_on_link(&self, link: &str) -> Vec<&AttachedBody> {
        self.attached.values().filter(|b| b.link == link).collect()
    }

    /// Body frame of `body` in the model frame.
    pub fn attached_body_global_pose(&self, body: &AttachedBody) -> Pose {
        let link = self.global_link_transform(&body.link).unwrap_or_else(|| {
            warn!(body = %body.id, link = %body.link, "Attached body refers to unknown link");
            Pose::identity()
        });
        body.global_pose(&link)
    }

    /// Shape poses of `body` in the model frame.
    pub fn attached_body_global_shape_poses(&self, body: &AttachedBody) -> Vec<Pose> {
        let pose = self.attached_body_global_pose(body);
        body.shape_poses.iter().map(|p| pose * p).collect()
    }

    // ── Frames ──────────────────────────────────────────────────────────────

    /// Pose of a named frame: a link, an attached body id, or an attached
    /// body subframe written `<id>/<subframe>`.
    pub fn frame_transform(&self, frame: &str) -> Option<Pose> {
        if let Some(pose) = self.global_link_transform(frame) {
            return Some(pose);
        }
        if let Some(body) = self.attached.get(frame) {
            return Some(self.attached_body_global_pose(body));
        }
        let (id, sub) = frame.split_once('/')?;
        let body = self.attached.get(id)?;
        body.subframes
            .get(sub)
            .map(|p| self.attached_body_global_pose(body) * p)
    }

    pub fn knows_frame_transform(&self, frame: &str) -> bool {
        if self.model.has_link(frame) || self.attached.contains_key(frame) {
            return true;
        }
        frame
            .split_once('/')
            .and_then(|(id, sub)| self.attached.get(id).map(|b| b.subframes.contains_key(sub)))
            .unwrap_or(false)
    }

    // ── Messages ────────────────────────────────────────────────────────────

    /// Full (non-diff) message; attached bodies only when `copy_attached`.
    pub fn to_msg(&self, copy_attached: bool) -> RobotStateMsg {
        RobotStateMsg {
            joint_state: self.joint_state_msg(),
            attached_collision_objects: if copy_attached {
                self.attached.values().map(AttachedBody::to_msg).collect()
            } else {
                Vec::new()
            },
            is_diff: false,
        }
    }
}
