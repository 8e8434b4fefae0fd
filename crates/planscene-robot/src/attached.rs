//! Bodies rigidly attached to robot links.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use planscene_geometry::Shape;
use planscene_types::{
    AttachedCollisionObject, CollisionObject, Header, JointTrajectory, Operation, Pose, PoseMsg,
};

/// Collision geometry bound to a link.
///
/// `pose` is the body frame in the link frame; shape poses and subframes are
/// relative to the body frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedBody {
    pub id: String,
    pub link: String,
    pub pose: Pose,
    pub shapes: Vec<Arc<Shape>>,
    pub shape_poses: Vec<Pose>,
    pub touch_links: BTreeSet<String>,
    pub detach_posture: JointTrajectory,
    pub subframes: BTreeMap<String, Pose>,
}

impl AttachedBody {
    pub fn new(
        id: impl Into<String>,
        link: impl Into<String>,
        pose: Pose,
        shapes: Vec<Arc<Shape>>,
        shape_poses: Vec<Pose>,
    ) -> Self {
        Self {
            id: id.into(),
            link: link.into(),
            pose,
            shapes,
            shape_poses,
            touch_links: BTreeSet::new(),
            detach_posture: JointTrajectory::default(),
            subframes: BTreeMap::new(),
        }
    }

    pub fn with_touch_links<I, S>(mut self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.touch_links.extend(links.into_iter().map(Into::into));
        self
    }

    pub fn with_subframes(mut self, subframes: BTreeMap<String, Pose>) -> Self {
        self.subframes = subframes;
        self
    }

    pub fn with_detach_posture(mut self, posture: JointTrajectory) -> Self {
        self.detach_posture = posture;
        self
    }

    /// Body frame in the model frame, given the global pose of its link.
    pub fn global_pose(&self, link_pose: &Pose) -> Pose {
        link_pose * self.pose
    }

    /// Shape poses in the model frame.
    pub fn global_shape_poses(&self, link_pose: &Pose) -> Vec<Pose> {
        let body = self.global_pose(link_pose);
        self.shape_poses.iter().map(|p| body * p).collect()
    }

    /// Subframe `name` in the model frame.
    pub fn global_subframe(&self, link_pose: &Pose, name: &str) -> Option<Pose> {
        self.subframes
            .get(name)
            .map(|p| self.global_pose(link_pose) * p)
    }

    /// True when `link` may touch this body without it counting as a
    /// collision (the body's own link always may).
    pub fn may_touch(&self, link: &str) -> bool {
        link == self.link || self.touch_links.contains(link)
    }

    /// ADD message re-creating this body, expressed in its link frame.
    /// Octree shapes have no message form and are skipped.
    pub fn to_msg(&self) -> AttachedCollisionObject {
        let mut object = CollisionObject {
            header: Header::new(self.link.clone()),
            pose: PoseMsg::from_isometry(&self.pose),
            id: self.id.clone(),
            operation: Operation::Add,
            ..CollisionObject::default()
        };
        for (shape, pose) in self.shapes.iter().zip(&self.shape_poses) {
            if let Some(msg) = shape.to_msg() {
                msg.append_to(&mut object, PoseMsg::from_isometry(pose));
            }
        }
        for (name, pose) in &self.subframes {
            object.subframe_names.push(name.clone());
            object.subframe_poses.push(PoseMsg::from_isometry(pose));
        }
        AttachedCollisionObject {
            link_name: self.link.clone(),
            object,
            touch_links: self.touch_links.iter().cloned().collect(),
            detach_posture: self.detach_posture.clone(),
            weight: 0.0,
        }
    }
}
