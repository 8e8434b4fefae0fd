//! Fixed-frame table.
//!
//! Maps frame names to their pose relative to a single *target* frame (the
//! robot model frame).  Incoming transforms may be stamped relative to any
//! frame already in the table; they are composed down to the target frame on
//! insertion, so every lookup is a single map access.
//!
//! # Example
//!
//! ```rust
//! use planscene_geometry::FixedTransforms;
//! use planscene_types::{Header, PoseMsg, TransformStamped};
//!
//! let mut tf = FixedTransforms::new("world");
//!
//! // table is 1 m forward of world.
//! tf.set_transform_msg(&TransformStamped {
//!     header: Header::new("world"),
//!     child_frame_id: "table".into(),
//!     transform: PoseMsg::from_translation(1.0, 0.0, 0.0),
//! }).unwrap();
//!
//! // tray is 0.5 m forward of table.
//! tf.set_transform_msg(&TransformStamped {
//!     header: Header::new("table"),
//!     child_frame_id: "tray".into(),
//!     transform: PoseMsg::from_translation(0.5, 0.0, 0.0),
//! }).unwrap();
//!
//! assert!((tf.transform("tray").translation.x - 1.5).abs() < 1e-9);
//! ```

use std::collections::BTreeMap;

use planscene_types::{Header, Pose, PoseMsg, SceneError, TransformStamped};
use tracing::error;

/// Named frames fixed relative to a target frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedTransforms {
    target_frame: String,
    /// `transforms[frame]` = pose of `frame` in `target_frame`.
    transforms: BTreeMap<String, Pose>,
}

impl FixedTransforms {
    /// A table containing only the target frame (at identity).
    pub fn new(target_frame: impl Into<String>) -> Self {
        let target_frame = target_frame.into();
        let mut transforms = BTreeMap::new();
        transforms.insert(target_frame.clone(), Pose::identity());
        Self {
            target_frame,
            transforms,
        }
    }

    pub fn target_frame(&self) -> &str {
        &self.target_frame
    }

    /// True when `frame` is the target frame or has an entry.
    pub fn can_transform(&self, frame: &str) -> bool {
        self.transforms.contains_key(frame)
    }

    /// Every entry in this table is fixed by construction.
    pub fn is_fixed_frame(&self, frame: &str) -> bool {
        self.can_transform(frame)
    }

    /// Pose of `frame` in the target frame.  Unknown frames log an error and
    /// resolve to identity.
    pub fn transform(&self, frame: &str) -> Pose {
        match self.transforms.get(frame) {
            Some(pose) => *pose,
            None => {
                error!(
                    frame = %frame,
                    target = %self.target_frame,
                    "Unable to transform from frame to target frame"
                );
                Pose::identity()
            }
        }
    }

    /// Record the pose of `frame` in the target frame directly.
    pub fn set_transform(&mut self, frame: impl Into<String>, pose: Pose) {
        self.transforms.insert(frame.into(), pose);
    }

    /// Record a stamped transform.  The header frame must already be known;
    /// the result is composed down to the target frame.
    pub fn set_transform_msg(&mut self, msg: &TransformStamped) -> Result<(), SceneError> {
        let parent = msg.header.frame_id.as_str();
        let Some(parent_pose) = self.transforms.get(parent) else {
            error!(
                frame = %parent,
                child = %msg.child_frame_id,
                target = %self.target_frame,
                "Given transform is relative to a frame not in the table"
            );
            return Err(SceneError::UnknownFrame(parent.to_string()));
        };
        let pose = parent_pose * msg.transform.to_isometry();
        self.transforms.insert(msg.child_frame_id.clone(), pose);
        Ok(())
    }

    /// Apply every stamped transform, continuing past failures.
    pub fn set_transforms(&mut self, msgs: &[TransformStamped]) -> Result<(), SceneError> {
        SceneError::collect(msgs.iter().map(|m| self.set_transform_msg(m)))
    }

    /// Replace the whole table.  The target frame always maps to identity.
    pub fn set_all_transforms(&mut self, transforms: BTreeMap<String, Pose>) {
        self.transforms = transforms;
        self.transforms
            .insert(self.target_frame.clone(), Pose::identity());
    }

    pub fn all_transforms(&self) -> &BTreeMap<String, Pose> {
        &self.transforms
    }

    /// Stamped form of every entry other than the target frame.
    pub fn copy_transforms(&self) -> Vec<TransformStamped> {
        self.transforms
            .iter()
            .filter(|(name, _)| **name != self.target_frame)
            .map(|(name, pose)| TransformStamped {
                header: Header::new(self.target_frame.clone()),
                child_frame_id: name.clone(),
                transform: PoseMsg::from_isometry(pose),
            })
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
