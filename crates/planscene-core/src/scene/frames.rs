//! Frame resolution.
//!
//! A frame name is looked up, in order, among the robot state's frames
//! (links, attached bodies and their subframes), the world's frames (object
//! ids and `<id>/<subframe>`), then the fixed-frame table.  A leading `/` is
//! ignored.

use planscene_robot::RobotState;
use planscene_types::{Pose, SceneError};

use super::Scene;

impl Scene {
    /// Pose of `frame` in the planning frame for the current state.  Unknown
    /// frames are logged and resolve to identity.
    pub fn frame_transform(&self, frame: &str) -> Pose {
        self.frame_transform_in(&self.current_state(), frame)
    }

    /// As [`Scene::frame_transform`], with robot frames taken from `state`.
    pub fn frame_transform_in(&self, state: &RobotState, frame: &str) -> Pose {
        if let Some(rest) = frame.strip_prefix('/') {
            return self.frame_transform_in(state, rest);
        }
        if let Some(pose) = state.frame_transform(frame) {
            return pose;
        }
        if let Some(pose) = self.world().transform(frame) {
            return pose;
        }
        self.transforms().transform(frame)
    }

    pub fn knows_frame_transform(&self, frame: &str) -> bool {
        self.knows_frame_transform_in(&self.current_state(), frame)
    }

    pub fn knows_frame_transform_in(&self, state: &RobotState, frame: &str) -> bool {
        if let Some(rest) = frame.strip_prefix('/') {
            return self.knows_frame_transform_in(state, rest);
        }
        state.knows_frame_transform(frame) || self.world().knows_transform(frame) || self.transforms().can_transform(frame)
    }

    /// Pose of `frame`, or [`SceneError::UnknownFrame`].
    pub fn try_frame_transform(&self, frame: &str) -> Result<Pose, SceneError> {
        self.try_frame_transform_in(&self.current_state(), frame)
    }

    pub(crate) fn try_frame_transform_in(&self, state: &RobotState, frame: &str) -> Result<Pose, SceneError> {
        if self.knows_frame_transform_in(state, frame) {
            Ok(self.frame_transform_in(state, frame))
        } else {
            Err(SceneError::UnknownFrame(frame.to_string()))
        }
    }
}
