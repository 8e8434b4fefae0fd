//! Robot trajectories as sequences of full robot states.

use std::sync::Arc;

use planscene_robot::{RobotModel, RobotState};
use planscene_types::{JointTrajectory, RobotTrajectoryMsg};
use tracing::warn;

/// Waypoints of a motion, each a complete [`RobotState`], with the time
/// elapsed since the previous waypoint.
#[derive(Debug, Clone)]
pub struct RobotTrajectory {
    model: Arc<RobotModel>,
    group: String,
    waypoints: Vec<RobotState>,
    durations: Vec<f64>,
}

impl RobotTrajectory {
    pub fn new(model: Arc<RobotModel>, group: impl Into<String>) -> Self {
        Self {
            model,
            group: group.into(),
            waypoints: Vec::new(),
            durations: Vec::new(),
        }
    }

    /// Build one waypoint per trajectory point: a copy of `start` with the
    /// named joints set.  Unknown joint names are logged and skipped.
    pub fn from_joint_trajectory(start: &RobotState, group: impl Into<String>, traj: &JointTrajectory) -> Self {
        let mut out = Self::new(Arc::clone(start.model()), group);
        for name in &traj.joint_names {
            if start.model().variable_index(name).is_none() {
                warn!(joint = %name, "Trajectory joint not found in robot model");
            }
        }
        let mut previous = 0.0;
        for point in &traj.points {
            let mut state = start.clone();
            for (name, value) in traj.joint_names.iter().zip(&point.positions) {
                state.set_variable_position(name, *value);
            }
            state.update();
            out.push_waypoint(state, (point.time_from_start - previous).max(0.0));
            previous = point.time_from_start;
        }
        out
    }

    pub fn from_msg(start: &RobotState, group: impl Into<String>, msg: &RobotTrajectoryMsg) -> Self {
        Self::from_joint_trajectory(start, group, &msg.joint_trajectory)
    }

    pub fn model(&self) -> &Arc<RobotModel> {
        &self.model
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn push_waypoint(&mut self, state: RobotState, dt: f64) {
        self.waypoints.push(state);
        self.durations.push(dt);
    }

    pub fn waypoint_count(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn waypoint(&self, index: usize) -> Option<&RobotState> {
        self.waypoints.get(index)
    }

    pub fn waypoints(&self) -> &[RobotState] {
        &self.waypoints
    }

    pub fn last_waypoint(&self) -> Option<&RobotState> {
        self.waypoints.last()
    }

    /// Total duration in seconds.
    pub fn duration(&self) -> f64 {
        self.durations.iter().sum()
    }
}
