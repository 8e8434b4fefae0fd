//! Validity predicates and cost queries built on the collision checks.
//!
//! A state is valid when it is collision free, feasible and satisfies its
//! constraints, checked in that order.  A path is valid when every waypoint
//! is valid and the last one satisfies at least one goal.

use std::io;

use planscene_collision::types::{remove_cost_sources, remove_overlapping, sort_cost_sources};
use planscene_collision::{CollisionRequest, CollisionResult, CostSource};
use planscene_robot::RobotState;
use planscene_types::{ConstraintsMsg, RobotStateMsg, RobotTrajectoryMsg};
use tracing::{debug, warn};

use super::Scene;
use crate::constraints::ConstraintSet;
use crate::trajectory::RobotTrajectory;

impl Scene {
    // ── Single states ───────────────────────────────────────────────────────

    pub fn is_state_colliding(&self, state: &RobotState, group: &str, verbose: bool) -> bool {
        let req = CollisionRequest {
            group_name: group.to_string(),
            verbose,
            ..CollisionRequest::default()
        };
        let mut res = CollisionResult::default();
        self.check_collision_state(&req, &mut res, state);
        res.collision
    }

    /// Collision check of the current state with the joints of `msg` applied.
    pub fn is_state_colliding_msg(&self, msg: &RobotStateMsg, group: &str, verbose: bool) -> bool {
        let state = self.current_state_updated(msg);
        self.is_state_colliding(&state, group, verbose)
    }

    /// The state feasibility predicate's verdict, true when none is set.
    pub fn is_state_feasible(&self, state: &RobotState, verbose: bool) -> bool {
        self.state_feasibility
            .as_ref()
            .is_none_or(|predicate| predicate(state, verbose))
    }

    pub fn is_motion_feasible(&self, from: &RobotState, to: &RobotState, verbose: bool) -> bool {
        self.motion_feasibility
            .as_ref()
            .is_none_or(|predicate| predicate(from, to, verbose))
    }

    /// Whether `state` satisfies `constraints`.  Frames in the message are
    /// resolved against `state`.  Constraints that cannot be built are logged
    /// and left out.
    pub fn is_state_constrained(&self, state: &RobotState, constraints: &ConstraintsMsg, verbose: bool) -> bool {
        if constraints.is_empty() {
            return true;
        }
        let set = self.constraint_set(state, constraints);
        self.is_state_constrained_set(state, &set, verbose)
    }

    pub fn is_state_constrained_set(&self, state: &RobotState, constraints: &ConstraintSet, verbose: bool) -> bool {
        constraints.decide(state, verbose).satisfied
    }

    fn constraint_set(&self, state: &RobotState, msg: &ConstraintsMsg) -> ConstraintSet {
        let mut set = ConstraintSet::new();
        let resolve = |frame: &str| {
            self.knows_frame_transform_in(state, frame)
                .then(|| self.frame_transform_in(state, frame))
        };
        if let Err(e) = set.add_msg(&self.robot_model, msg, resolve) {
            warn!(parent: &self.span, error = %e, constraints = %msg.name, "Some constraints could not be built");
        }
        set
    }

    pub fn is_state_valid(&self, state: &RobotState, constraints: &ConstraintsMsg, group: &str, verbose: bool) -> bool {
        if self.is_state_colliding(state, group, verbose) {
            return false;
        }
        if !self.is_state_feasible(state, verbose) {
            return false;
        }
        self.is_state_constrained(state, constraints, verbose)
    }

    // ── Paths ───────────────────────────────────────────────────────────────

    /// Check every waypoint against `path_constraints`, and the last one
    /// against `goals` (any one suffices; none given means no goal check).
    ///
    /// With `invalid`, every failing index is collected; without it the
    /// check stops at the first failure.
    pub fn is_path_valid(
        &self,
        trajectory: &RobotTrajectory,
        path_constraints: &ConstraintsMsg,
        goals: &[ConstraintsMsg],
        group: &str,
        verbose: bool,
        mut invalid: Option<&mut Vec<usize>>,
    ) -> bool {
        if let Some(out) = invalid.as_deref_mut() {
            out.clear();
        }
        let path_set = self.constraint_set(&self.current_state(), path_constraints);
        let count = trajectory.waypoint_count();
        let mut valid = true;

        for (i, state) in trajectory.waypoints().iter().enumerate() {
            let mut ok = !self.is_state_colliding(state, group, verbose)
                && self.is_state_feasible(state, verbose)
                && self.is_state_constrained_set(state, &path_set, verbose);

            if ok && i + 1 == count && !goals.is_empty() {
                ok = goals.iter().any(|g| self.is_state_constrained(state, g, verbose));
                if !ok && verbose {
                    debug!(parent: &self.span, waypoint = i, "Last waypoint satisfies none of the goal constraints");
                }
            }

            if !ok {
                if verbose {
                    debug!(parent: &self.span, waypoint = i, "Trajectory waypoint is invalid");
                }
                valid = false;
                match invalid.as_deref_mut() {
                    Some(out) => out.push(i),
                    None => return false,
                }
            }
        }
        valid
    }

    /// [`Scene::is_path_valid`] for a trajectory message starting from `start`.
    pub fn is_path_valid_msg(
        &self,
        start: &RobotStateMsg,
        trajectory: &RobotTrajectoryMsg,
        path_constraints: &ConstraintsMsg,
        goals: &[ConstraintsMsg],
        group: &str,
        verbose: bool,
        invalid: Option<&mut Vec<usize>>,
    ) -> bool {
        let start = self.current_state_updated(start);
        let trajectory = RobotTrajectory::from_msg(&start, group, trajectory);
        self.is_path_valid(&trajectory, path_constraints, goals, group, verbose, invalid)
    }

    // ── Cost sources ────────────────────────────────────────────────────────

    /// The `max` costliest collision regions of `state`.
    pub fn cost_sources(&self, state: &RobotState, max: usize, group: &str) -> Vec<CostSource> {
        let req = CollisionRequest {
            group_name: group.to_string(),
            cost: true,
            max_cost_sources: max,
            ..CollisionRequest::default()
        };
        let mut res = CollisionResult::default();
        self.check_collision_state(&req, &mut res, state);
        res.cost_sources
    }

    /// Costliest collision regions along `trajectory`, excluding regions the
    /// start state already occupies and collapsing overlapping ones.
    pub fn trajectory_cost_sources(
        &self,
        trajectory: &RobotTrajectory,
        max: usize,
        group: &str,
        overlap_fraction: f64,
    ) -> Vec<CostSource> {
        let mut all = Vec::new();
        let mut start = Vec::new();
        for (i, state) in trajectory.waypoints().iter().enumerate() {
            let sources = self.cost_sources(state, max, group);
            if i == 0 {
                start = sources.clone();
            }
            all.extend(sources);
        }
        sort_cost_sources(&mut all);
        all.truncate(max);
        remove_cost_sources(&mut all, &start, overlap_fraction);
        remove_overlapping(&mut all, overlap_fraction);
        all
    }

    // ── Reporting ───────────────────────────────────────────────────────────

    /// Ids of world objects and attached bodies, one per line.
    pub fn print_known_objects(&self, out: &mut impl io::Write) -> io::Result<()> {
        const RULE: &str = "-----------------------------------------";
        writeln!(out, "{RULE}")?;
        writeln!(out, "PlanningScene Known Objects:")?;
        writeln!(out, "  - Collision World Objects:")?;
        for id in self.world().object_ids() {
            writeln!(out, "\t- {id}")?;
        }
        writeln!(out, "  - Attached Bodies:")?;
        for body in self.current_state().attached_bodies() {
            writeln!(out, "\t- {}", body.id)?;
        }
        writeln!(out, "{RULE}")
    }
}
