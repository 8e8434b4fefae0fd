//! Kinematic constraints evaluated against robot states.
//!
//! A [`ConstraintSet`] holds any number of [`KinematicConstraint`]s.  A state
//! satisfies the set only when it satisfies every member; the reported
//! distance is the sum of the members' distances.
//!
//! | Constraint | Satisfied when |
//! |------------|----------------|
//! | [`JointConstraint`] | `position - tolerance_below <= value <= position + tolerance_above` |
//! | [`PositionConstraint`] | the link origin lies inside the region box |
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use planscene_core::constraints::ConstraintSet;
//! use planscene_robot::model::{Joint, RobotModelBuilder};
//! use planscene_robot::RobotState;
//! use planscene_types::{ConstraintsMsg, JointConstraintMsg};
//!
//! let model = Arc::new(
//!     RobotModelBuilder::new("bot", "base")
//!         .link("arm", "base", Joint::revolute("shoulder", [0.0, 0.0, 1.0]))
//!         .build()
//!         .unwrap(),
//! );
//! let msg = ConstraintsMsg {
//!     joint_constraints: vec![JointConstraintMsg {
//!         joint_name: "shoulder".into(),
//!         position: 0.0,
//!         tolerance_above: 0.1,
//!         tolerance_below: 0.1,
//!         weight: 1.0,
//!     }],
//!     ..ConstraintsMsg::default()
//! };
//!
//! let mut set = ConstraintSet::new();
//! set.add_msg(&model, &msg, |_| None).unwrap();
//!
//! let mut state = RobotState::new(Arc::clone(&model));
//! assert!(set.decide(&state, false).satisfied);
//! state.set_variable_position("shoulder", 0.5);
//! assert!(!set.decide(&state, false).satisfied);
//! ```

use nalgebra::Point3;
use planscene_geometry::Aabb;
use planscene_robot::{RobotModel, RobotState};
use planscene_types::{ConstraintsMsg, JointConstraintMsg, Pose, PositionConstraintMsg, SceneError};
use tracing::{debug, warn};

/// Slack applied to joint bounds.
const JOINT_EPSILON: f64 = 1e-9;

/// Outcome of checking one state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintEvaluation {
    pub satisfied: bool,
    /// How far the state is from the constraint target (zero when exact).
    pub distance: f64,
}

impl ConstraintEvaluation {
    fn satisfied() -> Self {
        Self {
            satisfied: true,
            distance: 0.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// KinematicConstraint trait
// ────────────────────────────────────────────────────────────────────────────

/// A single condition on a robot state.
///
/// Implement this trait to add custom constraints to a [`ConstraintSet`] via
/// [`ConstraintSet::add`].
pub trait KinematicConstraint: Send + Sync {
    /// Human-readable name used in diagnostics.
    fn name(&self) -> &str;

    fn decide(&self, state: &RobotState) -> ConstraintEvaluation;
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in constraints
// ────────────────────────────────────────────────────────────────────────────

/// Keeps one joint variable within a tolerance band around a target.
#[derive(Debug, Clone, PartialEq)]
pub struct JointConstraint {
    pub joint: String,
    pub position: f64,
    pub tolerance_above: f64,
    pub tolerance_below: f64,
    pub weight: f64,
}

impl JointConstraint {
    /// Validate `msg` against `model`.  Negative tolerances are taken by
    /// magnitude.
    pub fn from_msg(model: &RobotModel, msg: &JointConstraintMsg) -> Result<Self, SceneError> {
        if model.variable_index(&msg.joint_name).is_none() {
            warn!(joint = %msg.joint_name, model = %model.name(), "Joint constraint refers to an unknown joint");
            return Err(SceneError::Construct(format!(
                "joint '{}' is not a variable of model '{}'",
                msg.joint_name,
                model.name()
            )));
        }
        if msg.tolerance_above < 0.0 || msg.tolerance_below < 0.0 {
            warn!(joint = %msg.joint_name, "Negative joint tolerance, using its magnitude");
        }
        Ok(Self {
            joint: msg.joint_name.clone(),
            position: msg.position,
            tolerance_above: msg.tolerance_above.abs(),
            tolerance_below: msg.tolerance_below.abs(),
            weight: msg.weight,
        })
    }
}

impl KinematicConstraint for JointConstraint {
    fn name(&self) -> &str {
        &self.joint
    }

    fn decide(&self, state: &RobotState) -> ConstraintEvaluation {
        let Some(value) = state.variable_position(&self.joint) else {
            return ConstraintEvaluation {
                satisfied: false,
                distance: f64::INFINITY,
            };
        };
        let lower = self.position - self.tolerance_below - JOINT_EPSILON;
        let upper = self.position + self.tolerance_above + JOINT_EPSILON;
        ConstraintEvaluation {
            satisfied: value >= lower && value <= upper,
            distance: (value - self.position).abs(),
        }
    }
}

/// Keeps the origin of a link inside an axis-aligned region.
///
/// The region is given in some reference frame and stored as its enclosing
/// box in the model frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionConstraint {
    pub link: String,
    pub region: Aabb,
    pub weight: f64,
}

impl PositionConstraint {
    /// `resolve` maps a frame name to its pose in the model frame.  An empty
    /// header frame means the model frame.
    pub fn from_msg(
        model: &RobotModel,
        msg: &PositionConstraintMsg,
        resolve: impl Fn(&str) -> Option<Pose>,
    ) -> Result<Self, SceneError> {
        if !model.has_link(&msg.link_name) {
            warn!(link = %msg.link_name, "Position constraint refers to an unknown link");
            return Err(SceneError::LinkNotFound(msg.link_name.clone()));
        }
        let frame = msg.header.frame_id.as_str();
        let reference = if frame.is_empty() || frame == model.model_frame() {
            Pose::identity()
        } else {
            resolve(frame).ok_or_else(|| {
                warn!(frame = %frame, "Position constraint frame is unknown");
                SceneError::UnknownFrame(frame.to_string())
            })?
        };
        let [x0, y0, z0] = msg.region_min;
        let [x1, y1, z1] = msg.region_max;
        let region = Aabb::new(Point3::new(x0, y0, z0), Point3::new(x1, y1, z1)).transformed(&reference);
        Ok(Self {
            link: msg.link_name.clone(),
            region,
            weight: msg.weight,
        })
    }
}

impl KinematicConstraint for PositionConstraint {
    fn name(&self) -> &str {
        &self.link
    }

    fn decide(&self, state: &RobotState) -> ConstraintEvaluation {
        let Some(pose) = state.global_link_transform(&self.link) else {
            return ConstraintEvaluation {
                satisfied: false,
                distance: f64::INFINITY,
            };
        };
        let origin = Point3::from(pose.translation.vector);
        if self.region.contains_point(&origin) {
            return ConstraintEvaluation::satisfied();
        }
        let clamped = Point3::new(
            origin.x.clamp(self.region.min.x, self.region.max.x),
            origin.y.clamp(self.region.min.y, self.region.max.y),
            origin.z.clamp(self.region.min.z, self.region.max.z),
        );
        ConstraintEvaluation {
            satisfied: false,
            distance: (origin - clamped).norm(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ConstraintSet
// ────────────────────────────────────────────────────────────────────────────

/// Conjunction of kinematic constraints.
#[derive(Default)]
pub struct ConstraintSet {
    constraints: Vec<Box<dyn KinematicConstraint>>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, constraint: Box<dyn KinematicConstraint>) {
        self.constraints.push(constraint);
    }

    /// Add every constraint of `msg` that can be built for `model`.  Entries
    /// that cannot are skipped; their failures are returned together.
    pub fn add_msg(
        &mut self,
        model: &RobotModel,
        msg: &ConstraintsMsg,
        resolve: impl Fn(&str) -> Option<Pose>,
    ) -> Result<(), SceneError> {
        let mut results = Vec::new();
        for jc in &msg.joint_constraints {
            results.push(JointConstraint::from_msg(model, jc).map(|c| self.add(Box::new(c))));
        }
        for pc in &msg.position_constraints {
            results.push(PositionConstraint::from_msg(model, pc, &resolve).map(|c| self.add(Box::new(c))));
        }
        SceneError::collect(results)
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Evaluate every constraint.  With `verbose`, each violation is logged.
    pub fn decide(&self, state: &RobotState, verbose: bool) -> ConstraintEvaluation {
        let mut total = ConstraintEvaluation::satisfied();
        for c in &self.constraints {
            let eval = c.decide(state);
            if !eval.satisfied && verbose {
                debug!(constraint = %c.name(), distance = eval.distance, "Constraint violated");
            }
            total.satisfied &= eval.satisfied;
            total.distance += eval.distance;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planscene_robot::model::{Joint, RobotModelBuilder};
    use planscene_types::Header;
    use std::sync::Arc;

    fn slider() -> Arc<RobotModel> {
        Arc::new(
            RobotModelBuilder::new("slider", "base")
                .link("carriage", "base", Joint::prismatic("rail", [1.0, 0.0, 0.0]).with_limits(-2.0, 2.0))
                .build()
                .unwrap(),
        )
    }

    fn joint_msg(position: f64, tol: f64) -> JointConstraintMsg {
        JointConstraintMsg {
            joint_name: "rail".into(),
            position,
            tolerance_above: tol,
            tolerance_below: tol,
            weight: 1.0,
        }
    }

    fn region_msg(frame: &str, min: [f64; 3], max: [f64; 3]) -> PositionConstraintMsg {
        PositionConstraintMsg {
            header: Header::new(frame),
            link_name: "carriage".into(),
            region_min: min,
            region_max: max,
            weight: 1.0,
        }
    }

    // ── Joint constraints ───────────────────────────────────────────────────

    #[test]
    fn joint_constraint_band() {
        let model = slider();
        let c = JointConstraint::from_msg(&model, &joint_msg(1.0, 0.2)).unwrap();
        let mut state = RobotState::new(Arc::clone(&model));

        state.set_variable_position("rail", 1.1);
        assert!(c.decide(&state).satisfied);
        state.set_variable_position("rail", 0.8);
        assert!(c.decide(&state).satisfied);
        state.set_variable_position("rail", 1.5);
        let eval = c.decide(&state);
        assert!(!eval.satisfied);
        assert!((eval.distance - 0.5).abs() < 1e-12);
    }

    #[test]
    fn negative_tolerance_uses_magnitude() {
        let c = JointConstraint::from_msg(&slider(), &joint_msg(0.0, -0.3)).unwrap();
        assert_eq!(c.tolerance_above, 0.3);
        assert_eq!(c.tolerance_below, 0.3);
    }

    #[test]
    fn unknown_joint_is_rejected() {
        let mut msg = joint_msg(0.0, 0.1);
        msg.joint_name = "elbow".into();
        assert!(matches!(
            JointConstraint::from_msg(&slider(), &msg),
            Err(SceneError::Construct(_))
        ));
    }

    // ── Position constraints ────────────────────────────────────────────────

    #[test]
    fn position_constraint_in_reference_frame() {
        let model = slider();
        let shifted = Pose::translation(1.0, 0.0, 0.0);
        let c = PositionConstraint::from_msg(&model, &region_msg("table", [-0.1; 3], [0.1; 3]), |f| {
            (f == "table").then_some(shifted)
        })
        .unwrap();

        let mut state = RobotState::new(Arc::clone(&model));
        assert!(!c.decide(&state).satisfied);
        state.set_variable_position("rail", 1.0);
        assert!(c.decide(&state).satisfied);
    }

    #[test]
    fn position_constraint_unknown_frame() {
        let err = PositionConstraint::from_msg(&slider(), &region_msg("nowhere", [0.0; 3], [1.0; 3]), |_| None);
        assert!(matches!(err, Err(SceneError::UnknownFrame(f)) if f == "nowhere"));
    }

    // ── Sets ────────────────────────────────────────────────────────────────

    #[test]
    fn set_keeps_valid_entries_and_reports_bad_ones() {
        let model = slider();
        let mut bad = joint_msg(0.0, 0.1);
        bad.joint_name = "elbow".into();
        let msg = ConstraintsMsg {
            joint_constraints: vec![joint_msg(0.0, 0.1), bad],
            position_constraints: vec![region_msg("", [-1.0; 3], [1.0; 3])],
            ..ConstraintsMsg::default()
        };
        let mut set = ConstraintSet::new();
        assert!(matches!(set.add_msg(&model, &msg, |_| None), Err(SceneError::Batch(v)) if v.len() == 1));
        assert_eq!(set.len(), 2);

        let mut state = RobotState::new(Arc::clone(&model));
        assert!(set.decide(&state, true).satisfied);
        state.set_variable_position("rail", 0.5);
        assert!(!set.decide(&state, true).satisfied);
    }

    #[test]
    fn empty_set_is_satisfied() {
        let state = RobotState::new(slider());
        assert!(ConstraintSet::new().is_empty());
        assert!(ConstraintSet::new().decide(&state, false).satisfied);
    }
}
