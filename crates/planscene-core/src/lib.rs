//! `planscene-core` – the planning scene.
//!
//! # Modules
//!
//! - [`scene`] – [`Scene`][scene::Scene]: robot state, world, allowed
//!   collisions, fixed frames and object metadata in a copy-on-write
//!   hierarchy.  Processes world, attached-object, octomap and scene
//!   messages; answers collision and validity queries; saves and loads
//!   scene geometry as text.
//! - [`constraints`] – [`ConstraintSet`][constraints::ConstraintSet]: joint
//!   and position constraints behind the
//!   [`KinematicConstraint`][constraints::KinematicConstraint] trait.
//! - [`trajectory`] – [`RobotTrajectory`][trajectory::RobotTrajectory]:
//!   sequences of robot states checked by path validity queries.

pub mod constraints;
pub mod scene;
pub mod trajectory;

pub use constraints::{ConstraintEvaluation, ConstraintSet, JointConstraint, KinematicConstraint, PositionConstraint};
pub use scene::{MotionFeasibilityFn, Scene, StateFeasibilityFn};
pub use trajectory::RobotTrajectory;
