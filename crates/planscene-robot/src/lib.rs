//! `planscene-robot` – robot model and robot state.
//!
//! # Modules
//!
//! - [`model`] – [`RobotModel`][model::RobotModel]: immutable kinematic tree
//!   (links, joints, collision geometry, link groups, default disabled
//!   collision pairs), built with [`RobotModelBuilder`][model::RobotModelBuilder]
//!   or from a serde [`RobotDescription`][model::RobotDescription].
//! - [`state`] – [`RobotState`][state::RobotState]: joint values, forward
//!   kinematics with dirty tracking, attached bodies and frame lookup.
//! - [`attached`] – [`AttachedBody`][attached::AttachedBody]: collision
//!   geometry rigidly bound to a link.

pub mod attached;
pub mod model;
pub mod state;

pub use attached::AttachedBody;
pub use model::{ModelError, RobotDescription, RobotModel, RobotModelBuilder};
pub use state::{AttachedBodyCallback, RobotState};
