//! Collision environment capability traits.
//!
//! A [`CollisionEnv`] answers robot-vs-world and robot-vs-robot collision
//! queries for one robot model.  It owns per-link padding and scale (the
//! [`LinkMargins`]) and nothing else: the world and the robot state are
//! passed to every query, so one environment can serve any world snapshot.
//!
//! Engines are produced by a [`CollisionDetectorAllocator`], either fresh for
//! a world or as a copy of an existing environment (keeping its margins).
//! Scenes keep the allocator so a child scene can derive environments of the
//! same family as its parent.

use std::collections::BTreeMap;
use std::sync::Arc;

use planscene_robot::{RobotModel, RobotState};
use planscene_types::{LinkPadding, LinkScale};
use tracing::error;

use crate::acm::AllowedCollisionMatrix;
use crate::types::{CollisionRequest, CollisionResult};
use crate::world::World;

// ────────────────────────────────────────────────────────────────────────────
// Link margins
// ────────────────────────────────────────────────────────────────────────────

/// Per-link padding (metres added around the geometry) and scale.
/// Links without an explicit value use padding `0.0` and scale `1.0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkMargins {
    padding: BTreeMap<String, f64>,
    scale: BTreeMap<String, f64>,
}

impl LinkMargins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn padding(&self, link: &str) -> f64 {
        self.padding.get(link).copied().unwrap_or(0.0)
    }

    pub fn scale(&self, link: &str) -> f64 {
        self.scale.get(link).copied().unwrap_or(1.0)
    }

    /// Negative padding is rejected and stored as zero.
    pub fn set_padding(&mut self, link: &str, padding: f64) {
        let padding = if padding < 0.0 {
            error!(link = %link, padding, "Link padding must be non-negative, using 0");
            0.0
        } else {
            padding
        };
        self.padding.insert(link.to_string(), padding);
    }

    /// Non-positive scale is rejected and stored as one.
    pub fn set_scale(&mut self, link: &str, scale: f64) {
        let scale = if scale <= 0.0 {
            error!(link = %link, scale, "Link scale must be positive, using 1");
            1.0
        } else {
            scale
        };
        self.scale.insert(link.to_string(), scale);
    }

    pub fn paddings(&self) -> &BTreeMap<String, f64> {
        &self.padding
    }

    pub fn scales(&self) -> &BTreeMap<String, f64> {
        &self.scale
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CollisionEnv
// ────────────────────────────────────────────────────────────────────────────

/// A collision-query engine bound to one robot model.
pub trait CollisionEnv: Send + Sync {
    fn robot_model(&self) -> &Arc<RobotModel>;

    fn margins(&self) -> &LinkMargins;

    fn margins_mut(&mut self) -> &mut LinkMargins;

    /// Check the robot (links and attached bodies) in `state` against every
    /// object of `world`, accumulating into `res`.
    fn check_robot_collision(
        &self,
        req: &CollisionRequest,
        res: &mut CollisionResult,
        state: &RobotState,
        world: &World,
        acm: Option<&AllowedCollisionMatrix>,
    );

    /// Check the robot in `state` against itself.
    fn check_self_collision(
        &self,
        req: &CollisionRequest,
        res: &mut CollisionResult,
        state: &RobotState,
        acm: Option<&AllowedCollisionMatrix>,
    );

    fn box_clone(&self) -> Box<dyn CollisionEnv>;

    // ── Padding and scale ───────────────────────────────────────────────────

    fn link_padding(&self, link: &str) -> f64 {
        self.margins().padding(link)
    }

    fn link_scale(&self, link: &str) -> f64 {
        self.margins().scale(link)
    }

    fn set_link_padding(&mut self, link: &str, padding: f64) {
        self.margins_mut().set_padding(link, padding);
    }

    fn set_link_scale(&mut self, link: &str, scale: f64) {
        self.margins_mut().set_scale(link, scale);
    }

    fn link_paddings(&self) -> &BTreeMap<String, f64> {
        self.margins().paddings()
    }

    fn link_scales(&self) -> &BTreeMap<String, f64> {
        self.margins().scales()
    }

    /// Same padding for every link of the model.
    fn set_padding(&mut self, padding: f64) {
        let model = Arc::clone(self.robot_model());
        for link in model.link_names() {
            self.set_link_padding(link, padding);
        }
    }

    /// Same scale for every link of the model.
    fn set_scale(&mut self, scale: f64) {
        let model = Arc::clone(self.robot_model());
        for link in model.link_names() {
            self.set_link_scale(link, scale);
        }
    }

    /// Padding of every link of the model.
    fn padding_msg(&self) -> Vec<LinkPadding> {
        self.robot_model()
            .link_names()
            .into_iter()
            .map(|link| LinkPadding {
                link_name: link.to_string(),
                padding: self.link_padding(link),
            })
            .collect()
    }

    /// Scale of every link of the model.
    fn scale_msg(&self) -> Vec<LinkScale> {
        self.robot_model()
            .link_names()
            .into_iter()
            .map(|link| LinkScale {
                link_name: link.to_string(),
                scale: self.link_scale(link),
            })
            .collect()
    }

    fn set_padding_msg(&mut self, padding: &[LinkPadding]) {
        for p in padding {
            self.set_link_padding(&p.link_name, p.padding);
        }
    }

    fn set_scale_msg(&mut self, scale: &[LinkScale]) {
        for s in scale {
            self.set_link_scale(&s.link_name, s.scale);
        }
    }

    fn copy_padding_and_scale_from(&mut self, other: &dyn CollisionEnv) {
        *self.margins_mut() = other.margins().clone();
    }
}

impl Clone for Box<dyn CollisionEnv> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Allocator
// ────────────────────────────────────────────────────────────────────────────

/// Factory for one family of collision environments.
pub trait CollisionDetectorAllocator: Send + Sync {
    /// Name the scene registers the detector under.
    fn name(&self) -> &str;

    /// A fresh environment for `model`.  `world` is the world it will
    /// initially serve; engines that cache world geometry build it here.
    fn allocate_env(&self, world: &World, model: Arc<RobotModel>) -> Box<dyn CollisionEnv>;

    /// An environment of the same model and margins as `existing`, serving
    /// `world`.
    fn allocate_env_from(&self, existing: &dyn CollisionEnv, world: &World) -> Box<dyn CollisionEnv>;
}
