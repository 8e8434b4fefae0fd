//! `planscene-collision` – world model and collision checking.
//!
//! # Modules
//!
//! - [`world`] – [`World`][world::World]: copy-on-write map of posed world
//!   objects with observers and change tracking ([`WorldDiff`][world::WorldDiff]).
//! - [`acm`] – [`AllowedCollisionMatrix`][acm::AllowedCollisionMatrix]:
//!   pairwise and default verdicts suppressing known-safe contacts.
//! - [`types`] – collision request / result / contact / cost-source types and
//!   the cost-source set operations.
//! - [`env`] – the [`CollisionEnv`][env::CollisionEnv] and
//!   [`CollisionDetectorAllocator`][env::CollisionDetectorAllocator]
//!   capability traits.
//! - [`bounding_volume`] – the axis-aligned bounding-box reference engine.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use planscene_collision::{BoundingVolumeAllocator, CollisionRequest, CollisionResult, World};
//! use planscene_geometry::Shape;
//! use planscene_robot::model::{Joint, RobotModelBuilder};
//! use planscene_robot::RobotState;
//! use planscene_types::Pose;
//!
//! let model = Arc::new(
//!     RobotModelBuilder::new("bot", "base")
//!         .collision("base", Shape::Sphere { radius: 0.5 }, Pose::identity())
//!         .build()
//!         .unwrap(),
//! );
//! let mut world = World::new();
//! world.add_to_object(
//!     "crate",
//!     Pose::translation(0.4, 0.0, 0.0),
//!     vec![Arc::new(Shape::Box { size: [0.2; 3] })],
//!     vec![Pose::identity()],
//! );
//!
//! let env = BoundingVolumeAllocator::shared().allocate_env(&world, Arc::clone(&model));
//! let mut res = CollisionResult::default();
//! env.check_robot_collision(&CollisionRequest::default(), &mut res, &RobotState::new(model), &world, None);
//! assert!(res.collision);
//! ```

pub mod acm;
pub mod bounding_volume;
pub mod env;
pub mod types;
pub mod world;

pub use acm::{AllowedCollision, AllowedCollisionMatrix};
pub use bounding_volume::{BOUNDING_VOLUME_DETECTOR, BoundingVolumeAllocator, BoundingVolumeEnv};
pub use env::{CollisionDetectorAllocator, CollisionEnv, LinkMargins};
pub use types::{BodyType, CollisionRequest, CollisionResult, Contact, CostSource};
pub use world::{Action, ObserverHandle, World, WorldDiff, WorldObject};
