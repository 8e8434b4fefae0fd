//! `planscene-geometry` – shapes, occupancy maps and fixed frames.
//!
//! # Modules
//!
//! - [`shapes`] – [`Shape`][shapes::Shape]: the collision shape sum type shared
//!   (as `Arc<Shape>`) by world objects and attached bodies, plus its
//!   [`ShapeMsg`][shapes::ShapeMsg] wire form.
//! - [`octree`] – [`OcTree`][octree::OcTree]: occupied-cell octree carried by
//!   octomap messages, and the [`Aabb`][octree::Aabb] used for every spatial
//!   overlap test in the workspace.
//! - [`text`] – [`TextReader`][text::TextReader] and the line-oriented pose /
//!   shape encoding used by scene geometry files.
//! - [`transforms`] – [`FixedTransforms`][transforms::FixedTransforms]: table of
//!   named frames fixed relative to the model frame.

pub mod octree;
pub mod shapes;
pub mod text;
pub mod transforms;

pub use octree::{Aabb, OcTree};
pub use shapes::{Shape, ShapeMsg};
pub use transforms::FixedTransforms;
