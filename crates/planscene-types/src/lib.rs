//! `planscene-types` – shared vocabulary of the planning-scene workspace.
//!
//! Every other crate speaks in these types:
//!
//! - [`Pose`] / [`PoseMsg`] – rigid transforms and their wire form.
//! - [`ColorRgba`] / [`ObjectType`] – per-object metadata carried by a scene.
//! - [`SceneComponents`] – bitmask selecting parts of a scene snapshot.
//! - [`messages`] – the serde wire messages (collision objects, attached
//!   objects, robot state, allowed-collision matrix, full/diff scene).
//! - [`SceneError`] – every recoverable failure a scene operation can report.

pub mod messages;

use bitflags::bitflags;
use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use messages::*;

/// Identifier reserved for the single occupancy map stored in a world.
pub const OCTOMAP_NS: &str = "<octomap>";

/// Name given to scenes that were never explicitly named.
pub const DEFAULT_SCENE_NAME: &str = "(noname)";

/// A rigid-body transform (rotation + translation) in double precision.
pub type Pose = Isometry3<f64>;

// ────────────────────────────────────────────────────────────────────────────
// Pose messages
// ────────────────────────────────────────────────────────────────────────────

/// Quaternion as it travels on the wire (`x, y, z, w` order).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuaternionMsg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// Position + orientation as it travels on the wire.
///
/// The all-zero value (including `w == 0`) is the "empty" pose: message
/// producers use it to say "no pose given".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseMsg {
    pub position: [f64; 3],
    pub orientation: QuaternionMsg,
}

impl PoseMsg {
    /// The identity pose (`w == 1`).
    pub fn identity() -> Self {
        Self {
            position: [0.0; 3],
            orientation: QuaternionMsg {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                w: 1.0,
            },
        }
    }

    /// A pure translation.
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: [x, y, z],
            ..Self::identity()
        }
    }

    /// True when every component is zero.
    pub fn is_empty(&self) -> bool {
        self.position.iter().all(|v| *v == 0.0)
            && self.orientation.x == 0.0
            && self.orientation.y == 0.0
            && self.orientation.z == 0.0
            && self.orientation.w == 0.0
    }

    /// Convert to an isometry, normalising the quaternion.  A zero-length
    /// quaternion is read as the identity rotation.
    pub fn to_isometry(&self) -> Pose {
        let q = Quaternion::new(
            self.orientation.w,
            self.orientation.x,
            self.orientation.y,
            self.orientation.z,
        );
        let rotation = if q.norm() > f64::EPSILON {
            UnitQuaternion::from_quaternion(q)
        } else {
            UnitQuaternion::identity()
        };
        let [x, y, z] = self.position;
        Isometry3::from_parts(Translation3::new(x, y, z), rotation)
    }

    /// Convert an isometry into its wire form.
    pub fn from_isometry(pose: &Pose) -> Self {
        let t = pose.translation.vector;
        let c = &pose.rotation.quaternion().coords;
        Self {
            position: [t.x, t.y, t.z],
            orientation: QuaternionMsg {
                x: c[0],
                y: c[1],
                z: c[2],
                w: c[3],
            },
        }
    }
}

impl From<&Pose> for PoseMsg {
    fn from(pose: &Pose) -> Self {
        Self::from_isometry(pose)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Object metadata
// ────────────────────────────────────────────────────────────────────────────

/// RGBA display color attached to a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorRgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ColorRgba {
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// True for the all-zero sentinel ("no explicit color").
    pub fn is_unset(&self) -> bool {
        self.r <= 0.0 && self.g <= 0.0 && self.b <= 0.0 && self.a <= 0.0
    }
}

/// Semantic type of an object (recognition key + database name).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectType {
    pub key: String,
    pub db: String,
}

impl ObjectType {
    pub fn new(key: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            db: db.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.db.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Snapshot component selection
// ────────────────────────────────────────────────────────────────────────────

bitflags! {
    /// Parts of a scene included in a component-selected snapshot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SceneComponents: u32 {
        const SCENE_SETTINGS = 1;
        const ROBOT_STATE = 2;
        const ROBOT_STATE_ATTACHED_OBJECTS = 4;
        const WORLD_OBJECT_NAMES = 8;
        const WORLD_OBJECT_GEOMETRY = 16;
        const OCTOMAP = 32;
        const TRANSFORMS = 64;
        const ALLOWED_COLLISION_MATRIX = 128;
        const LINK_PADDING_AND_SCALING = 256;
        const OBJECT_COLORS = 512;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Recoverable failures reported by scene operations.
///
/// The scene logs a diagnostic alongside every error it returns; state is
/// left unchanged unless the operation documents a partial effect.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Unknown frame: '{0}'")]
    UnknownFrame(String),

    #[error("The ID '{0}' cannot be used for collision objects (name reserved)")]
    ReservedId(String),

    #[error("Link '{0}' not found in robot model")]
    LinkNotFound(String),

    #[error("No geometry available for object '{0}'")]
    NoGeometry(String),

    #[error("Object '{id}' has {expected} shapes but {given} shape poses were given")]
    ShapePoseCountMismatch {
        id: String,
        expected: usize,
        given: usize,
    },

    #[error("More {kind} poses than {kind} shapes in collision object '{id}'")]
    TooManyShapePoses { id: String, kind: &'static str },

    #[error("Object '{0}' does not exist")]
    ObjectNotFound(String),

    #[error("Object '{id}' is attached to '{actual}', not '{stated}'")]
    AttachedToOtherLink {
        id: String,
        stated: String,
        actual: String,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid octomap: {0}")]
    InvalidOctomap(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Construction failed: {0}")]
    Construct(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("{} of the requested updates failed", .0.len())]
    Batch(Vec<SceneError>),
}

impl SceneError {
    /// Fold the outcomes of several independent updates into one result:
    /// `Ok` when all succeeded, otherwise every failure in a [`SceneError::Batch`].
    pub fn collect(results: impl IntoIterator<Item = Result<(), SceneError>>) -> Result<(), SceneError> {
        let failures: Vec<SceneError> = results.into_iter().filter_map(Result::err).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SceneError::Batch(failures))
        }
    }
}
