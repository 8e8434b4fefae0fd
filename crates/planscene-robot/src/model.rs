//! Immutable kinematic model of a robot.
//!
//! A model is a tree of links rooted at the *model frame*.  Every non-root
//! link hangs off its parent through exactly one joint; each moving joint
//! contributes one variable to a [`RobotState`][crate::RobotState].
//!
//! # Example
//!
//! ```rust
//! use planscene_geometry::Shape;
//! use planscene_robot::model::{Joint, RobotModelBuilder};
//! use planscene_types::Pose;
//!
//! let model = RobotModelBuilder::new("arm", "base")
//!     .link("upper", "base", Joint::revolute("shoulder", [0.0, 0.0, 1.0]))
//!     .collision("upper", Shape::Sphere { radius: 0.1 }, Pose::identity())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(model.model_frame(), "base");
//! assert_eq!(model.variable_names(), ["shoulder"]);
//! assert_eq!(model.links_with_collision_geometry(), ["upper"]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use planscene_geometry::Shape;
use planscene_types::{MeshMsg, Pose, PoseMsg};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures while assembling a robot model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Robot model has no root link")]
    MissingRoot,

    #[error("Link '{link}' refers to unknown parent link '{parent}'")]
    UnknownParent { link: String, parent: String },

    #[error("Duplicate link '{0}'")]
    DuplicateLink(String),

    #[error("Duplicate joint '{0}'")]
    DuplicateJoint(String),

    #[error("Unknown link '{0}'")]
    UnknownLink(String),

    #[error("Links form a cycle: {0:?}")]
    Cyclic(Vec<String>),

    #[error("Invalid geometry on link '{link}': {reason}")]
    InvalidGeometry { link: String, reason: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Joints and links
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointKind {
    Fixed,
    Revolute { axis: [f64; 3] },
    Prismatic { axis: [f64; 3] },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimits {
    pub lower: f64,
    pub upper: f64,
}

/// Joint connecting a link to its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    pub kind: JointKind,
    /// Pose of the joint frame in the parent link frame (at zero position).
    pub origin: Pose,
    pub limits: Option<JointLimits>,
    /// Index into the state's variable vector; `None` for fixed joints.
    pub variable: Option<usize>,
}

impl Joint {
    pub fn fixed(name: impl Into<String>) -> Self {
        Self::with_kind(name, JointKind::Fixed)
    }

    pub fn revolute(name: impl Into<String>, axis: [f64; 3]) -> Self {
        Self::with_kind(name, JointKind::Revolute { axis })
    }

    pub fn prismatic(name: impl Into<String>, axis: [f64; 3]) -> Self {
        Self::with_kind(name, JointKind::Prismatic { axis })
    }

    fn with_kind(name: impl Into<String>, kind: JointKind) -> Self {
        Self {
            name: name.into(),
            kind,
            origin: Pose::identity(),
            limits: None,
            variable: None,
        }
    }

    pub fn with_origin(mut self, origin: Pose) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.limits = Some(JointLimits { lower, upper });
        self
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.kind, JointKind::Fixed)
    }

    /// Clamp `value` into the joint limits, if any.
    pub fn clamp(&self, value: f64) -> f64 {
        match self.limits {
            Some(l) => value.clamp(l.lower.min(l.upper), l.upper.max(l.lower)),
            None => value,
        }
    }

    pub fn within_limits(&self, value: f64) -> bool {
        self.limits
            .is_none_or(|l| value >= l.lower && value <= l.upper)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollisionGeometry {
    pub shape: Arc<Shape>,
    pub origin: Pose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub name: String,
    pub index: usize,
    pub parent: Option<usize>,
    pub joint: Option<Joint>,
    pub collision: Vec<CollisionGeometry>,
}

// ────────────────────────────────────────────────────────────────────────────
// RobotModel
// ────────────────────────────────────────────────────────────────────────────

/// Kinematic tree of a robot.  Links are stored in topological order (every
/// parent precedes its children); the first link is the root.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotModel {
    name: String,
    links: Vec<Link>,
    link_index: BTreeMap<String, usize>,
    /// `variables[i]` = index of the link whose joint owns variable `i`.
    variables: Vec<usize>,
    variable_names: Vec<String>,
    groups: BTreeMap<String, Vec<String>>,
    disabled_collisions: BTreeSet<(String, String)>,
}

impl RobotModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the root link; every pose in a scene is expressed in it.
    pub fn model_frame(&self) -> &str {
        &self.links[0].name
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.link_index.get(name).map(|i| &self.links[*i])
    }

    pub fn link_index(&self, name: &str) -> Option<usize> {
        self.link_index.get(name).copied()
    }

    pub fn has_link(&self, name: &str) -> bool {
        self.link_index.contains_key(name)
    }

    pub fn link_names(&self) -> Vec<&str> {
        self.links.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn links_with_collision_geometry(&self) -> Vec<&str> {
        self.links
            .iter()
            .filter(|l| !l.collision.is_empty())
            .map(|l| l.name.as_str())
            .collect()
    }

    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variable_names.iter().position(|n| n == name)
    }

    /// Joint owning variable `index`.
    pub fn variable_joint(&self, index: usize) -> Option<&Joint> {
        self.variables
            .get(index)
            .and_then(|l| self.links[*l].joint.as_ref())
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<String>> {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&[String]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Link pairs that never need collision checking: declared pairs plus
    /// every parent/child pair.  Each pair is ordered `(a, b)` with `a < b`.
    pub fn disabled_collision_pairs(&self) -> &BTreeSet<(String, String)> {
        &self.disabled_collisions
    }

    /// Default value of every variable: zero clamped into the joint limits.
    pub fn default_positions(&self) -> Vec<f64> {
        (0..self.variable_count())
            .map(|i| self.variable_joint(i).map_or(0.0, |j| j.clamp(0.0)))
            .collect()
    }

    /// Build from a serde description.
    pub fn from_description(desc: &RobotDescription) -> Result<RobotModel, ModelError> {
        desc.to_builder()?.build()
    }
}

fn ordered_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RobotModelBuilder
// ────────────────────────────────────────────────────────────────────────────

/// Incremental model construction.  Links must be added after their parent;
/// the first error encountered is reported by [`RobotModelBuilder::build`].
#[derive(Debug)]
pub struct RobotModelBuilder {
    name: String,
    links: Vec<Link>,
    link_index: BTreeMap<String, usize>,
    joint_names: BTreeSet<String>,
    groups: BTreeMap<String, Vec<String>>,
    disabled: Vec<(String, String)>,
    error: Option<ModelError>,
}

impl RobotModelBuilder {
    pub fn new(name: impl Into<String>, root_link: impl Into<String>) -> Self {
        let root_link = root_link.into();
        let mut builder = Self {
            name: name.into(),
            links: Vec::new(),
            link_index: BTreeMap::new(),
            joint_names: BTreeSet::new(),
            groups: BTreeMap::new(),
            disabled: Vec::new(),
            error: None,
        };
        if root_link.is_empty() {
            builder.error = Some(ModelError::MissingRoot);
        } else {
            builder.push_link(root_link, None, None);
        }
        builder
    }

    fn fail(&mut self, err: ModelError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn push_link(&mut self, name: String, parent: Option<usize>, joint: Option<Joint>) {
        let index = self.links.len();
        self.link_index.insert(name.clone(), index);
        self.links.push(Link {
            name,
            index,
            parent,
            joint,
            collision: Vec::new(),
        });
    }

    /// Add `name` as a child of `parent` through `joint`.
    pub fn link(mut self, name: impl Into<String>, parent: &str, joint: Joint) -> Self {
        let name = name.into();
        if self.link_index.contains_key(&name) {
            self.fail(ModelError::DuplicateLink(name));
            return self;
        }
        if !self.joint_names.insert(joint.name.clone()) {
            self.fail(ModelError::DuplicateJoint(joint.name));
            return self;
        }
        match self.link_index.get(parent).copied() {
            Some(p) => self.push_link(name, Some(p), Some(joint)),
            None => self.fail(ModelError::UnknownParent {
                link: name,
                parent: parent.to_string(),
            }),
        }
        self
    }

    /// Attach collision geometry to an existing link.
    pub fn collision(mut self, link: &str, shape: Shape, origin: Pose) -> Self {
        match self.link_index.get(link).copied() {
            Some(i) => self.links[i].collision.push(CollisionGeometry {
                shape: Arc::new(shape),
                origin,
            }),
            None => self.fail(ModelError::UnknownLink(link.to_string())),
        }
        self
    }

    pub fn group(mut self, name: impl Into<String>, links: &[&str]) -> Self {
        self.groups
            .insert(name.into(), links.iter().map(|l| l.to_string()).collect());
        self
    }

    /// Declare a link pair that never needs collision checking.
    pub fn disable_collision(mut self, a: &str, b: &str) -> Self {
        self.disabled.push((a.to_string(), b.to_string()));
        self
    }

    pub fn build(mut self) -> Result<RobotModel, ModelError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if self.links.is_empty() {
            return Err(ModelError::MissingRoot);
        }
        for links in self.groups.values() {
            if let Some(missing) = links.iter().find(|l| !self.link_index.contains_key(*l)) {
                return Err(ModelError::UnknownLink(missing.clone()));
            }
        }

        let mut variables = Vec::new();
        let mut variable_names = Vec::new();
        for link in &mut self.links {
            if let Some(joint) = link.joint.as_mut().filter(|j| !j.is_fixed()) {
                joint.variable = Some(variables.len());
                variables.push(link.index);
                variable_names.push(joint.name.clone());
            }
        }

        let mut disabled = BTreeSet::new();
        for (a, b) in &self.disabled {
            for l in [a, b] {
                if !self.link_index.contains_key(l) {
                    return Err(ModelError::UnknownLink(l.clone()));
                }
            }
            disabled.insert(ordered_pair(a, b));
        }
        for link in &self.links {
            if let Some(p) = link.parent {
                disabled.insert(ordered_pair(&self.links[p].name, &link.name));
            }
        }

        Ok(RobotModel {
            name: self.name,
            links: self.links,
            link_index: self.link_index,
            variables,
            variable_names,
            groups: self.groups,
            disabled_collisions: disabled,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Serde description
// ────────────────────────────────────────────────────────────────────────────

/// JSON-friendly robot description.
///
/// ```json
/// {
///   "name": "arm",
///   "root": "base",
///   "links": [
///     { "name": "upper", "parent": "base",
///       "joint": { "name": "shoulder", "type": "revolute", "axis": [0, 0, 1] },
///       "collision": [ { "geometry": { "type": "sphere", "radius": 0.1 } } ] }
///   ]
/// }
/// ```
///
/// Links may be listed in any order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotDescription {
    pub name: String,
    pub root: String,
    /// Collision geometry of the root link.
    pub root_collision: Vec<CollisionDescription>,
    pub links: Vec<LinkDescription>,
    pub groups: BTreeMap<String, Vec<String>>,
    pub disabled_collisions: Vec<[String; 2]>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkDescription {
    pub name: String,
    pub parent: String,
    pub joint: JointDescription,
    pub collision: Vec<CollisionDescription>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JointType {
    #[default]
    Fixed,
    Revolute,
    Prismatic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub joint_type: JointType,
    pub axis: [f64; 3],
    pub origin: PoseMsg,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Default for JointDescription {
    fn default() -> Self {
        Self {
            name: String::new(),
            joint_type: JointType::Fixed,
            axis: [0.0, 0.0, 1.0],
            origin: PoseMsg::identity(),
            lower: None,
            upper: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeometryDescription {
    Box { size: [f64; 3] },
    Sphere { radius: f64 },
    Cylinder { radius: f64, length: f64 },
    Cone { radius: f64, length: f64 },
    Mesh(MeshMsg),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionDescription {
    pub geometry: GeometryDescription,
    #[serde(default = "PoseMsg::identity")]
    pub origin: PoseMsg,
}

impl GeometryDescription {
    fn to_shape(&self, link: &str) -> Result<Shape, ModelError> {
        let shape = match self {
            GeometryDescription::Box { size } => Shape::Box { size: *size },
            GeometryDescription::Sphere { radius } => Shape::Sphere { radius: *radius },
            GeometryDescription::Cylinder { radius, length } => Shape::Cylinder {
                radius: *radius,
                length: *length,
            },
            GeometryDescription::Cone { radius, length } => Shape::Cone {
                radius: *radius,
                length: *length,
            },
            GeometryDescription::Mesh(mesh) => {
                Shape::from_msg(&planscene_geometry::ShapeMsg::Mesh(mesh.clone())).map_err(|e| {
                    ModelError::InvalidGeometry {
                        link: link.to_string(),
                        reason: e.to_string(),
                    }
                })?
            }
        };
        Ok(shape)
    }
}

impl RobotDescription {
    /// Order the links parent-first and feed them to a builder.
    pub fn to_builder(&self) -> Result<RobotModelBuilder, ModelError> {
        if self.root.is_empty() {
            return Err(ModelError::MissingRoot);
        }
        let mut builder = RobotModelBuilder::new(self.name.clone(), self.root.clone());
        for c in &self.root_collision {
            builder = builder.collision(&self.root, c.geometry.to_shape(&self.root)?, c.origin.to_isometry());
        }

        let mut known: BTreeSet<&str> = BTreeSet::from([self.root.as_str()]);
        let mut pending: Vec<&LinkDescription> = self.links.iter().collect();
        while !pending.is_empty() {
            let (ready, rest): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|l| known.contains(l.parent.as_str()));
            if ready.is_empty() {
                let all_names: BTreeSet<&str> = self
                    .links
                    .iter()
                    .map(|l| l.name.as_str())
                    .chain(std::iter::once(self.root.as_str()))
                    .collect();
                if let Some(orphan) = rest.iter().find(|l| !all_names.contains(l.parent.as_str())) {
                    return Err(ModelError::UnknownParent {
                        link: orphan.name.clone(),
                        parent: orphan.parent.clone(),
                    });
                }
                return Err(ModelError::Cyclic(rest.iter().map(|l| l.name.clone()).collect()));
            }
            for link in ready {
                builder = builder.link(link.name.clone(), &link.parent, link.joint.to_joint(&link.name));
                for c in &link.collision {
                    builder = builder.collision(
                        &link.name,
                        c.geometry.to_shape(&link.name)?,
                        c.origin.to_isometry(),
                    );
                }
                known.insert(link.name.as_str());
            }
            pending = rest;
        }

        for (name, links) in &self.groups {
            let refs: Vec<&str> = links.iter().map(String::as_str).collect();
            builder = builder.group(name.clone(), &refs);
        }
        for [a, b] in &self.disabled_collisions {
            builder = builder.disable_collision(a, b);
        }
        Ok(builder)
    }
}

impl JointDescription {
    fn to_joint(&self, link: &str) -> Joint {
        let name = if self.name.is_empty() {
            format!("{link}_joint")
        } else {
            self.name.clone()
        };
        let joint = match self.joint_type {
            JointType::Fixed => Joint::fixed(name),
            JointType::Revolute => Joint::revolute(name, self.axis),
            JointType::Prismatic => Joint::prismatic(name, self.axis),
        }
        .with_origin(self.origin.to_isometry());
        match (self.lower, self.upper) {
            (Some(lower), Some(upper)) => joint.with_limits(lower, upper),
            _ => joint,
        }
    }
}
