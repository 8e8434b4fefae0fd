//! Collision shapes and their message form.
//!
//! World objects and attached bodies hold shapes as `Arc<Shape>`: cloning a
//! world or forking a scene never copies shape data.
//!
//! [`ShapeMsg`] is the wire-side sum type.  Octrees have no `ShapeMsg` form;
//! they travel as octomap messages instead.

use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use planscene_types::{
    CollisionObject, MeshMsg, PlaneMsg, Pose, PoseMsg, PrimitiveKind, SceneError, SolidPrimitive,
};

use crate::octree::{Aabb, OcTree};

/// A collision shape in its own frame.
///
/// Cylinders and cones are aligned with their local Z axis and centred on the
/// origin.  Planes are the half-space `a·x + b·y + c·z + d ≤ 0`.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Box { size: [f64; 3] },
    Sphere { radius: f64 },
    Cylinder { radius: f64, length: f64 },
    Cone { radius: f64, length: f64 },
    Mesh { vertices: Vec<[f64; 3]>, triangles: Vec<[u32; 3]> },
    Plane { a: f64, b: f64, c: f64, d: f64 },
    OcTree(Arc<OcTree>),
}

impl Shape {
    /// Keyword used by the text encoding.
    pub fn keyword(&self) -> &'static str {
        match self {
            Shape::Box { .. } => "box",
            Shape::Sphere { .. } => "sphere",
            Shape::Cylinder { .. } => "cylinder",
            Shape::Cone { .. } => "cone",
            Shape::Mesh { .. } => "mesh",
            Shape::Plane { .. } => "plane",
            Shape::OcTree(_) => "octree",
        }
    }

    /// Box enclosing the shape in its own frame.  `None` for unbounded
    /// shapes (planes) and empty octrees / meshes.
    pub fn local_aabb(&self) -> Option<Aabb> {
        let origin = Point3::origin();
        match self {
            Shape::Box { size } => Some(Aabb::from_half_extents(
                origin,
                Vector3::new(size[0], size[1], size[2]) * 0.5,
            )),
            Shape::Sphere { radius } => {
                Some(Aabb::from_half_extents(origin, Vector3::repeat(*radius)))
            }
            Shape::Cylinder { radius, length } | Shape::Cone { radius, length } => Some(
                Aabb::from_half_extents(origin, Vector3::new(*radius, *radius, length * 0.5)),
            ),
            Shape::Mesh { vertices, .. } => {
                Aabb::from_points(vertices.iter().map(|v| Point3::new(v[0], v[1], v[2])))
            }
            Shape::Plane { .. } => None,
            Shape::OcTree(tree) => tree.bounding_box(),
        }
    }

    /// World-space box of the shape placed at `pose`.
    pub fn world_aabb(&self, pose: &Pose) -> Option<Aabb> {
        self.local_aabb().map(|b| b.transformed(pose))
    }

    /// Build a shape from its message form, validating dimensions.
    pub fn from_msg(msg: &ShapeMsg) -> Result<Shape, SceneError> {
        match msg {
            ShapeMsg::Primitive(p) => Self::from_primitive(p),
            ShapeMsg::Mesh(m) => Self::from_mesh(m),
            ShapeMsg::Plane(p) => {
                let [a, b, c, d] = p.coef;
                if a == 0.0 && b == 0.0 && c == 0.0 {
                    return Err(SceneError::Construct("plane normal is zero".into()));
                }
                Ok(Shape::Plane { a, b, c, d })
            }
        }
    }

    fn from_primitive(p: &SolidPrimitive) -> Result<Shape, SceneError> {
        let needed = match p.kind {
            PrimitiveKind::Box => 3,
            PrimitiveKind::Sphere => 1,
            PrimitiveKind::Cylinder | PrimitiveKind::Cone => 2,
        };
        if p.dimensions.len() < needed {
            return Err(SceneError::Construct(format!(
                "{:?} primitive needs {needed} dimensions, got {}",
                p.kind,
                p.dimensions.len()
            )));
        }
        if p.dimensions[..needed].iter().any(|d| !d.is_finite() || *d < 0.0) {
            return Err(SceneError::Construct(format!(
                "{:?} primitive has invalid dimensions {:?}",
                p.kind, p.dimensions
            )));
        }
        let d = &p.dimensions;
        Ok(match p.kind {
            PrimitiveKind::Box => Shape::Box {
                size: [d[0], d[1], d[2]],
            },
            PrimitiveKind::Sphere => Shape::Sphere { radius: d[0] },
            PrimitiveKind::Cylinder => Shape::Cylinder {
                length: d[0],
                radius: d[1],
            },
            PrimitiveKind::Cone => Shape::Cone {
                length: d[0],
                radius: d[1],
            },
        })
    }

    fn from_mesh(m: &MeshMsg) -> Result<Shape, SceneError> {
        if m.vertices.is_empty() || m.triangles.is_empty() {
            return Err(SceneError::Construct("mesh has no triangles".into()));
        }
        let n = m.vertices.len() as u32;
        if m.triangles.iter().flatten().any(|i| *i >= n) {
            return Err(SceneError::Construct(format!(
                "mesh triangle references a vertex beyond {n}"
            )));
        }
        Ok(Shape::Mesh {
            vertices: m.vertices.clone(),
            triangles: m.triangles.clone(),
        })
    }

    /// Message form of the shape; `None` for octrees.
    pub fn to_msg(&self) -> Option<ShapeMsg> {
        Some(match self {
            Shape::Box { size } => {
                ShapeMsg::Primitive(SolidPrimitive::cuboid(size[0], size[1], size[2]))
            }
            Shape::Sphere { radius } => ShapeMsg::Primitive(SolidPrimitive::sphere(*radius)),
            Shape::Cylinder { radius, length } => {
                ShapeMsg::Primitive(SolidPrimitive::cylinder(*length, *radius))
            }
            Shape::Cone { radius, length } => {
                ShapeMsg::Primitive(SolidPrimitive::cone(*length, *radius))
            }
            Shape::Mesh {
                vertices,
                triangles,
            } => ShapeMsg::Mesh(MeshMsg {
                vertices: vertices.clone(),
                triangles: triangles.clone(),
            }),
            Shape::Plane { a, b, c, d } => ShapeMsg::Plane(PlaneMsg {
                coef: [*a, *b, *c, *d],
            }),
            Shape::OcTree(_) => return None,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ShapeMsg
// ────────────────────────────────────────────────────────────────────────────

/// One shape as carried by a [`CollisionObject`].
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeMsg {
    Primitive(SolidPrimitive),
    Mesh(MeshMsg),
    Plane(PlaneMsg),
}

impl ShapeMsg {
    /// Append this shape (with its pose) to the matching list of `obj`.
    pub fn append_to(self, obj: &mut CollisionObject, pose: PoseMsg) {
        match self {
            ShapeMsg::Primitive(p) => {
                obj.primitives.push(p);
                obj.primitive_poses.push(pose);
            }
            ShapeMsg::Mesh(m) => {
                obj.meshes.push(m);
                obj.mesh_poses.push(pose);
            }
            ShapeMsg::Plane(p) => {
                obj.planes.push(p);
                obj.plane_poses.push(pose);
            }
        }
    }
}

/// Iterate the shapes of a collision object in canonical order
/// (primitives, then meshes, then planes), each with its pose message if one
/// was given.
pub fn shapes_of(obj: &CollisionObject) -> Vec<(ShapeMsg, Option<PoseMsg>)> {
    let primitives = obj
        .primitives
        .iter()
        .enumerate()
        .map(|(i, p)| (ShapeMsg::Primitive(p.clone()), obj.primitive_poses.get(i).copied()));
    let meshes = obj
        .meshes
        .iter()
        .enumerate()
        .map(|(i, m)| (ShapeMsg::Mesh(m.clone()), obj.mesh_poses.get(i).copied()));
    let planes = obj
        .planes
        .iter()
        .enumerate()
        .map(|(i, p)| (ShapeMsg::Plane(p.clone()), obj.plane_poses.get(i).copied()));
    primitives.chain(meshes).chain(planes).collect()
}
