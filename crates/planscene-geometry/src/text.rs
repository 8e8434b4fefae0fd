//! Line-oriented text encoding of poses and shapes.
//!
//! A pose is two lines: the translation `x y z` and the quaternion
//! `x y z w`.  A shape is its keyword line followed by its parameters:
//!
//! | Keyword    | Parameters |
//! |------------|------------|
//! | `box`      | `x y z` |
//! | `sphere`   | `radius` |
//! | `cylinder` | `radius length` |
//! | `cone`     | `radius length` |
//! | `mesh`     | `vertex_count triangle_count`, then one vertex / triangle per line |
//! | `plane`    | `a b c d` |
//!
//! [`TextReader`] mixes whole-line reads and whitespace-separated token reads
//! over the same cursor, so a file can interleave free-form names with
//! numeric fields.

use std::fmt::{self, Display, Write};
use std::str::FromStr;

use nalgebra::{Quaternion, Translation3, UnitQuaternion};
use planscene_types::{Pose, SceneError};

use crate::shapes::Shape;

/// Cursor over a text document supporting both line and token reads.
#[derive(Debug)]
pub struct TextReader<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> TextReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    /// True once only whitespace remains.
    pub fn at_end(&self) -> bool {
        self.text[self.pos..].trim_start().is_empty()
    }

    /// Current byte offset, usable with [`TextReader::seek`].
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.text.len());
    }

    /// Read the rest of the current line (without the newline).  `None` at
    /// end of input.
    pub fn line(&mut self) -> Option<&'a str> {
        if self.pos >= self.text.len() {
            return None;
        }
        let rest = &self.text[self.pos..];
        match rest.find('\n') {
            Some(i) => {
                self.pos += i + 1;
                Some(rest[..i].trim_end_matches('\r'))
            }
            None => {
                self.pos = self.text.len();
                Some(rest)
            }
        }
    }

    /// Read the next whitespace-delimited token.
    pub fn token(&mut self) -> Option<&'a str> {
        let rest = &self.text[self.pos..];
        let start = rest.len() - rest.trim_start().len();
        let tail = &rest[start..];
        if tail.is_empty() {
            self.pos = self.text.len();
            return None;
        }
        let len = tail.find(char::is_whitespace).unwrap_or(tail.len());
        self.pos += start + len;
        Some(&tail[..len])
    }

    /// Read and parse the next token; `what` names the field in the error.
    pub fn parse<T: FromStr>(&mut self, what: &str) -> Result<T, SceneError> {
        let tok = self
            .token()
            .ok_or_else(|| SceneError::Parse(format!("unexpected end of input reading {what}")))?;
        tok.parse()
            .map_err(|_| SceneError::Parse(format!("invalid {what}: '{tok}'")))
    }

    fn parse_array<const N: usize>(&mut self, what: &str) -> Result<[f64; N], SceneError> {
        let mut out = [0.0; N];
        for v in &mut out {
            *v = self.parse(what)?;
        }
        Ok(out)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Poses
// ────────────────────────────────────────────────────────────────────────────

/// Append the two-line text form of `pose`.
pub fn write_pose(out: &mut impl Write, pose: &Pose) -> fmt::Result {
    let t = pose.translation.vector;
    let q = pose.rotation.quaternion();
    write_line(out, [t.x, t.y, t.z])?;
    write_line(out, [q.i, q.j, q.k, q.w])
}

/// Read a pose written by [`write_pose`].  The quaternion is normalised.
pub fn read_pose(reader: &mut TextReader<'_>) -> Result<Pose, SceneError> {
    let [x, y, z] = reader.parse_array::<3>("translation")?;
    let [qx, qy, qz, qw] = reader.parse_array::<4>("rotation")?;
    let q = Quaternion::new(qw, qx, qy, qz);
    if q.norm() <= f64::EPSILON {
        return Err(SceneError::Parse("zero-length rotation quaternion".into()));
    }
    Ok(Pose::from_parts(
        Translation3::new(x, y, z),
        UnitQuaternion::from_quaternion(q),
    ))
}

// ────────────────────────────────────────────────────────────────────────────
// Shapes
// ────────────────────────────────────────────────────────────────────────────

/// Append the text form of `shape`.  Octrees are not representable and are
/// rejected.
pub fn write_shape(out: &mut impl Write, shape: &Shape) -> Result<(), SceneError> {
    if let Shape::OcTree(_) = shape {
        return Err(SceneError::Unsupported(
            "octrees have no text representation".into(),
        ));
    }
    writeln!(out, "{}", shape.keyword())?;
    match shape {
        Shape::Box { size } => write_line(out, *size)?,
        Shape::Sphere { radius } => write_line(out, [*radius])?,
        Shape::Cylinder { radius, length } | Shape::Cone { radius, length } => {
            write_line(out, [*radius, *length])?
        }
        Shape::Mesh {
            vertices,
            triangles,
        } => {
            write_line(out, [vertices.len(), triangles.len()])?;
            for v in vertices {
                write_line(out, *v)?;
            }
            for t in triangles {
                write_line(out, *t)?;
            }
        }
        Shape::Plane { a, b, c, d } => write_line(out, [*a, *b, *c, *d])?,
        Shape::OcTree(_) => {}
    }
    Ok(())
}

/// Read one shape written by [`write_shape`].
pub fn read_shape(reader: &mut TextReader<'_>) -> Result<Shape, SceneError> {
    let keyword = reader
        .token()
        .ok_or_else(|| SceneError::Parse("unexpected end of input reading shape".into()))?;
    let shape = match keyword {
        "box" => Shape::Box {
            size: reader.parse_array::<3>("box size")?,
        },
        "sphere" => Shape::Sphere {
            radius: reader.parse("sphere radius")?,
        },
        "cylinder" | "cone" => {
            let [radius, length] = reader.parse_array::<2>("radius and length")?;
            if keyword == "cylinder" {
                Shape::Cylinder { radius, length }
            } else {
                Shape::Cone { radius, length }
            }
        }
        "mesh" => {
            let vcount: usize = reader.parse("vertex count")?;
            let tcount: usize = reader.parse("triangle count")?;
            let mut vertices = Vec::with_capacity(vcount);
            for _ in 0..vcount {
                vertices.push(reader.parse_array::<3>("vertex")?);
            }
            let mut triangles = Vec::with_capacity(tcount);
            for _ in 0..tcount {
                let mut t = [0u32; 3];
                for i in &mut t {
                    *i = reader.parse("triangle index")?;
                }
                if t.iter().any(|i| *i as usize >= vcount) {
                    return Err(SceneError::Parse(format!(
                        "triangle index beyond vertex count {vcount}"
                    )));
                }
                triangles.push(t);
            }
            Shape::Mesh {
                vertices,
                triangles,
            }
        }
        "plane" => {
            let [a, b, c, d] = reader.parse_array::<4>("plane coefficients")?;
            Shape::Plane { a, b, c, d }
        }
        other => {
            return Err(SceneError::Parse(format!("unknown shape type '{other}'")));
        }
    };
    Ok(shape)
}

fn write_line<T: Display, const N: usize>(out: &mut impl Write, values: [T; N]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.write_char(' ')?;
        }
        write!(out, "{v}")?;
    }
    out.write_char('\n')
}
