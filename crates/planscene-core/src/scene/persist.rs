//! Scene geometry text format.
//!
//! ```text
//! <scene name>
//! * <object id>
//! <object pose: translation line, quaternion line>
//! <shape count>
//! <shape>  <shape pose>  <r g b a>      (once per shape; 0 0 0 0 = no color)
//! <subframe count>
//! <subframe name>  <subframe pose>      (once per subframe)
//! .
//! ```
//!
//! Files written before object poses and subframes were recorded omit both;
//! the loader tells the formats apart by whether the line after the first
//! `*` marker holds several fields.  The octomap is never saved.

use std::fmt::Write as _;
use std::io;
use std::sync::Arc;

use planscene_geometry::text::{TextReader, read_pose, read_shape, write_pose, write_shape};
use planscene_types::{ColorRgba, OCTOMAP_NS, Pose, SceneError};
use tracing::{debug, error};

use super::Scene;

impl Scene {
    pub fn save_geometry_to_string(&self) -> Result<String, SceneError> {
        let mut out = String::new();
        writeln!(out, "{}", self.name)?;
        let world = self.world();
        for id in world.object_ids() {
            if id == OCTOMAP_NS {
                continue;
            }
            let Some(obj) = world.object(&id) else {
                continue;
            };
            writeln!(out, "* {id}")?;
            write_pose(&mut out, &obj.pose)?;
            writeln!(out, "{}", obj.shapes.len())?;
            let color = self.object_color(&id);
            for (shape, pose) in obj.shapes.iter().zip(&obj.shape_poses) {
                write_shape(&mut out, shape)?;
                write_pose(&mut out, pose)?;
                match color {
                    Some(c) => writeln!(out, "{} {} {} {}", c.r, c.g, c.b, c.a)?,
                    None => out.push_str("0 0 0 0\n"),
                }
            }
            writeln!(out, "{}", obj.subframes.len())?;
            for (name, pose) in &obj.subframes {
                writeln!(out, "{name}")?;
                write_pose(&mut out, pose)?;
            }
        }
        out.push_str(".\n");
        Ok(out)
    }

    pub fn save_geometry(&self, mut out: impl io::Write) -> Result<(), SceneError> {
        let text = self.save_geometry_to_string()?;
        out.write_all(text.as_bytes())?;
        Ok(())
    }

    pub fn load_geometry(&mut self, text: &str) -> Result<(), SceneError> {
        self.load_geometry_with_offset(text, &Pose::identity())
    }

    /// Load objects from `text`, placing each object at `offset · pose`.
    ///
    /// Objects are merged into the world as they are read, so a malformed
    /// file leaves the objects before the error in place.
    pub fn load_geometry_with_offset(&mut self, text: &str, offset: &Pose) -> Result<(), SceneError> {
        let mut reader = TextReader::new(text);
        let Some(name) = reader.line() else {
            error!(parent: &self.span, "Bad input when loading scene geometry");
            return Err(parse_error("missing scene name"));
        };
        self.set_name(name);

        let new_format = detect_new_format(&mut reader);
        debug!(parent: &self.span, new_format, "Loading scene geometry");

        loop {
            let Some(marker) = reader.token() else {
                error!(parent: &self.span, "Bad input when loading marker in scene geometry");
                return Err(parse_error("unexpected end of input reading marker"));
            };
            match marker {
                "*" => self.load_object(&mut reader, offset, new_format).inspect_err(|e| {
                    error!(parent: &self.span, error = %e, "Failed to load object from scene geometry");
                })?,
                "." => return Ok(()),
                other => {
                    error!(parent: &self.span, marker = %other, "Unknown marker in scene geometry");
                    return Err(parse_error(&format!("unknown marker '{other}'")));
                }
            }
        }
    }

    fn load_object(&mut self, reader: &mut TextReader<'_>, offset: &Pose, new_format: bool) -> Result<(), SceneError> {
        let mut id = reader.line().map(str::trim).unwrap_or_default();
        if id.is_empty() {
            id = reader.line().map(str::trim).unwrap_or_default();
        }
        if id.is_empty() {
            return Err(parse_error("missing object id"));
        }

        let pose = if new_format { read_pose(reader)? } else { Pose::identity() };
        self.world_mut().set_object_pose(id, offset * pose);

        let shape_count: usize = reader.parse("shape count")?;
        for _ in 0..shape_count {
            let shape = read_shape(reader)?;
            let shape_pose = read_pose(reader)?;
            let mut rgba = [0.0f32; 4];
            for v in &mut rgba {
                *v = reader.parse("color")?;
            }
            self.world_mut()
                .add_shapes_to_object(id, vec![Arc::new(shape)], vec![shape_pose]);
            if rgba.iter().any(|v| *v > 0.0) {
                let [r, g, b, a] = rgba;
                self.set_object_color(id, ColorRgba::new(r, g, b, a));
            }
        }

        if new_format {
            let subframe_count: usize = reader.parse("subframe count")?;
            let mut subframes = std::collections::BTreeMap::new();
            for _ in 0..subframe_count {
                let name = reader
                    .token()
                    .ok_or_else(|| parse_error("unexpected end of input reading subframe name"))?;
                subframes.insert(name.to_string(), read_pose(reader)?);
            }
            self.world_mut().set_subframes_of_object(id, subframes);
        }
        Ok(())
    }
}

/// Peek at the line after the first object marker; leaves the reader where
/// it was.
fn detect_new_format(reader: &mut TextReader<'_>) -> bool {
    let start = reader.position();
    let mut new_format = false;
    while let Some(line) = reader.line() {
        if line.starts_with('*') {
            new_format = reader.line().is_some_and(|next| next.trim().contains(' '));
            break;
        }
    }
    reader.seek(start);
    new_format
}

fn parse_error(msg: &str) -> SceneError {
    SceneError::Parse(msg.to_string())
}
