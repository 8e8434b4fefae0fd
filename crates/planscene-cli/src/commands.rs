//! Command handlers.  Each builds its answer from a loaded [`Scene`];
//! presentation is left to `main`.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use planscene_collision::{CollisionRequest, CollisionResult};
use planscene_core::Scene;
use planscene_robot::RobotDescription;
use tracing::{debug, info};

use crate::config::Config;

/// Build a scene from a robot description (JSON) and, optionally, a scene
/// geometry file.  Padding, scale and the fallback scene name come from
/// `cfg`.
pub fn load_scene(cfg: &Config, robot: &Path, geometry: Option<&Path>) -> Result<Scene, String> {
    let raw = fs::read_to_string(robot)
        .map_err(|e| format!("Failed to read robot description at {}: {}", robot.display(), e))?;
    let desc: RobotDescription =
        serde_json::from_str(&raw).map_err(|e| format!("Failed to parse robot description: {}", e))?;
    let mut scene = Scene::from_description(&desc).map_err(|e| e.to_string())?;
    scene.set_name(cfg.scene_name.clone());

    {
        let mut env = scene.collision_env_mut();
        env.set_padding(cfg.default_link_padding);
        env.set_scale(cfg.default_link_scale);
    }

    if let Some(path) = geometry {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scene geometry at {}: {}", path.display(), e))?;
        scene.load_geometry(&text).map_err(|e| e.to_string())?;
        if scene.name().is_empty() {
            scene.set_name(cfg.scene_name.clone());
        }
    }
    info!(
        scene = %scene.name(),
        robot = %desc.name,
        objects = scene.world().object_ids().len(),
        "Loaded scene"
    );
    Ok(scene)
}

/// Apply `joint=value` assignments to the scene's current state.
pub fn set_joints(scene: &mut Scene, assignments: &[String]) -> Result<(), String> {
    for assignment in assignments {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| format!("Expected joint=value, got '{}'", assignment))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| format!("Invalid value for joint '{}': '{}'", name, value))?;
        if !scene.current_state_mut().set_variable_position(name.trim(), value) {
            return Err(format!("Unknown joint '{}'", name));
        }
        debug!(joint = %name, value, "Set joint position");
    }
    Ok(())
}

/// Scene summary followed by the known-object listing.
pub fn inspect(scene: &Scene, out: &mut impl Write) -> io::Result<()> {
    let model = scene.robot_model();
    writeln!(out, "Scene:          {}", scene.name())?;
    writeln!(out, "Robot:          {}", model.name())?;
    writeln!(out, "Planning frame: {}", scene.planning_frame())?;
    writeln!(out, "Links:          {}", model.link_names().join(", "))?;
    let frames = scene.transforms().all_transforms().len();
    writeln!(out, "Fixed frames:   {}", frames)?;
    scene.print_known_objects(out)
}

/// The full scene message as pretty-printed JSON.
pub fn scene_json(scene: &Scene) -> Result<String, String> {
    serde_json::to_string_pretty(&scene.planning_scene_msg()).map_err(|e| format!("Failed to serialize scene: {}", e))
}

/// Outcome of `check`.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub colliding: bool,
    /// Contact count per colliding pair.
    pub pairs: BTreeMap<(String, String), usize>,
}

/// Collision check of the current state against the world and itself.
pub fn check(scene: &Scene, cfg: &Config, group: &str) -> CheckReport {
    let req = CollisionRequest {
        group_name: group.to_string(),
        contacts: true,
        max_contacts: cfg.max_contacts.max(1),
        ..CollisionRequest::default()
    };
    let mut res = CollisionResult::default();
    scene.check_collision(&req, &mut res);
    CheckReport {
        colliding: res.collision,
        pairs: res
            .contacts
            .iter()
            .map(|(pair, contacts)| (pair.clone(), contacts.len()))
            .collect(),
    }
}
