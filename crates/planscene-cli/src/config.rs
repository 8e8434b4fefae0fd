//! CLI settings – reads/writes `~/.planscene/config.toml`.

use planscene_types::DEFAULT_SCENE_NAME;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.planscene/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Padding (metres) applied to every link of the padded environment.
    #[serde(default)]
    pub default_link_padding: f64,

    /// Scale applied to every link of the padded environment.
    #[serde(default = "default_link_scale")]
    pub default_link_scale: f64,

    /// Name given to the scene when the geometry file does not name it.
    #[serde(default = "default_scene_name")]
    pub scene_name: String,

    /// Upper bound on contacts reported by `check`.
    #[serde(default = "default_max_contacts")]
    pub max_contacts: usize,
}

fn default_link_scale() -> f64 {
    1.0
}
fn default_scene_name() -> String {
    DEFAULT_SCENE_NAME.to_string()
}
fn default_max_contacts() -> usize {
    16
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_link_padding: 0.0,
            default_link_scale: default_link_scale(),
            scene_name: default_scene_name(),
            max_contacts: default_max_contacts(),
        }
    }
}

/// Return the path to `~/.planscene/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".planscene").join("config.toml")
}

/// Load the config from disk with environment overrides applied.  A missing
/// file yields the defaults.
pub fn load() -> Result<Config, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Config, String> {
    let mut cfg = read_from(path)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// The file contents alone, without environment overrides.
pub(crate) fn read_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `PLANSCENE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PLANSCENE_LINK_PADDING` | `default_link_padding` |
/// | `PLANSCENE_LINK_SCALE` | `default_link_scale` |
/// | `PLANSCENE_SCENE_NAME` | `scene_name` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PLANSCENE_LINK_PADDING")
        && let Ok(padding) = v.parse::<f64>()
    {
        cfg.default_link_padding = padding;
    }
    if let Ok(v) = std::env::var("PLANSCENE_LINK_SCALE")
        && let Ok(scale) = v.parse::<f64>()
    {
        cfg.default_link_scale = scale;
    }
    if let Ok(v) = std::env::var("PLANSCENE_SCENE_NAME") {
        cfg.scene_name = v;
    }
}

/// Save the config to disk, creating `~/.planscene/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.default_link_padding = 0.02;
        cfg.max_contacts = 4;
        save_to(&cfg, &path).expect("save");

        let loaded = read_from(&path).expect("load ok");
        assert_eq!(loaded.default_link_padding, 0.02);
        assert_eq!(loaded.default_link_scale, 1.0);
        assert_eq!(loaded.max_contacts, 4);
    }

    #[test]
    fn config_path_points_to_planscene_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".planscene"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let cfg = read_from(&path).expect("no error");
        assert_eq!(cfg.default_link_scale, 1.0);
        assert_eq!(cfg.max_contacts, 16);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_contacts = 3\n").expect("write");
        let cfg = read_from(&path).expect("load ok");
        assert_eq!(cfg.max_contacts, 3);
        assert_eq!(cfg.scene_name, DEFAULT_SCENE_NAME);
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_contacts = \"many\"\n").expect("write");
        let err = load_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn apply_env_overrides_changes_padding() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("PLANSCENE_LINK_PADDING", "0.05") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.default_link_padding, 0.05);
        unsafe { std::env::remove_var("PLANSCENE_LINK_PADDING") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_scale() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("PLANSCENE_LINK_SCALE", "huge") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.default_link_scale, 1.0);
        unsafe { std::env::remove_var("PLANSCENE_LINK_SCALE") };
    }

    #[test]
    fn apply_env_overrides_changes_scene_name() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("PLANSCENE_SCENE_NAME", "bench") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.scene_name, "bench");
        unsafe { std::env::remove_var("PLANSCENE_SCENE_NAME") };
    }
}
