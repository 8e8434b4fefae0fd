//! `planscene-cli` – command line front end for planning scenes.
//!
//! ```text
//! planscene inspect <robot.json> [-g scene-file]
//! planscene json    <robot.json> [-g scene-file]
//! planscene check   <robot.json> [-g scene-file] [--group NAME] [joint=value ...]
//! planscene config  [init]
//! ```
//!
//! Settings come from `~/.planscene/config.toml` with `PLANSCENE_*`
//! environment overrides.

mod commands;
mod config;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

/// Load, inspect and collision-check robot planning scenes.
#[derive(Parser, Debug)]
#[command(name = "planscene", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scene summary and known objects
    Inspect {
        #[command(flatten)]
        scene: SceneFiles,
    },

    /// Full scene message as JSON
    Json {
        #[command(flatten)]
        scene: SceneFiles,
    },

    /// Collision check of the current state
    Check {
        #[command(flatten)]
        scene: SceneFiles,

        /// Planning group to check (all links when empty)
        #[arg(long, default_value = "")]
        group: String,

        /// Joint positions as JOINT=VALUE
        #[arg(value_name = "JOINT=VALUE")]
        joints: Vec<String>,
    },

    /// Show or create ~/.planscene/config.toml
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
enum ConfigAction {
    /// Write the default configuration file
    Init,
}

/// Files a scene is built from.
#[derive(Args, Debug)]
struct SceneFiles {
    /// Robot description (JSON)
    robot: PathBuf,

    /// Scene geometry file
    #[arg(short, long)]
    geometry: Option<PathBuf>,
}

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (default "info"); PLANSCENE_LOG_FORMAT=json
    // switches to newline-delimited JSON.  Command output goes to stdout.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("PLANSCENE_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Inspect { scene } => cmd_inspect(&scene),
        Command::Json { scene } => cmd_json(&scene),
        Command::Check { scene, group, joints } => cmd_check(&scene, &group, &joints),
        Command::Config { action } => cmd_config(action),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn load(args: &SceneFiles, cfg: &config::Config) -> Result<planscene_core::Scene, String> {
    commands::load_scene(cfg, &args.robot, args.geometry.as_deref())
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_inspect(args: &SceneFiles) -> Result<(), String> {
    let cfg = config::load()?;
    let scene = load(args, &cfg)?;
    commands::inspect(&scene, &mut std::io::stdout().lock()).map_err(|e| e.to_string())
}

fn cmd_json(args: &SceneFiles) -> Result<(), String> {
    let cfg = config::load()?;
    let scene = load(args, &cfg)?;
    println!("{}", commands::scene_json(&scene)?);
    Ok(())
}

fn cmd_check(args: &SceneFiles, group: &str, joints: &[String]) -> Result<(), String> {
    let cfg = config::load()?;
    let mut scene = load(args, &cfg)?;
    commands::set_joints(&mut scene, joints)?;
    let report = commands::check(&scene, &cfg, group);

    if !report.colliding {
        println!("  {} {}", "✓".green().bold(), "State is collision free".green());
        return Ok(());
    }
    println!("  {} {}", "✗".red().bold(), "State is in collision".red().bold());
    for ((a, b), count) in &report.pairs {
        println!("    • {} ↔ {} ({} contact(s))", a.bold(), b.bold(), count);
    }
    Ok(())
}

fn cmd_config(action: Option<ConfigAction>) -> Result<(), String> {
    match action {
        Some(ConfigAction::Init) => {
            config::save(&config::Config::default())?;
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            );
            Ok(())
        }
        None => {
            let cfg = config::load()?;
            println!("{}", "Effective configuration".bold().underline());
            println!("  default_link_padding : {}", cfg.default_link_padding.to_string().yellow());
            println!("  default_link_scale   : {}", cfg.default_link_scale.to_string().yellow());
            println!("  scene_name           : {}", cfg.scene_name.yellow());
            println!("  max_contacts         : {}", cfg.max_contacts.to_string().yellow());
            println!("  file                 : {}", config::config_path().display().to_string().dimmed());
            Ok(())
        }
    }
}
