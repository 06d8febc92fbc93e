//! StoryReel command line driver
//!
//! Runs image and animation batches against the local data directory
//! without the HTTP server.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;

use storyreel_lib::core::generative::{MotionType, ProviderKind};
use storyreel_lib::core::pipeline::{AnimationParams, AnimationStatusReport, SceneFailure};
use storyreel_lib::core::settings::{resolve_data_dir, SettingsManager};
use storyreel_lib::{init_logging_with, AppState, LogConsole};

#[derive(Parser, Debug)]
#[command(name = "storyreel-cli", version)]
struct Cli {
    /// Data directory (defaults to STORYREEL_DATA_DIR or the platform data dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List image or video providers and their availability.
    Providers {
        #[arg(long, default_value = "image")]
        kind: ProviderKind,
    },
    /// Generate one image per scene of a project.
    GenerateImages {
        project: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Start animating every scene of a project that has an image.
    Animate(AnimateArgs),
    /// Check a video job once.
    Status {
        task: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Poll a video job until it finishes.
    Wait {
        task: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Write the editor manifest for a project's clips.
    Prepare { project: String },
}

#[derive(Parser, Debug)]
struct AnimateArgs {
    project: String,

    #[arg(long)]
    provider: Option<String>,

    /// Clip length in seconds (1-10).
    #[arg(long)]
    duration: Option<f64>,

    /// Camera motion (auto, zoom_in, zoom_out, pan_left, pan_right, tilt_up, tilt_down).
    #[arg(long, default_value = "auto")]
    motion: MotionType,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir.clone());
    // stdout carries command output only
    init_logging_with(&data_dir.join("logs"), LogConsole::Stderr);

    let settings = SettingsManager::new(data_dir.clone()).load_with_env();
    let state = AppState::from_settings(&settings, &data_dir)
        .with_context(|| format!("open data dir '{}'", data_dir.display()))?;
    let orchestrator = state.orchestrator;

    match cli.cmd {
        Command::Providers { kind } => {
            let providers = orchestrator.list_providers(kind);
            if cli.json {
                return print_json(&providers);
            }
            for p in providers {
                let marker = if p.is_default { "*" } else { " " };
                let availability = match (&p.available, &p.unavailable_reason) {
                    (true, _) => "available".to_string(),
                    (false, Some(reason)) => format!("unavailable ({})", reason),
                    (false, None) => "unavailable".to_string(),
                };
                println!(
                    "{} {:<11} {:<22} {}",
                    marker,
                    p.name.as_str(),
                    p.display_name,
                    availability
                );
            }
        }
        Command::GenerateImages { project, provider } => {
            let report = orchestrator
                .generate_images(&project, provider.as_deref())
                .await
                .with_context(|| format!("generate images for project {}", project))?;
            if cli.json {
                return print_json(&report);
            }
            println!(
                "{}: {}/{} images via {}",
                serde_label(&report.status),
                report.images_generated,
                report.total_scenes,
                report.provider
            );
            for image in &report.images {
                println!("  ok    {} -> {}", image.title, image.url);
            }
            print_failures(&report.failures);
        }
        Command::Animate(args) => {
            let params = AnimationParams {
                provider: args.provider,
                duration: args.duration,
                motion: args.motion,
            };
            let report = orchestrator
                .animate_scenes(&args.project, &params)
                .await
                .with_context(|| format!("animate project {}", args.project))?;
            if cli.json {
                return print_json(&report);
            }
            println!(
                "{}: {}/{} scenes submitted to {}",
                serde_label(&report.status),
                report.animated,
                report.total_scenes,
                report.provider
            );
            for task in &report.tasks {
                let detail = task
                    .video_url
                    .clone()
                    .or_else(|| task.task_id.clone())
                    .unwrap_or_default();
                println!("  {:<10} {} {}", task.status, task.scene_title, detail);
            }
            print_failures(&report.failures);
        }
        Command::Status { task, provider } => {
            let report = orchestrator
                .get_animation_status(&task, provider.as_deref())
                .await?;
            print_status(&report, cli.json)?;
        }
        Command::Wait { task, provider } => {
            let report = orchestrator
                .wait_for_animation(&task, provider.as_deref())
                .await?;
            print_status(&report, cli.json)?;
        }
        Command::Prepare { project } => {
            let package = orchestrator
                .prepare_for_editor(&project)
                .await
                .with_context(|| format!("prepare project {}", project))?;
            if cli.json {
                return print_json(&package);
            }
            println!(
                "{} clips ready; manifest at {}",
                package.total_clips,
                package.manifest_path.display()
            );
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn serde_label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn print_failures(failures: &[SceneFailure]) {
    for failure in failures {
        println!("  fail  {} [{}] {}", failure.title, failure.kind, failure.error);
    }
}

fn print_status(report: &AnimationStatusReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    println!("{} ({}): {}", report.task_id, report.provider, report.status);
    if let Some(progress) = report.progress {
        println!("  progress {:.0}%", progress);
    }
    if let Some(url) = &report.video_url {
        println!("  video {}", url);
    }
    if let Some(error) = &report.error {
        println!("  error {}", error);
    }
    Ok(())
}
