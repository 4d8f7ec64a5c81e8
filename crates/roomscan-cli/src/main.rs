//! `roomscan` – room analysis from the command line.
//!
//! 1. `analyze` reads a JSON [`PointCloud`] from a file or stdin, runs the
//!    [`RoomPipeline`] and writes the [`RoomReport`] as JSON to stdout.
//! 2. `synth` writes a seeded synthetic room scan, handy for trying
//!    `analyze` without a scanner.
//! 3. `schema` prints the JSON Schema of the report.
//! 4. `defaults` prints the effective configuration as TOML; `init` saves
//!    the defaults to `~/.roomscan/config.toml`.
//!
//! Logs go to stderr so stdout stays machine-readable.

mod args;
mod config;

use std::io::{Read, Write};
use std::process::ExitCode;

use colored::Colorize;
use roomscan_perception::{PipelineConfig, RoomPipeline};
use roomscan_perception::synthetic::SyntheticRoom;
use roomscan_types::{PointCloud, RoomReport};
use serde::Serialize;
use tracing::{debug, info};

use args::{Command, Input, SynthArgs};

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the level (default "info"); ROOMSCAN_LOG_FORMAT=json
    // switches to newline-delimited JSON.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("ROOMSCAN_LOG_FORMAT").as_deref() == Ok("json") {
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

    let result = args::parse(std::env::args().skip(1)).and_then(run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cmd: Command) -> Result<(), String> {
    match cmd {
        Command::Analyze {
            input,
            config,
            compact,
        } => {
            let cfg = config::resolve(config.as_deref())?;
            let report = analyze(&input, cfg.pipeline)?;
            print_summary(&report);
            write_json(&report, cfg.output.pretty && !compact)
        }
        Command::Synth(synth) => {
            let cloud = synthesize(&synth).build();
            info!(points = cloud.len(), "synthetic scan generated");
            write_json(&cloud, false)
        }
        Command::Schema => write_json(&roomscan_perception::report_schema(), true),
        Command::Defaults { config } => {
            let cfg = config::resolve(config.as_deref())?;
            print!("{}", config::to_toml(&cfg)?);
            Ok(())
        }
        Command::Init => {
            let path = config::save(&config::Config::default())?;
            eprintln!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            Ok(())
        }
        Command::Help => {
            print_help();
            Ok(())
        }
    }
}

fn analyze(input: &Input, pipeline: PipelineConfig) -> Result<RoomReport, String> {
    let raw = match input {
        Input::Stdin => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            buf
        }
        Input::File(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?,
    };
    let cloud: PointCloud =
        serde_json::from_str(&raw).map_err(|e| format!("Failed to parse point cloud: {}", e))?;
    debug!(points = cloud.len(), "point cloud loaded");

    let pipeline =
        RoomPipeline::new(pipeline).map_err(|e| format!("Invalid configuration: {}", e))?;
    pipeline.run(&cloud).map_err(|e| e.to_string())
}

fn synthesize(args: &SynthArgs) -> SyntheticRoom {
    let mut room = SyntheticRoom::new(args.length, args.width, args.height);
    if let Some(s) = args.spacing {
        room = room.with_spacing(s);
    }
    if let Some(n) = args.noise {
        room = room.with_noise(n);
    }
    if let Some(seed) = args.seed {
        room = room.with_seed(seed);
    }
    if !args.walls {
        room = room.without_walls();
    }
    if !args.ceiling {
        room = room.without_ceiling();
    }
    for &(a, b) in &args.boxes {
        room = room.with_box(a, b);
    }
    room
}

fn write_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| format!("Failed to serialize output: {}", e))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", json).map_err(|e| format!("Failed to write output: {}", e))
}

// ─────────────────────────────────────────────────────────────────────────────
// Human-readable output (stderr)
// ─────────────────────────────────────────────────────────────────────────────

fn print_summary(report: &RoomReport) {
    let d = &report.dimensions;
    eprintln!();
    eprintln!(
        "  {} {:.2} × {:.2} × {:.2} m  ({}, confidence {:.2})",
        "Room".bold(),
        d.length,
        d.width,
        d.height,
        d.accuracy.label(),
        d.confidence
    );
    for obj in &report.objects {
        eprintln!(
            "    • {} {} at ({:.2}, {:.2}, {:.2})  {:.2}",
            obj.id.to_string().dimmed(),
            obj.object_type.as_str().bold(),
            obj.position.x,
            obj.position.y,
            obj.position.z,
            obj.confidence
        );
    }
    let clear = if report.accessibility.has_clear_pathways {
        "clear pathways".green()
    } else {
        "crowded".yellow()
    };
    eprintln!(
        "  {} {} relationship(s), {:.0}% free floor, {}",
        "Layout".bold(),
        report.relationships.len(),
        report.accessibility.free_space_ratio * 100.0,
        clear
    );
    eprintln!();
}

fn print_help() {
    println!();
    println!("{}", "roomscan Commands".bold().underline());
    println!("  {}  – analyse a JSON point cloud (file or '-')", "analyze".bold().cyan());
    println!("  {}    – generate a synthetic room scan", "synth".bold().cyan());
    println!("  {}   – print the report JSON Schema", "schema".bold().cyan());
    println!("  {} – print the effective configuration", "defaults".bold().cyan());
    println!("  {}     – save defaults to ~/.roomscan/config.toml", "init".bold().cyan());
    println!();
    println!(
        "  Environment: {} {} {}",
        "RUST_LOG".dimmed(),
        "ROOMSCAN_LOG_FORMAT=json".dimmed(),
        "ROOMSCAN_*".dimmed()
    );
    println!();
}
