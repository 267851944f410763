//! Form Sensing CLI Entry Point
//!
//! Replays recorded landmark or measurement streams through an exercise
//! session and prints the per-frame and per-repetition feedback as JSON
//! lines. For library use, see lib.rs.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use form_sensing::{
    ExerciseConfig, ExerciseSession, FeatureFrame, FeatureId, FrameOutcome, PoseFrame, Rule,
    SessionConfig, View,
};

#[derive(Parser)]
#[command(name = "form-sensing", version, about = "Repetition and form feedback from landmark streams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines frame recording through a session
    Replay {
        /// Exercise rule file (.json or .toml)
        #[arg(long)]
        exercise: PathBuf,

        /// Frame recording, one JSON object per line
        #[arg(long)]
        frames: PathBuf,

        /// Camera view, overrides the session config
        #[arg(long)]
        view: Option<View>,

        /// Session tunables (.toml)
        #[arg(long)]
        session: Option<PathBuf>,
    },

    /// Validate an exercise file and list its rules
    Check {
        #[arg(long)]
        exercise: PathBuf,
    },
}

/// One recorded line: either raw landmarks or precomputed measurements.
///
/// Poses are tried first since they require `keypoints`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayRecord {
    Pose(PoseFrame),
    Measurements(MeasurementRecord),
}

/// Precomputed measurements. `tracking` must be present but may be `null`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MeasurementRecord {
    #[serde(deserialize_with = "Option::deserialize")]
    tracking: Option<f32>,
    #[serde(default)]
    features: BTreeMap<String, Option<f32>>,
}

#[derive(Serialize)]
struct FrameLine<'a> {
    frame: usize,
    #[serde(flatten)]
    outcome: &'a FrameOutcome,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            exercise,
            frames,
            view,
            session,
        } => replay(&exercise, &frames, view, session.as_deref()),
        Commands::Check { exercise } => check(&exercise),
    }
}

fn load_exercise(path: &Path) -> Result<(ExerciseConfig, Vec<Rule>)> {
    let exercise = ExerciseConfig::load(path)
        .with_context(|| format!("loading exercise {}", path.display()))?;
    match exercise.compile() {
        Ok(rules) => Ok((exercise, rules)),
        Err(err) => {
            warn!(path = %path.display(), %err, "exercise rejected");
            Err(err).with_context(|| format!("compiling exercise {}", path.display()))
        }
    }
}

fn replay(
    exercise_path: &Path,
    frames_path: &Path,
    view: Option<View>,
    session_path: Option<&Path>,
) -> Result<()> {
    let (exercise, rules) = load_exercise(exercise_path)?;

    let mut config = match session_path {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading session config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(view) = view {
        config.view = view;
    }

    config.validate()?;
    let mut session = ExerciseSession::new(rules, config);
    info!(exercise = %exercise.exercise, view = %session.view(), "replay started");

    let reader = BufReader::new(
        File::open(frames_path).with_context(|| format!("opening {}", frames_path.display()))?,
    );
    let mut out = BufWriter::new(io::stdout().lock());
    let mut frame_index = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", frames_path.display()))?;
        if line.trim().is_empty() {
            continue;
        }

        let record: ReplayRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(err) => {
                warn!(line = line_no + 1, %err, "skipping unreadable frame");
                continue;
            }
        };

        let outcome = match record {
            ReplayRecord::Measurements(record) => {
                let frame = measurement_frame(&record.features, line_no + 1);
                session.process_frame(record.tracking.unwrap_or(f32::NAN), &frame)
            }
            ReplayRecord::Pose(pose) => session.process_pose(&pose),
        };

        serde_json::to_writer(
            &mut out,
            &FrameLine {
                frame: frame_index,
                outcome: &outcome,
            },
        )?;
        writeln!(out)?;
        frame_index += 1;
    }
    out.flush()?;

    info!(
        frames = frame_index,
        reps = session.reps_completed(),
        "replay finished"
    );
    Ok(())
}

fn measurement_frame(features: &BTreeMap<String, Option<f32>>, line: usize) -> FeatureFrame {
    let mut frame = FeatureFrame::new();
    for (name, value) in features {
        match name.parse::<FeatureId>() {
            Ok(id) => frame.set(id, value.unwrap_or(f32::NAN)),
            Err(err) => warn!(line, %err, "ignoring measurement"),
        }
    }
    frame
}

fn check(path: &Path) -> Result<()> {
    let (exercise, rules) = load_exercise(path)?;

    println!("{}: {} rules", exercise.exercise, rules.len());
    for rule in &rules {
        let target = rule
            .target_phase
            .map(|phase| phase.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<20} {:?}/{:?}/{:?} phase={} front={} side={}",
            rule.id,
            rule.kind.rule_type(),
            rule.granularity,
            rule.comparator,
            target,
            fmt_threshold(rule.threshold(View::Front)),
            fmt_threshold(rule.threshold(View::Side)),
        );
    }
    Ok(())
}

fn fmt_threshold(threshold: Option<f32>) -> String {
    threshold.map_or_else(|| "-".to_string(), |t| t.to_string())
}
