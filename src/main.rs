use anyhow::Context;
use clap::{Parser, Subcommand};
use intona::analysis::pyin::AnalysisParams;
use intona::audio::file;
use intona::project::{self, ProjectFile};
use intona::session::EditorSession;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

fn init_logger(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();
}

#[derive(Parser, Debug)]
#[command(name = "intona", about = "Pitch analysis for monophonic vocal recordings")]
struct Args {
    /// Log level filter (e.g., error, warn, info, debug)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze an audio file and write a project file
    Analyze {
        /// Input audio file
        input: PathBuf,
        /// Output project JSON path
        #[arg(short, long)]
        project: PathBuf,
        /// Use deep-search analysis parameters
        #[arg(long)]
        deep: bool,
    },
    /// Export interchange formats from a project file
    Export {
        /// Input project JSON path
        input: PathBuf,
        /// Write the pitch track as CSV
        #[arg(long)]
        pitch_csv: Option<PathBuf>,
        /// Write the notes as CSV
        #[arg(long)]
        notes_csv: Option<PathBuf>,
        /// Write voiced pitch frames as a Sonic Visualiser layer
        #[arg(long)]
        pitch_svl: Option<PathBuf>,
        /// Write notes as a Sonic Visualiser layer
        #[arg(long)]
        notes_svl: Option<PathBuf>,
    },
    /// Decode an audio file and re-encode it as mono WAV
    Wav {
        /// Input audio file
        input: PathBuf,
        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);

    match args.command {
        Command::Analyze {
            input,
            project,
            deep,
        } => {
            let mut session = EditorSession::new();
            session
                .load_audio(&input)
                .with_context(|| format!("loading {input:?}"))?;

            let params = if deep {
                AnalysisParams::deep()
            } else {
                AnalysisParams::default()
            };
            let mut last_percent = 0u32;
            session
                .analyze(params, |v| {
                    let percent = (v * 100.0) as u32;
                    if percent >= last_percent + 10 {
                        last_percent = percent;
                        info!("analysis {percent}%");
                    }
                })
                .await?;

            let snapshot = session.current();
            info!(
                frames = snapshot.pitch.len(),
                voiced = snapshot.pitch.frames().iter().filter(|f| f.has_pitch).count(),
                "analysis complete"
            );

            let json = session.export_project().to_json();
            std::fs::write(&project, json).with_context(|| format!("writing {project:?}"))?;
            info!("project written to {project:?}");
        }
        Command::Export {
            input,
            pitch_csv,
            notes_csv,
            pitch_svl,
            notes_svl,
        } => {
            let json =
                std::fs::read_to_string(&input).with_context(|| format!("reading {input:?}"))?;
            let project = ProjectFile::from_json(&json)?;

            if let Some(path) = pitch_csv {
                std::fs::write(&path, project::pitch_to_csv(&project.pitch_data))?;
                info!("pitch CSV written to {path:?}");
            }
            if let Some(path) = notes_csv {
                std::fs::write(&path, project::notes_to_csv(&project.notes))?;
                info!("notes CSV written to {path:?}");
            }
            if let Some(path) = pitch_svl {
                std::fs::write(
                    &path,
                    project::pitch_to_svl(&project.pitch_data, project.sample_rate),
                )?;
                info!("pitch SVL written to {path:?}");
            }
            if let Some(path) = notes_svl {
                std::fs::write(
                    &path,
                    project::notes_to_svl(&project.notes, project.sample_rate),
                )?;
                info!("notes SVL written to {path:?}");
            }
        }
        Command::Wav { input, output } => {
            let buffer = file::decode(&input)?;
            file::save_wav(&buffer, &output)?;
            info!("mono WAV written to {output:?}");
        }
    }
    Ok(())
}
