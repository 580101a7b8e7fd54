use anyhow::{Context, Result};
use clap::Parser;
use exg_prep::{batch, AnswerFile, DecisionProvider, HeuristicProvider, PipelineConfig, StdinPrompt};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "preproc", about = "EEG artifact removal and epoch assembly")]
struct Args {
    /// Pipeline configuration (JSON)
    #[arg(long)]
    config: PathBuf,

    /// JSON answers `{recording id: "0 3 7"}` instead of prompting
    #[arg(long, conflicts_with = "auto")]
    answers: Option<PathBuf>,

    /// Pick components automatically from artifact scores
    #[arg(long)]
    auto: bool,

    /// Reuse existing checkpoints
    #[arg(long)]
    resume: bool,

    /// Override the dataset output path
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = PipelineConfig::from_json_file(&args.config)?;
    cfg.resume |= args.resume;
    if let Some(out) = args.output {
        cfg.output = out;
    }

    let mut provider: Box<dyn DecisionProvider> = if let Some(path) = &args.answers {
        Box::new(
            AnswerFile::from_path(path)
                .with_context(|| format!("loading answers {}", path.display()))?,
        )
    } else if args.auto {
        Box::new(HeuristicProvider::new(cfg.heuristics.clone()))
    } else {
        Box::new(StdinPrompt::stdio())
    };

    let (report, dataset) = batch::run(&cfg, provider.as_mut())?;
    println!(
        "{} recordings, {} events, {} epochs ({} dropped)",
        report.recordings.len(),
        report.n_events,
        dataset.len(),
        report.n_dropped
    );
    for (label, n) in &report.label_counts {
        println!("  label {label}: {n}");
    }
    println!("Written → {}", cfg.output.display());
    Ok(())
}
