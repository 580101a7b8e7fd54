//! The batch run over every configured recording group.
//!
//! ```text
//! per recording   ingest → find_events → annotate → calibrate
//!                 → interpolate bads → bandpass → ICA fit → decision
//!                 → reconstruct → checkpoint
//! once            concatenate → events_from_annotations → epochs
//!                 → shuffle → export
//! ```
//!
//! A failing recording is recorded in the [`BatchReport`] and the others
//! carry on. Only one recording is in memory during the per-recording
//! stages; the shared stages reload the checkpoints and run only when every
//! recording has one. A later run with `resume` reuses the checkpoints that
//! exist.
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::config::{PipelineConfig, RecordingGroup, RecordingSpec};
use crate::dataset::Dataset;
use crate::epoch;
use crate::error::{PrepError, Stage, StageContext, StageError};
use crate::events::{self, EventMarker};
use crate::filter;
use crate::ica::{decision, DecisionProvider, Ica};
use crate::ingest::ingest;
use crate::interpolate::{interpolate_bads, mark_bad};
use crate::io;
use crate::montage::{calibrate, ChannelMap, Montage};
use crate::recording::Recording;

type StageResult<T> = std::result::Result<T, StageError>;

/// Per-recording result.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOutcome {
    pub id: String,
    pub group: String,
    /// Marker events found at ingestion; `None` when resumed.
    pub n_events: Option<usize>,
    /// Excluded components; `None` when resumed.
    pub excluded: Option<BTreeSet<usize>>,
    pub resumed: bool,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub recordings: Vec<RecordingOutcome>,
    pub failures: Vec<StageError>,
    /// Events on the concatenated recording matching the global dictionary.
    pub n_events: usize,
    pub n_epochs: usize,
    pub n_dropped: usize,
    pub label_counts: BTreeMap<i32, usize>,
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("invalid batch configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("{} recording(s) failed, first: {}", .0.failures.len(), first_failure(.0))]
    Incomplete(BatchReport),
}

fn first_failure(report: &BatchReport) -> String {
    report.failures.first().map(ToString::to_string).unwrap_or_default()
}

/// Ingest, calibrate, interpolate and filter one raw session, annotating it
/// with the events on its marker channel.
pub fn prepare_recording(
    spec: &RecordingSpec,
    group: &RecordingGroup,
    montage: &Montage,
    cfg: &PipelineConfig,
) -> StageResult<(Recording, Vec<EventMarker>)> {
    let id = spec.id.as_str();
    let (raw, file_sfreq) = io::load_raw_session(&spec.path).at_stage(id, Stage::Ingest)?;
    let sfreq = file_sfreq.unwrap_or(cfg.sfreq);
    let (mut rec, marker) = ingest(&raw, sfreq, &cfg.ingest).at_stage(id, Stage::Ingest)?;
    drop(raw);

    let found = events::find_events(&marker, &group.event_dict, &cfg.find_events);
    info!("{id}: {} events on the marker channel", found.len());
    rec.annotations.extend(events::annotations_from_events(&found, sfreq));

    let default_map;
    let map = if group.channel_map.0.is_empty() {
        default_map = ChannelMap::cap64();
        &default_map
    } else {
        &group.channel_map
    };
    let mut rec = calibrate(&rec, map, montage).at_stage(id, Stage::Calibrate)?;

    mark_bad(&mut rec, &spec.bad_channels).at_stage(id, Stage::Interpolate)?;
    let rec = interpolate_bads(&rec).at_stage(id, Stage::Interpolate)?;
    if !spec.bad_channels.is_empty() {
        info!("{id}: interpolated {:?}", spec.bad_channels);
    }

    let rec = filter::bandpass(&rec, cfg.l_freq, cfg.h_freq, cfg.filter_order)
        .at_stage(id, Stage::Filter)?;
    Ok((rec, found))
}

/// Decompose, ask `provider` which components to drop, and reconstruct.
pub fn clean_recording(
    id: &str,
    filtered: &Recording,
    cfg: &PipelineConfig,
    provider: &mut dyn DecisionProvider,
) -> StageResult<(Recording, BTreeSet<usize>)> {
    let mut ica = Ica::fit(filtered, &cfg.ica).at_stage(id, Stage::Decompose)?;
    let exclude = decision::request_exclusions(id, filtered, &ica, provider).at_stage(id, Stage::Select)?;
    ica.set_exclude(exclude.clone()).at_stage(id, Stage::Select)?;
    let cleaned = ica.apply(filtered).at_stage(id, Stage::Reconstruct)?;
    Ok((cleaned, exclude))
}

/// Produce the cleaned checkpoint of one recording and return its path.
/// With `cfg.resume` an existing checkpoint is validated and reused.
pub fn process_recording(
    spec: &RecordingSpec,
    group: &RecordingGroup,
    montage: &Montage,
    cfg: &PipelineConfig,
    provider: &mut dyn DecisionProvider,
) -> StageResult<(PathBuf, RecordingOutcome)> {
    let id = spec.id.as_str();
    let ckpt = cfg.checkpoint_path(id);
    if cfg.resume && ckpt.exists() {
        io::StFile::open(&ckpt).at_stage(id, Stage::Checkpoint)?;
        info!("{id}: resumed from {}", ckpt.display());
        let outcome = RecordingOutcome {
            id: spec.id.clone(),
            group: group.name.clone(),
            n_events: None,
            excluded: None,
            resumed: true,
        };
        return Ok((ckpt, outcome));
    }

    let (filtered, found) = prepare_recording(spec, group, montage, cfg)?;
    let (cleaned, excluded) = clean_recording(id, &filtered, cfg, provider)?;
    drop(filtered);

    ensure_dir(&cfg.checkpoint_dir).at_stage(id, Stage::Checkpoint)?;
    io::save_recording(&cleaned, &ckpt).at_stage(id, Stage::Checkpoint)?;
    info!("{id}: checkpoint written to {}", ckpt.display());

    let outcome = RecordingOutcome {
        id: spec.id.clone(),
        group: group.name.clone(),
        n_events: Some(found.len()),
        excluded: Some(excluded),
        resumed: false,
    };
    Ok((ckpt, outcome))
}

/// Reload the cleaned checkpoints, concatenate them in order, epoch them on
/// the global dictionary and return the shuffled dataset.
pub fn assemble_dataset(
    checkpoints: &[PathBuf],
    cfg: &PipelineConfig,
    report: &mut BatchReport,
) -> StageResult<Dataset> {
    const ALL: &str = "concatenated";
    let cleaned = checkpoints
        .iter()
        .map(|p| io::load_recording(p).at_stage(&p.display().to_string(), Stage::Checkpoint))
        .collect::<StageResult<Vec<Recording>>>()?;
    let concat = Recording::concatenate(&cleaned).at_stage(ALL, Stage::Concatenate)?;

    let global = events::events_from_annotations(&concat, &cfg.event_dict);
    let per_recording: Vec<Vec<EventMarker>> = cleaned
        .iter()
        .map(|r| events::events_from_annotations(r, &cfg.event_dict))
        .collect();
    let lengths: Vec<usize> = cleaned.iter().map(Recording::n_times).collect();
    drop(cleaned);
    let offset = events::offset_events(&per_recording, &lengths).at_stage(ALL, Stage::Events)?;
    if offset != global {
        warn!(
            "{} events from the concatenated annotations, {} from offsetting each recording",
            global.len(),
            offset.len()
        );
    }
    report.n_events = global.len();

    let epochs = epoch::assemble(&concat, &global, &cfg.epochs).at_stage(ALL, Stage::Epoch)?;
    drop(concat);
    report.n_epochs = epochs.len();
    report.n_dropped = epochs.n_dropped();
    if epochs.n_dropped() > 0 {
        warn!("{} of {} candidate epochs dropped", epochs.n_dropped(), epochs.drop_log.len());
    }

    let mut ds = Dataset::from_epochs(epochs);
    ds.shuffle(cfg.seed);
    report.label_counts = ds.label_counts();
    Ok(ds)
}

/// Run every configured recording, then build and export the dataset to
/// `cfg.output`.
pub fn run(
    cfg: &PipelineConfig,
    provider: &mut dyn DecisionProvider,
) -> std::result::Result<(BatchReport, Dataset), BatchError> {
    let dups = cfg.duplicate_ids();
    if !dups.is_empty() {
        return Err(BatchError::Config(format!("recording ids listed more than once: {dups:?}")));
    }
    if cfg.groups.iter().all(|g| g.recordings.is_empty()) {
        return Err(BatchError::Config("no recordings configured".into()));
    }
    let montage = Montage::from_file(&cfg.montage)
        .map_err(|e| StageError::new(cfg.montage.display().to_string(), Stage::Calibrate, e))?;

    let mut report = BatchReport::default();
    let mut checkpoints = Vec::new();
    for group in &cfg.groups {
        info!("group '{}': {} recordings", group.name, group.recordings.len());
        for spec in &group.recordings {
            match process_recording(spec, group, &montage, cfg, provider) {
                Ok((ckpt, outcome)) => {
                    checkpoints.push(ckpt);
                    report.recordings.push(outcome);
                }
                Err(e) => {
                    warn!("{e}");
                    report.failures.push(e);
                }
            }
        }
    }
    if !report.failures.is_empty() {
        return Err(BatchError::Incomplete(report));
    }

    let ds = assemble_dataset(&checkpoints, cfg, &mut report)?;
    if let Some(parent) = cfg.output.parent() {
        ensure_dir(parent).at_stage("dataset", Stage::Export)?;
    }
    ds.export(&cfg.output).at_stage("dataset", Stage::Export)?;
    info!(
        "dataset: {} epochs, labels {:?}, {} dropped",
        report.n_epochs, report.label_counts, report.n_dropped
    );
    Ok((report, ds))
}

fn ensure_dir(dir: &Path) -> crate::error::Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(PrepError::from)
}
