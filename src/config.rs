//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable parameter of the batch run, plus
//! the table of recording groups it processes. All fields have defaults
//! matching the imagery study the pipeline was built for, and every field
//! may be omitted from the JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::epoch::EpochParams;
use crate::events::{EventDictionary, FindEvents};
use crate::ica::{HeuristicConfig, IcaConfig};
use crate::ingest::IngestConfig;
use crate::montage::ChannelMap;

/// Configuration for the full batch run.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use exg_prep::PipelineConfig;
///
/// let cfg = PipelineConfig {
///     h_freq: 40.0,   // lower lowpass edge
///     seed: 7,
///     ..PipelineConfig::default()
/// };
/// assert_eq!(cfg.l_freq, 1.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sampling rate assumed for raw sessions that carry none. Default: `250.0`.
    pub sfreq: f64,

    pub ingest: IngestConfig,

    /// Montage file (`.xyz` or `.json`). Relative paths resolve against the
    /// configuration file's directory.
    pub montage: PathBuf,

    /// Highpass edge of the bandpass, Hz. Default: `1.0`.
    pub l_freq: f64,

    /// Lowpass edge of the bandpass, Hz. Default: `45.0`.
    pub h_freq: f64,

    /// Butterworth order per edge. Default: `4`.
    pub filter_order: usize,

    pub ica: IcaConfig,

    /// Parameters of the automated decision provider.
    pub heuristics: HeuristicConfig,

    pub find_events: FindEvents,

    /// Label → code dictionary used on the concatenated recording. Group
    /// labels missing here are not epoched.
    pub event_dict: EventDictionary,

    /// Epoch window and target codes.
    pub epochs: EpochParams,

    /// Dataset shuffle seed. Default: `42`.
    pub seed: u64,

    /// Directory for cleaned-recording checkpoints.
    pub checkpoint_dir: PathBuf,

    /// Exported dataset file.
    pub output: PathBuf,

    /// Reuse existing checkpoints instead of recomputing them.
    pub resume: bool,

    pub groups: Vec<RecordingGroup>,
}

/// Recordings that share a channel map and an event dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingGroup {
    pub name: String,
    /// Identifier → label. Empty means the 64-channel cap layout.
    pub channel_map: ChannelMap,
    pub event_dict: EventDictionary,
    pub recordings: Vec<RecordingSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSpec {
    /// Unique id, also the checkpoint file stem and the answer-file key.
    pub id: String,
    /// Raw session file.
    pub path: PathBuf,
    /// Labels to interpolate.
    pub bad_channels: Vec<String>,
}

/// Study-wide label → code table applied to the concatenated recording.
pub fn study_event_dict() -> EventDictionary {
    let pairs = [
        ("motor execution up", 1),
        ("motor execution down", 2),
        ("visual perception up", 3),
        ("visual perception down", 4),
        ("imagery up", 5),
        ("imagery down", 6),
        ("imagery and perception up", 7),
        ("imagery and perception down", 8),
    ];
    // Static table with distinct codes and labels.
    EventDictionary::new(pairs).unwrap_or_default()
}

impl Default for PipelineConfig {
    /// 250 Hz, 64 + 1 channels, 1–45 Hz, 20 components, epochs `[0, 3]` s
    /// on codes 3 and 4 (visual perception up and down).
    fn default() -> Self {
        Self {
            sfreq: 250.0,
            ingest: IngestConfig::default(),
            montage: PathBuf::from("montage.xyz"),
            l_freq: 1.0,
            h_freq: 45.0,
            filter_order: 4,
            ica: IcaConfig::default(),
            heuristics: HeuristicConfig::default(),
            find_events: FindEvents::default(),
            event_dict: study_event_dict(),
            epochs: EpochParams::default(),
            seed: 42,
            checkpoint_dir: PathBuf::from("checkpoints"),
            output: PathBuf::from("dataset.safetensors"),
            resume: false,
            groups: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load from JSON. Relative paths are resolved against the file's
    /// directory.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut cfg: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        if let Some(base) = path.parent() {
            cfg.resolve_paths(base);
        }
        Ok(cfg)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.montage);
        fix(&mut self.checkpoint_dir);
        fix(&mut self.output);
        for g in &mut self.groups {
            for r in &mut g.recordings {
                fix(&mut r.path);
            }
        }
    }

    /// Checkpoint file for `recording_id`.
    pub fn checkpoint_path(&self, recording_id: &str) -> PathBuf {
        self.checkpoint_dir.join(format!("{recording_id}_clean.safetensors"))
    }

    /// Recording id → count across all groups, for ids listed more than once.
    pub fn duplicate_ids(&self) -> BTreeMap<&str, usize> {
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for r in self.groups.iter().flat_map(|g| &g.recordings) {
            *seen.entry(r.id.as_str()).or_insert(0) += 1;
        }
        seen.retain(|_, n| *n > 1);
        seen
    }
}
