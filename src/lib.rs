//! # exg-prep — EEG artifact removal and epoch assembly in Rust
//!
//! `exg-prep` turns raw multichannel EEG sessions into a shuffled dataset
//! of labelled, fixed-length epochs for a downstream classifier. Artifacts
//! are removed by independent component analysis with an injectable
//! exclusion decision (operator prompt, answer file, or automated scoring).
//!
//! ## Pipeline overview
//!
//! ```text
//! raw session [C_raw, T]
//!   │
//!   ├─ ingest::ingest()              marker channel split off, ch_1 … ch_N
//!   ├─ events::find_events()         marker onsets → annotations
//!   ├─ montage::calibrate()          ch_i → spatial label, montage attached
//!   ├─ interpolate::interpolate_bads spherical spline over bad channels
//!   ├─ filter::bandpass()            Butterworth SOS, zero phase, 1–45 Hz
//!   ├─ ica::Ica::fit()               FastICA (linfa-ica), k = 20
//!   ├─ ica::DecisionProvider         which components to exclude
//!   ├─ ica::Ica::apply()             X − A[:, excl] · S[excl, :]
//!   └─ io::save_recording()          cleaned checkpoint
//!        │
//!   Recording::concatenate()         all checkpoints, boundary annotations
//!   events::events_from_annotations  global event dictionary
//!   epoch::assemble()                [tmin, tmax] windows + drop log
//!   dataset::Dataset                 seeded shuffle → export
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use exg_prep::{batch, FixedAnswer, PipelineConfig};
//! use std::path::Path;
//!
//! let cfg = PipelineConfig::from_json_file(Path::new("pipeline.json")).unwrap();
//! let mut provider = FixedAnswer("0 1".into());
//! let (report, dataset) = batch::run(&cfg, &mut provider).unwrap();
//! println!("{} epochs, labels {:?}", dataset.len(), report.label_counts);
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use exg_prep::{bandpass, ingest, Ica, IcaConfig, IngestConfig};
//! use ndarray::Array2;
//!
//! let raw: Array2<f64> = Array2::zeros((65, 75_000));
//! let (rec, marker) = ingest(&raw, 250.0, &IngestConfig::default()).unwrap();
//! let filtered = bandpass(&rec, 1.0, 45.0, 4).unwrap();
//! let mut ica = Ica::fit(&filtered, &IcaConfig::default()).unwrap();
//! ica.set_exclude([0, 3].into_iter().collect()).unwrap();
//! let cleaned = ica.apply(&filtered).unwrap();
//! # let _ = (marker, cleaned);
//! ```

pub mod batch;
pub mod config;
pub mod dataset;
pub mod epoch;
pub mod error;
pub mod events;
pub mod filter;
pub mod ica;
pub mod ingest;
pub mod interpolate;
mod linalg;
pub mod io;
pub mod montage;
pub mod recording;
pub mod spectrum;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{PipelineConfig, RecordingGroup, RecordingSpec};

// errors
pub use error::{PrepError, Result, Stage, StageError};

// data model
pub use recording::{Annotation, Channel, ChannelKind, Recording};

// stages
pub use dataset::Dataset;
pub use epoch::{assemble, DropEntry, DropReason, Epoch, EpochParams, Epochs};
pub use events::{
    annotations_from_events, events_from_annotations, find_events, offset_events,
    EventDictionary, EventMarker, FindEvents,
};
pub use filter::bandpass;
pub use ica::{
    isolate, parse_selection, AnswerFile, DecisionProvider, FixedAnswer, HeuristicConfig,
    HeuristicProvider, Ica, IcaConfig, IndependentComponent, Review, StdinPrompt,
};
pub use ingest::{ingest, IngestConfig};
pub use interpolate::{interpolate_bads, mark_bad};
pub use montage::{calibrate, ChannelMap, Montage};

// io — safetensors helpers
pub use io::{load_raw_session, load_recording, save_raw_session, save_recording, StWriter};
