//! Canonical multichannel recording and its metadata.
//!
//! A [`Recording`] is a `[C, T]` `f64` matrix plus the sampling rate, an
//! ordered channel list, annotations, and (after calibration) a montage.
//! Stages derive new recordings from old ones; the sampling rate is fixed at
//! construction and has no setter.
use log::debug;
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};
use crate::montage::Montage;

/// Description of the annotation inserted at each concatenation junction.
pub const BOUNDARY_BAD: &str = "BAD boundary";
/// Companion annotation marking the edge between two concatenated recordings.
pub const BOUNDARY_EDGE: &str = "EDGE boundary";

/// Sampling rates closer than this are treated as equal.
const SFREQ_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Eeg,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Eeg => "eeg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Identifier assigned at ingestion (`ch_1`, `ch_2`, …).
    pub ident: String,
    /// Canonical spatial label; equals `ident` until calibration.
    pub label: String,
    pub kind: ChannelKind,
    pub bad: bool,
    pub interpolated: bool,
}

impl Channel {
    pub fn eeg(ident: impl Into<String>) -> Self {
        let ident = ident.into();
        Self {
            label: ident.clone(),
            ident,
            kind: ChannelKind::Eeg,
            bad: false,
            interpolated: false,
        }
    }
}

/// Time-stamped labelled interval. Onset and duration are in seconds from
/// the first sample of the recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub onset: f64,
    pub duration: f64,
    pub description: String,
}

impl Annotation {
    /// `true` for rejection annotations (description starts with `BAD`).
    pub fn is_bad(&self) -> bool {
        self.description.to_uppercase().starts_with("BAD")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    /// `[C, T]` signal.
    pub data: Array2<f64>,
    sfreq: f64,
    pub channels: Vec<Channel>,
    pub annotations: Vec<Annotation>,
    pub montage: Option<Montage>,
}

impl Recording {
    /// Build a recording, checking that `channels` matches the row count
    /// and the sampling rate is usable.
    pub fn new(data: Array2<f64>, sfreq: f64, channels: Vec<Channel>) -> Result<Self> {
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(PrepError::Format(format!("invalid sampling rate {sfreq}")));
        }
        if channels.len() != data.nrows() {
            return Err(PrepError::Format(format!(
                "{} channel descriptors for {} data rows",
                channels.len(),
                data.nrows()
            )));
        }
        Ok(Self { data, sfreq, channels, annotations: Vec::new(), montage: None })
    }

    #[inline]
    pub fn sfreq(&self) -> f64 {
        self.sfreq
    }

    #[inline]
    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    pub fn duration_secs(&self) -> f64 {
        self.n_times() as f64 / self.sfreq
    }

    pub fn ch_labels(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.label.as_str()).collect()
    }

    pub fn channel_index(&self, label: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.label == label)
    }

    /// Derive a recording with the same metadata and new sample data.
    ///
    /// The shape must match: stages never change channel or sample count.
    pub fn with_data(&self, data: Array2<f64>) -> Result<Self> {
        if data.dim() != self.data.dim() {
            return Err(PrepError::Format(format!(
                "derived data shape {:?} differs from source {:?}",
                data.dim(),
                self.data.dim()
            )));
        }
        Ok(Self {
            data,
            sfreq: self.sfreq,
            channels: self.channels.clone(),
            annotations: self.annotations.clone(),
            montage: self.montage.clone(),
        })
    }

    /// Concatenate recordings along time.
    ///
    /// Every recording must share the channel labels (same order) and the
    /// sampling rate, otherwise [`PrepError::ConcatenationMismatch`] is
    /// returned and nothing is allocated. Annotations are shifted by the
    /// cumulative duration of the preceding recordings, and a pair of
    /// zero-length [`BOUNDARY_BAD`] / [`BOUNDARY_EDGE`] annotations is
    /// inserted at every junction.
    pub fn concatenate(recordings: &[Recording]) -> Result<Recording> {
        let first = recordings.first().ok_or_else(|| {
            PrepError::ConcatenationMismatch("no recordings to concatenate".into())
        })?;
        let labels = first.ch_labels();

        for (i, r) in recordings.iter().enumerate().skip(1) {
            if (r.sfreq - first.sfreq).abs() > SFREQ_TOLERANCE {
                return Err(PrepError::ConcatenationMismatch(format!(
                    "recording {i} sampled at {} Hz, expected {} Hz",
                    r.sfreq, first.sfreq
                )));
            }
            let other = r.ch_labels();
            if other != labels {
                return Err(PrepError::ConcatenationMismatch(format!(
                    "recording {i} has channels {other:?}, expected {labels:?}"
                )));
            }
        }

        let n_ch = first.n_channels();
        let total: usize = recordings.iter().map(Recording::n_times).sum();
        let mut data = Array2::<f64>::zeros((n_ch, total));
        let mut channels = first.channels.clone();
        let mut annotations = Vec::new();
        let mut offset = 0usize;

        for (i, r) in recordings.iter().enumerate() {
            let n_t = r.n_times();
            data.slice_mut(s![.., offset..offset + n_t]).assign(&r.data);

            let onset_shift = offset as f64 / first.sfreq;
            if i > 0 {
                for desc in [BOUNDARY_BAD, BOUNDARY_EDGE] {
                    annotations.push(Annotation {
                        onset: onset_shift,
                        duration: 0.0,
                        description: desc.to_string(),
                    });
                }
            }
            annotations.extend(r.annotations.iter().map(|a| Annotation {
                onset: a.onset + onset_shift,
                ..a.clone()
            }));

            for (dst, src) in channels.iter_mut().zip(&r.channels) {
                dst.bad |= src.bad;
                dst.interpolated |= src.interpolated;
            }
            offset += n_t;
        }

        debug!(
            "concatenated {} recordings into {} ch x {} samples",
            recordings.len(),
            n_ch,
            total
        );

        Ok(Recording {
            data,
            sfreq: first.sfreq,
            channels,
            annotations,
            montage: first.montage.clone(),
        })
    }

    /// Sample indices of the junctions recorded by [`Recording::concatenate`].
    pub fn boundary_samples(&self) -> Vec<usize> {
        self.annotations
            .iter()
            .filter(|a| a.description == BOUNDARY_BAD)
            .map(|a| (a.onset * self.sfreq).round() as usize)
            .collect()
    }
}
