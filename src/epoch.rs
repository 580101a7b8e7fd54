//! Event-locked epoching.
//!
//! For each event whose code is in the target set, the window
//! `[sample + round(tmin·sfreq), … + round((tmax − tmin)·sfreq))` is cut
//! from the continuous `[C, T]` data. No baseline correction is applied. A
//! window that does not lie fully inside `[0, T)` is dropped with
//! [`DropReason::OutOfBounds`]; it is never truncated. Every candidate event
//! appears in the drop log, kept or not.
use std::collections::BTreeSet;
use std::fmt;

use log::info;
use ndarray::{s, Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};
use crate::events::EventMarker;
use crate::recording::Recording;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochParams {
    /// Window start relative to the event, seconds. Default: `0.0`.
    pub tmin: f64,
    /// Window end relative to the event, seconds. Default: `3.0`.
    pub tmax: f64,
    /// Event codes to epoch. Default: `[3, 4]`.
    pub codes: Vec<i32>,
    /// Also drop windows overlapping a `BAD…` annotation (concatenation
    /// boundaries included). Default: `false`.
    pub reject_by_annotation: bool,
}

impl Default for EpochParams {
    fn default() -> Self {
        Self { tmin: 0.0, tmax: 3.0, codes: vec![3, 4], reject_by_annotation: false }
    }
}

impl EpochParams {
    /// `(start offset, length)` of the window in samples at `sfreq`.
    pub fn window_samples(&self, sfreq: f64) -> (i64, usize) {
        let offset = (self.tmin * sfreq).round() as i64;
        let len = ((self.tmax - self.tmin) * sfreq).round() as usize;
        (offset, len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Window extends past either end of the recording.
    OutOfBounds,
    /// Window overlaps a rejection annotation with this description.
    Boundary(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::OutOfBounds => f.write_str("OUT_OF_BOUNDS"),
            DropReason::Boundary(desc) => f.write_str(desc),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropEntry {
    pub event: EventMarker,
    /// `None` when the epoch was kept.
    pub reason: Option<DropReason>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Epoch {
    pub event: EventMarker,
    /// First sample of the window in the source recording.
    pub start: usize,
    /// `[C, n_times]`.
    pub data: Array2<f64>,
    /// Class label (the event code).
    pub label: i32,
}

#[derive(Debug, Clone)]
pub struct Epochs {
    pub epochs: Vec<Epoch>,
    pub drop_log: Vec<DropEntry>,
    pub tmin: f64,
    pub tmax: f64,
    pub sfreq: f64,
    pub ch_labels: Vec<String>,
}

impl Epochs {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn n_dropped(&self) -> usize {
        self.drop_log.iter().filter(|d| d.reason.is_some()).count()
    }

    pub fn labels(&self) -> Vec<i32> {
        self.epochs.iter().map(|e| e.label).collect()
    }

    /// Restrict to `codes`, keeping the already extracted windows and the
    /// matching drop-log entries.
    pub fn select(&self, codes: &[i32]) -> Epochs {
        let keep: BTreeSet<i32> = codes.iter().copied().collect();
        Epochs {
            epochs: self.epochs.iter().filter(|e| keep.contains(&e.label)).cloned().collect(),
            drop_log: self
                .drop_log
                .iter()
                .filter(|d| keep.contains(&d.event.code))
                .cloned()
                .collect(),
            tmin: self.tmin,
            tmax: self.tmax,
            sfreq: self.sfreq,
            ch_labels: self.ch_labels.clone(),
        }
    }

    /// Stack into `[N, C, n_times]`.
    pub fn to_array3(&self) -> Array3<f64> {
        let (n_ch, n_t) = self.epochs.first().map(|e| e.data.dim()).unwrap_or((0, 0));
        let mut out = Array3::<f64>::zeros((self.epochs.len(), n_ch, n_t));
        for (i, e) in self.epochs.iter().enumerate() {
            out.slice_mut(s![i, .., ..]).assign(&e.data);
        }
        out
    }
}

/// Cut epochs from `rec` around every event in `events` whose code is in
/// `params.codes`.
pub fn assemble(rec: &Recording, events: &[EventMarker], params: &EpochParams) -> Result<Epochs> {
    if !(params.tmax > params.tmin) {
        return Err(PrepError::InvalidParameter(format!(
            "tmax ({}) must exceed tmin ({})",
            params.tmax, params.tmin
        )));
    }
    let sfreq = rec.sfreq();
    let (offset, n_win) = window_samples_checked(params, sfreq)?;
    let n_t = rec.n_times() as i64;
    let targets: BTreeSet<i32> = params.codes.iter().copied().collect();

    let bad_spans: Vec<(i64, i64, &str)> = if params.reject_by_annotation {
        rec.annotations
            .iter()
            .filter(|a| a.is_bad())
            .map(|a| {
                let a0 = (a.onset * sfreq).round() as i64;
                let a1 = a0 + (a.duration * sfreq).round() as i64;
                (a0, a1, a.description.as_str())
            })
            .collect()
    } else {
        Vec::new()
    };

    let mut epochs = Vec::new();
    let mut drop_log = Vec::new();
    for ev in events.iter().filter(|e| targets.contains(&e.code)) {
        let start = ev.sample as i64 + offset;
        let end = start + n_win as i64;

        let reason = if start < 0 || end > n_t {
            Some(DropReason::OutOfBounds)
        } else {
            bad_spans
                .iter()
                .find(|&&(a0, a1, _)| {
                    if a1 == a0 {
                        start < a0 && a0 < end
                    } else {
                        a0 < end && a1 > start
                    }
                })
                .map(|&(_, _, desc)| DropReason::Boundary(desc.to_string()))
        };

        if reason.is_none() {
            let start = start as usize;
            epochs.push(Epoch {
                event: ev.clone(),
                start,
                data: rec.data.slice(s![.., start..start + n_win]).to_owned(),
                label: ev.code,
            });
        }
        drop_log.push(DropEntry { event: ev.clone(), reason });
    }

    let out = Epochs {
        epochs,
        drop_log,
        tmin: params.tmin,
        tmax: params.tmax,
        sfreq,
        ch_labels: rec.ch_labels().iter().map(|s| s.to_string()).collect(),
    };
    info!(
        "epoched {} of {} candidate events ({} dropped), window {} samples",
        out.len(),
        out.drop_log.len(),
        out.n_dropped(),
        n_win
    );
    Ok(out)
}

fn window_samples_checked(params: &EpochParams, sfreq: f64) -> Result<(i64, usize)> {
    let (offset, n_win) = params.window_samples(sfreq);
    if n_win == 0 {
        return Err(PrepError::InvalidParameter(format!(
            "window [{}, {}] s is shorter than one sample at {sfreq} Hz",
            params.tmin, params.tmax
        )));
    }
    Ok((offset, n_win))
}
