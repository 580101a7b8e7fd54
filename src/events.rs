//! Event extraction from marker pulses and annotations.
//!
//! - [`find_events`]: onsets on the marker channel (`mne.find_events` with
//!   `consecutive='increasing'`).
//! - [`annotations_from_events`] / [`events_from_annotations`]: convert
//!   between sample-indexed events and time-stamped annotations through an
//!   [`EventDictionary`].
//! - [`offset_events`]: merge per-recording event lists onto the timeline of
//!   the concatenated recording.
use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};
use crate::recording::{Annotation, Recording, BOUNDARY_BAD, BOUNDARY_EDGE};

/// Label → integer marker code for one recording group.
///
/// Codes are unique within a dictionary; different groups may map the same
/// label to different codes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, i32>", into = "BTreeMap<String, i32>")]
pub struct EventDictionary {
    by_label: BTreeMap<String, i32>,
    by_code: BTreeMap<i32, String>,
}

impl EventDictionary {
    pub fn new<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        let mut by_label = BTreeMap::new();
        let mut by_code = BTreeMap::new();
        for (label, code) in pairs {
            let label = label.into();
            if let Some(prev) = by_code.insert(code, label.clone()) {
                return Err(PrepError::InvalidParameter(format!(
                    "event code {code} assigned to both '{prev}' and '{label}'"
                )));
            }
            if by_label.insert(label.clone(), code).is_some() {
                return Err(PrepError::InvalidParameter(format!("label '{label}' listed twice")));
            }
        }
        Ok(Self { by_label, by_code })
    }

    pub fn code(&self, label: &str) -> Option<i32> {
        self.by_label.get(label).copied()
    }

    pub fn label(&self, code: i32) -> Option<&str> {
        self.by_code.get(&code).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.by_label.iter().map(|(l, &c)| (l.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

impl TryFrom<BTreeMap<String, i32>> for EventDictionary {
    type Error = PrepError;

    fn try_from(map: BTreeMap<String, i32>) -> Result<Self> {
        Self::new(map)
    }
}

impl From<EventDictionary> for BTreeMap<String, i32> {
    fn from(d: EventDictionary) -> Self {
        d.by_label
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMarker {
    pub sample: usize,
    pub code: i32,
    pub label: Option<String>,
}

/// Options for [`find_events`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindEvents {
    /// Pulses lasting fewer samples are discarded. Default: `1`.
    pub min_duration_samples: usize,

    /// Onsets less than this many samples after the previously kept onset
    /// are discarded (the first pulse wins). `0` disables. Default: `0`.
    pub merge_window: usize,

    /// Report a non-zero first sample as an event. Default: `false`.
    pub initial_event: bool,
}

impl Default for FindEvents {
    fn default() -> Self {
        Self { min_duration_samples: 1, merge_window: 0, initial_event: false }
    }
}

/// Detect pulse onsets on `marker` and resolve their labels with `dict`.
///
/// An onset is a sample whose value is non-zero and greater than the
/// previous sample. The code is the value rounded to an integer. Codes
/// missing from `dict` are kept with `label: None`.
pub fn find_events(marker: &[f64], dict: &EventDictionary, opts: &FindEvents) -> Vec<EventMarker> {
    let mut out: Vec<EventMarker> = Vec::new();
    let mut unknown: BTreeSet<i32> = BTreeSet::new();
    let (mut n_short, mut n_merged) = (0usize, 0usize);

    for t in 0..marker.len() {
        let cur = marker[t];
        let is_onset = if t == 0 {
            opts.initial_event && cur != 0.0
        } else {
            cur != 0.0 && cur > marker[t - 1]
        };
        if !is_onset {
            continue;
        }

        let duration = marker[t..].iter().take_while(|&&v| v == cur).count();
        if duration < opts.min_duration_samples {
            n_short += 1;
            continue;
        }
        if let Some(prev) = out.last() {
            if opts.merge_window > 0 && t - prev.sample < opts.merge_window {
                n_merged += 1;
                continue;
            }
        }

        let code = cur.round() as i32;
        let label = dict.label(code).map(str::to_string);
        if label.is_none() {
            unknown.insert(code);
        }
        out.push(EventMarker { sample: t, code, label });
    }

    if !unknown.is_empty() {
        warn!("marker codes {unknown:?} have no entry in the event dictionary");
    }
    debug!(
        "found {} events ({} too short, {} merged)",
        out.len(),
        n_short,
        n_merged
    );
    out
}

/// One zero-duration annotation per event, described by its label (or the
/// code when the label is unknown).
pub fn annotations_from_events(events: &[EventMarker], sfreq: f64) -> Vec<Annotation> {
    events
        .iter()
        .map(|e| Annotation {
            onset: e.sample as f64 / sfreq,
            duration: 0.0,
            description: e.label.clone().unwrap_or_else(|| e.code.to_string()),
        })
        .collect()
}

/// Events for every annotation of `rec` whose description is in `dict`,
/// sorted by sample. Boundary annotations are skipped silently; any other
/// annotation without a dictionary entry is skipped with a warning.
pub fn events_from_annotations(rec: &Recording, dict: &EventDictionary) -> Vec<EventMarker> {
    let sfreq = rec.sfreq();
    let mut skipped: BTreeMap<&str, usize> = BTreeMap::new();
    let mut out = Vec::with_capacity(rec.annotations.len());
    for a in &rec.annotations {
        match dict.code(&a.description) {
            Some(code) => out.push(EventMarker {
                sample: (a.onset * sfreq).round() as usize,
                code,
                label: Some(a.description.clone()),
            }),
            None if a.description == BOUNDARY_BAD || a.description == BOUNDARY_EDGE => {}
            None => *skipped.entry(a.description.as_str()).or_default() += 1,
        }
    }
    if !skipped.is_empty() {
        warn!(
            "{} annotations have no entry in the event dictionary: {skipped:?}",
            skipped.values().sum::<usize>()
        );
    }
    out.sort_by_key(|e| e.sample);
    out
}

/// Shift each recording's events by the total length of the recordings
/// before it, giving one list on the concatenated timeline.
///
/// Fails if the list counts differ or an event lies past its recording.
pub fn offset_events(per_recording: &[Vec<EventMarker>], n_times: &[usize]) -> Result<Vec<EventMarker>> {
    if per_recording.len() != n_times.len() {
        return Err(PrepError::InvalidParameter(format!(
            "{} event lists for {} recordings",
            per_recording.len(),
            n_times.len()
        )));
    }
    let mut out = Vec::with_capacity(per_recording.iter().map(Vec::len).sum());
    let mut offset = 0usize;
    for (i, (events, &len)) in per_recording.iter().zip(n_times).enumerate() {
        if let Some(e) = events.iter().find(|e| e.sample >= len) {
            return Err(PrepError::InvalidParameter(format!(
                "event at sample {} lies past recording {i} ({len} samples)",
                e.sample
            )));
        }
        out.extend(events.iter().map(|e| EventMarker { sample: e.sample + offset, ..e.clone() }));
        offset += len;
    }
    Ok(out)
}
