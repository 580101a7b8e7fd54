//! Recording ingestion: raw `[C_raw, T]` matrix → data-channel [`Recording`]
//! plus the isolated marker channel.
//!
//! Raw rows are laid out as `[skip rows…, ch_1, ch_2, …, ch_N]`, where the
//! marker channel is one of `ch_1 … ch_N` (the last one by default). Data
//! channels keep their 1-based identifiers, so with a 65-channel layout
//! the marker is `ch_65` and the recording holds `ch_1 … ch_64`.
use log::info;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};
use crate::recording::{Channel, Recording};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Number of channels expected after the skipped rows, marker included.
    ///
    /// Default: `65` (64 EEG + 1 marker).
    pub n_channels: usize,

    /// Zero-based position of the marker channel among the channels.
    /// `None` means the last channel.
    pub marker_index: Option<usize>,

    /// Leading rows that carry no signal (e.g. a timestamp row).
    ///
    /// Default: `0`.
    pub skip_rows: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { n_channels: 65, marker_index: None, skip_rows: 0 }
    }
}

/// Split a raw session matrix into a data [`Recording`] and the marker samples.
///
/// Fails with [`PrepError::Format`] if the matrix has fewer rows than
/// `skip_rows + n_channels` (marker channel absent), has no samples, or the
/// sampling rate is not positive.
pub fn ingest(raw: &Array2<f64>, sfreq: f64, cfg: &IngestConfig) -> Result<(Recording, Vec<f64>)> {
    let (n_rows, n_t) = raw.dim();
    let needed = cfg.skip_rows + cfg.n_channels;
    if cfg.n_channels < 2 {
        return Err(PrepError::InvalidParameter(format!(
            "expected channel count {} leaves no data channel beside the marker",
            cfg.n_channels
        )));
    }
    if n_rows < needed {
        return Err(PrepError::Format(format!(
            "{n_rows} rows, need at least {needed} ({} skipped + {} channels incl. marker)",
            cfg.skip_rows, cfg.n_channels
        )));
    }
    if n_t == 0 {
        return Err(PrepError::Format("recording has no samples".into()));
    }

    let marker_pos = cfg.marker_index.unwrap_or(cfg.n_channels - 1);
    if marker_pos >= cfg.n_channels {
        return Err(PrepError::InvalidParameter(format!(
            "marker index {marker_pos} outside {} channels",
            cfg.n_channels
        )));
    }

    let marker_row = cfg.skip_rows + marker_pos;
    let marker: Vec<f64> = raw.row(marker_row).to_vec();

    let data_rows: Vec<usize> = (cfg.skip_rows..needed).filter(|&r| r != marker_row).collect();
    let data = raw.select(Axis(0), &data_rows);
    let channels = data_rows
        .iter()
        .map(|&r| Channel::eeg(format!("ch_{}", r - cfg.skip_rows + 1)))
        .collect();

    let rec = Recording::new(data, sfreq, channels)?;
    info!(
        "ingested {} data channels x {} samples @ {} Hz (marker ch_{})",
        rec.n_channels(),
        rec.n_times(),
        sfreq,
        marker_pos + 1
    );
    Ok((rec, marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(n_rows: usize, n_t: usize) -> Array2<f64> {
        Array2::from_shape_fn((n_rows, n_t), |(r, t)| (r * 1000 + t) as f64)
    }

    #[test]
    fn splits_last_channel_as_marker() {
        let cfg = IngestConfig { n_channels: 5, ..IngestConfig::default() };
        let (rec, marker) = ingest(&raw(5, 10), 250.0, &cfg).unwrap();
        assert_eq!(rec.n_channels(), 4);
        assert_eq!(rec.channels[3].ident, "ch_4");
        assert_eq!(marker[2], 4002.0);
    }

    #[test]
    fn skips_timestamp_row() {
        let cfg = IngestConfig { n_channels: 3, skip_rows: 1, marker_index: None };
        let (rec, marker) = ingest(&raw(4, 10), 250.0, &cfg).unwrap();
        assert_eq!(rec.n_channels(), 2);
        assert_eq!(rec.data[[0, 0]], 1000.0);
        assert_eq!(rec.channels[0].ident, "ch_1");
        assert_eq!(marker[0], 3000.0);
    }

    #[test]
    fn missing_marker_channel_is_format_error() {
        let cfg = IngestConfig::default();
        let err = ingest(&raw(64, 10), 250.0, &cfg).unwrap_err();
        assert!(matches!(err, PrepError::Format(_)), "{err}");
    }

    #[test]
    fn empty_matrix_is_format_error() {
        let cfg = IngestConfig { n_channels: 2, ..IngestConfig::default() };
        assert!(matches!(ingest(&raw(2, 0), 250.0, &cfg), Err(PrepError::Format(_))));
    }

    #[test]
    fn marker_in_the_middle() {
        let cfg = IngestConfig { n_channels: 3, marker_index: Some(0), skip_rows: 0 };
        let (rec, marker) = ingest(&raw(3, 4), 250.0, &cfg).unwrap();
        assert_eq!(marker[0], 0.0);
        assert_eq!(rec.channels[0].ident, "ch_2");
        assert_eq!(rec.channels[1].ident, "ch_3");
    }
}
