//! Channel calibration: identifier → spatial label renaming and montage
//! attachment.
//!
//! A [`Montage`] is a label → `[x, y, z]` table. It is read either from an
//! EEGLAB `.xyz` file (`index x y z label` per line) or from JSON.
use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};
use crate::recording::Recording;

/// Spatial labels of the 64-channel cap in acquisition order (`ch_1 … ch_64`).
pub const CAP64_LABELS: [&str; 64] = [
    "AF3", "FPz", "AF4", "F9", "F7", "FC4", "F10", "T7", "F5", "F3", "F1", "Fz", "F2", "F4",
    "F6", "F8", "CP5", "FT7", "FC5", "FC3", "FC1", "FCz", "FC2", "FC6", "FT8", "C2", "Cz", "C1",
    "POz", "CP2", "CP4", "CP6", "C6", "T8", "TP7", "CP3", "CP1", "CPz", "Pz", "P4", "P2", "TP10",
    "TP8", "P5", "P3", "P1", "PO3", "PO10", "P6", "P8", "PO4", "P10", "P9", "P7", "PO7", "O2",
    "Oz", "PO9", "FT9", "PO8", "C5", "FT10", "TP9", "O1",
];

/// Raw channel identifier → canonical spatial label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMap(pub BTreeMap<String, String>);

impl ChannelMap {
    /// Map `ch_1 … ch_N` to `labels` in order.
    pub fn sequential<S: AsRef<str>>(labels: &[S]) -> Self {
        Self(
            labels
                .iter()
                .enumerate()
                .map(|(i, l)| (format!("ch_{}", i + 1), l.as_ref().to_string()))
                .collect(),
        )
    }

    /// The mapping for the 64-channel cap ([`CAP64_LABELS`]).
    pub fn cap64() -> Self {
        Self::sequential(&CAP64_LABELS)
    }

    pub fn get(&self, ident: &str) -> Option<&str> {
        self.0.get(ident).map(String::as_str)
    }
}

/// Label → 3-D sensor position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Montage(pub BTreeMap<String, [f64; 3]>);

impl Montage {
    /// Parse an EEGLAB `.xyz` table. Blank lines and `#` comments are skipped.
    pub fn parse_xyz(text: &str) -> Result<Self> {
        let mut positions = BTreeMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return Err(PrepError::Format(format!(
                    "montage line {}: expected 'index x y z label', got {:?}",
                    lineno + 1,
                    line
                )));
            }
            let mut xyz = [0.0; 3];
            for (v, f) in xyz.iter_mut().zip(&fields[1..4]) {
                *v = f.parse().map_err(|_| {
                    PrepError::Format(format!("montage line {}: bad coordinate {f:?}", lineno + 1))
                })?;
            }
            positions.insert(fields[4].to_string(), xyz);
        }
        if positions.is_empty() {
            return Err(PrepError::Format("montage has no positions".into()));
        }
        Ok(Self(positions))
    }

    /// Load from `.xyz` or, for a `.json` extension, from a JSON object.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(&text)?),
            _ => Self::parse_xyz(&text),
        }
    }

    pub fn position(&self, label: &str) -> Option<[f64; 3]> {
        self.0.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Rename every channel per `map` and attach the positions from `montage`.
///
/// Sample data is cloned unchanged. Fails with [`PrepError::UnknownChannel`]
/// on the first identifier missing from `map`, or the first label missing
/// from `montage`.
pub fn calibrate(rec: &Recording, map: &ChannelMap, montage: &Montage) -> Result<Recording> {
    let mut out = rec.clone();
    let mut attached = BTreeMap::new();
    for ch in &mut out.channels {
        let label = map
            .get(&ch.ident)
            .ok_or_else(|| PrepError::UnknownChannel(ch.ident.clone()))?;
        let pos = montage
            .position(label)
            .ok_or_else(|| PrepError::UnknownChannel(label.to_string()))?;
        ch.label = label.to_string();
        attached.insert(ch.label.clone(), pos);
    }
    out.montage = Some(Montage(attached));
    info!("calibrated {} channels against {}-position montage", out.n_channels(), montage.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Channel;
    use ndarray::Array2;

    const XYZ: &str = "\
1  -27.7  80.7  -16.0  AF3
2    0.0  84.5   -2.0  FPz
# comment
3   27.7  80.7  -16.0  AF4
";

    fn rec3() -> Recording {
        let ch = (1..=3).map(|i| Channel::eeg(format!("ch_{i}"))).collect();
        Recording::new(Array2::from_elem((3, 8), 1.5), 250.0, ch).unwrap()
    }

    #[test]
    fn parses_xyz() {
        let m = Montage::parse_xyz(XYZ).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m.position("FPz"), Some([0.0, 84.5, -2.0]));
    }

    #[test]
    fn xyz_rejects_short_line() {
        assert!(matches!(Montage::parse_xyz("1 0 0 0"), Err(PrepError::Format(_))));
    }

    #[test]
    fn calibrate_renames_and_attaches() {
        let m = Montage::parse_xyz(XYZ).unwrap();
        let map = ChannelMap::sequential(&["AF3", "FPz", "AF4"]);
        let out = calibrate(&rec3(), &map, &m).unwrap();
        assert_eq!(out.ch_labels(), vec!["AF3", "FPz", "AF4"]);
        assert_eq!(out.channels[0].ident, "ch_1");
        assert_eq!(out.montage.as_ref().unwrap().len(), 3);
        assert_eq!(out.data, rec3().data);
    }

    #[test]
    fn calibrate_unknown_identifier() {
        let m = Montage::parse_xyz(XYZ).unwrap();
        let map = ChannelMap::sequential(&["AF3", "FPz"]);
        match calibrate(&rec3(), &map, &m) {
            Err(PrepError::UnknownChannel(id)) => assert_eq!(id, "ch_3"),
            other => panic!("expected UnknownChannel, got {other:?}"),
        }
    }

    #[test]
    fn calibrate_label_missing_from_montage() {
        let m = Montage::parse_xyz(XYZ).unwrap();
        let map = ChannelMap::sequential(&["AF3", "FPz", "Oz"]);
        match calibrate(&rec3(), &map, &m) {
            Err(PrepError::UnknownChannel(label)) => assert_eq!(label, "Oz"),
            other => panic!("expected UnknownChannel, got {other:?}"),
        }
    }

    #[test]
    fn cap64_covers_64_distinct_labels() {
        let map = ChannelMap::cap64();
        assert_eq!(map.0.len(), 64);
        let mut labels: Vec<_> = map.0.values().collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), 64);
        assert_eq!(map.get("ch_64"), Some("O1"));
    }
}
