//! Labelled epoch dataset: seeded shuffling and export.
//!
//! Epochs and labels are private and only ever reordered together, so the
//! label at position `i` always belongs to the epoch at position `i`.
use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::epoch::{Epoch, Epochs};
use crate::error::Result;
use crate::io::StWriter;

#[derive(Debug, Clone)]
pub struct Dataset {
    epochs: Vec<Epoch>,
    labels: Vec<i32>,
    /// `current[i] == original[permutation[i]]`; `None` in original order.
    permutation: Option<Vec<usize>>,
    ch_labels: Vec<String>,
    sfreq: f64,
    tmin: f64,
    tmax: f64,
}

impl Dataset {
    pub fn from_epochs(epochs: Epochs) -> Self {
        let labels = epochs.labels();
        Self {
            epochs: epochs.epochs,
            labels,
            permutation: None,
            ch_labels: epochs.ch_labels,
            sfreq: epochs.sfreq,
            tmin: epochs.tmin,
            tmax: epochs.tmax,
        }
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn permutation(&self) -> Option<&[usize]> {
        self.permutation.as_deref()
    }

    pub fn ch_labels(&self) -> &[String] {
        &self.ch_labels
    }

    pub fn sfreq(&self) -> f64 {
        self.sfreq
    }

    /// Number of epochs per label.
    pub fn label_counts(&self) -> BTreeMap<i32, usize> {
        let mut counts = BTreeMap::new();
        for &l in &self.labels {
            *counts.entry(l).or_insert(0) += 1;
        }
        counts
    }

    /// Reorder by a permutation drawn from `seed`. Shuffling an already
    /// shuffled dataset composes, so [`Dataset::unshuffle`] still returns
    /// to the original order.
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut p: Vec<usize> = (0..self.len()).collect();
        p.shuffle(&mut rng);
        self.reorder(&p);
        let total = match self.permutation.take() {
            Some(prev) => p.iter().map(|&j| prev[j]).collect(),
            None => p,
        };
        self.permutation = Some(total);
        info!("shuffled {} epochs (seed {seed})", self.len());
    }

    /// Restore the order before the first [`Dataset::shuffle`].
    pub fn unshuffle(&mut self) {
        if let Some(perm) = self.permutation.take() {
            let mut inv = vec![0usize; perm.len()];
            for (i, &p) in perm.iter().enumerate() {
                inv[p] = i;
            }
            self.reorder(&inv);
        }
    }

    fn reorder(&mut self, order: &[usize]) {
        let mut slots: Vec<Option<Epoch>> = std::mem::take(&mut self.epochs).into_iter().map(Some).collect();
        self.epochs = order.iter().filter_map(|&j| slots[j].take()).collect();
        self.labels = order.iter().map(|&j| self.labels[j]).collect();
    }

    /// Write `epochs` `[N, C, T]` F32, `labels` `[N]` I32, `samples` `[N]`
    /// I64 (anchor sample of each epoch), `permutation` `[N]` I64 when
    /// shuffled, and channel/timing metadata.
    pub fn export(&self, path: &Path) -> Result<()> {
        let (n_ch, n_t) = self
            .epochs
            .first()
            .map(|e| e.data.dim())
            .unwrap_or((self.ch_labels.len(), 0));
        let flat: Vec<f32> = self
            .epochs
            .iter()
            .flat_map(|e| e.data.iter().map(|&v| v as f32))
            .collect();
        let samples: Vec<i64> = self.epochs.iter().map(|e| e.event.sample as i64).collect();

        let mut w = StWriter::new();
        w.add_f32("epochs", &flat, &[self.len(), n_ch, n_t]);
        w.add_i32("labels", &self.labels, &[self.len()]);
        w.add_i64("samples", &samples, &[self.len()]);
        if let Some(p) = &self.permutation {
            let p: Vec<i64> = p.iter().map(|&i| i as i64).collect();
            w.add_i64("permutation", &p, &[p.len()]);
        }
        w.add_metadata("ch_labels", serde_json::to_string(&self.ch_labels)?);
        w.add_metadata("sfreq", serde_json::to_string(&self.sfreq)?);
        w.add_metadata("tmin", serde_json::to_string(&self.tmin)?);
        w.add_metadata("tmax", serde_json::to_string(&self.tmax)?);
        w.write(path)?;
        info!("exported {} epochs of {n_ch} x {n_t} to {}", self.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventMarker;
    use ndarray::Array2;

    fn toy(n: usize) -> Dataset {
        let epochs = (0..n)
            .map(|i| Epoch {
                event: EventMarker { sample: i * 10, code: 3 + (i % 2) as i32, label: None },
                start: i * 10,
                data: Array2::from_elem((2, 4), i as f64),
                label: 3 + (i % 2) as i32,
            })
            .collect();
        Dataset::from_epochs(Epochs {
            epochs,
            drop_log: Vec::new(),
            tmin: 0.0,
            tmax: 3.0,
            sfreq: 250.0,
            ch_labels: vec!["Cz".into(), "Pz".into()],
        })
    }

    #[test]
    fn labels_follow_epochs() {
        let mut ds = toy(25);
        ds.shuffle(7);
        for (e, &l) in ds.epochs().iter().zip(ds.labels()) {
            assert_eq!(e.label, l);
        }
    }

    #[test]
    fn same_seed_same_order() {
        let (mut a, mut b) = (toy(30), toy(30));
        a.shuffle(11);
        b.shuffle(11);
        assert_eq!(a.permutation(), b.permutation());
    }

    #[test]
    fn repeated_shuffles_still_unshuffle() {
        let mut ds = toy(17);
        ds.shuffle(1);
        ds.shuffle(2);
        let perm = ds.permutation().unwrap().to_vec();
        for (i, e) in ds.epochs().iter().enumerate() {
            assert_eq!(e.data[[0, 0]], perm[i] as f64);
        }
        ds.unshuffle();
        assert!(ds.permutation().is_none());
        for (i, e) in ds.epochs().iter().enumerate() {
            assert_eq!(e.data[[0, 0]], i as f64);
        }
    }

    #[test]
    fn empty_dataset_shuffles() {
        let mut ds = toy(0);
        ds.shuffle(3);
        assert_eq!(ds.permutation(), Some(&[][..]));
    }
}
