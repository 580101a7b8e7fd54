/// Shared builders for synthetic recordings and pipeline fixtures.
use exg_prep::montage::CAP64_LABELS;
use exg_prep::{Channel, Montage, Recording};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::path::Path;

#[allow(unused)]
pub const SFREQ: f64 = 250.0;

#[allow(unused)]
/// First `n` labels of the 64-channel cap.
pub fn cap_labels(n: usize) -> Vec<String> {
    CAP64_LABELS.iter().take(n).map(|s| s.to_string()).collect()
}

#[allow(unused)]
/// Positions spread over the upper hemisphere (Fibonacci lattice), radius
/// 85 mm.
pub fn hemisphere_montage(labels: &[String]) -> Montage {
    let n = labels.len() as f64;
    let golden = PI * (3.0 - 5f64.sqrt());
    Montage(
        labels
            .iter()
            .enumerate()
            .map(|(i, l)| {
                let z = 1.0 - (i as f64 + 0.5) / n;
                let r = (1.0 - z * z).sqrt();
                let th = golden * i as f64;
                (l.clone(), [85.0 * r * th.cos(), 85.0 * r * th.sin(), 85.0 * z])
            })
            .collect(),
    )
}

#[allow(unused)]
/// Write `montage` as an EEGLAB `.xyz` file.
pub fn write_xyz(montage: &Montage, path: &Path) {
    let text: String = montage
        .0
        .iter()
        .enumerate()
        .map(|(i, (l, p))| format!("{} {} {} {} {}\n", i + 1, p[0], p[1], p[2], l))
        .collect();
    std::fs::write(path, text).unwrap();
}

#[allow(unused)]
/// `[n_ch, n_t]` mixture of oscillations and seeded noise, full rank.
pub fn mixed_signals(n_ch: usize, n_t: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let freqs: Vec<f64> = (0..n_ch).map(|i| 3.0 + 2.7 * i as f64).collect();
    let weights = Array2::from_shape_fn((n_ch, n_ch), |_| rng.gen_range(-1.0..1.0));
    let sources = Array2::from_shape_fn((n_ch, n_t), |(c, t)| {
        let t = t as f64 / SFREQ;
        (2.0 * PI * freqs[c] * t).sin()
    });
    let noise = Array2::from_shape_fn((n_ch, n_t), |_| 0.2 * rng.gen_range(-1.0..1.0));
    weights.dot(&sources) + noise
}

#[allow(unused)]
/// Recording with cap labels and a random full-rank signal.
pub fn recording(n_ch: usize, n_t: usize, seed: u64) -> Recording {
    let channels = cap_labels(n_ch)
        .into_iter()
        .map(|l| {
            let mut ch = Channel::eeg(l.clone());
            ch.label = l;
            ch
        })
        .collect();
    Recording::new(mixed_signals(n_ch, n_t, seed), SFREQ, channels).unwrap()
}

#[allow(unused)]
/// Recording of zeros with `ch_1 … ch_n` identifiers, for shape-only tests.
pub fn zeros_recording(n_ch: usize, n_t: usize) -> Recording {
    let channels = (1..=n_ch).map(|i| Channel::eeg(format!("ch_{i}"))).collect();
    Recording::new(Array2::zeros((n_ch, n_t)), SFREQ, channels).unwrap()
}

#[allow(unused)]
/// Raw session: `n_eeg` signal rows followed by a marker row carrying
/// `pulses` as `(onset sample, code)`, each held for `width` samples.
pub fn raw_session(n_eeg: usize, n_t: usize, pulses: &[(usize, i32)], width: usize, seed: u64) -> Array2<f64> {
    let mut raw = Array2::<f64>::zeros((n_eeg + 1, n_t));
    raw.slice_mut(ndarray::s![..n_eeg, ..]).assign(&mixed_signals(n_eeg, n_t, seed));
    for &(onset, code) in pulses {
        for t in onset..(onset + width).min(n_t) {
            raw[[n_eeg, t]] = code as f64;
        }
    }
    raw
}
