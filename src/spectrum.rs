//! Welch power spectral density estimate.
//!
//! Hann-windowed segments of `nperseg` samples with 50 % overlap, each
//! mean-removed, one-sided periodogram averaged across segments
//! (`scipy.signal.welch` with `detrend='constant'`, `scaling='density'`).
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

/// One-sided PSD. `freqs[i]` in Hz, `power[i]` in units² / Hz.
#[derive(Debug, Clone)]
pub struct Psd {
    pub freqs: Vec<f64>,
    pub power: Vec<f64>,
}

impl Psd {
    /// Summed power over `[lo, hi]` Hz.
    pub fn band_power(&self, lo: f64, hi: f64) -> f64 {
        self.freqs
            .iter()
            .zip(&self.power)
            .filter(|(&f, _)| f >= lo && f <= hi)
            .map(|(_, &p)| p)
            .sum()
    }

    pub fn total_power(&self) -> f64 {
        self.power.iter().sum()
    }
}

fn hann(n: usize) -> Vec<f64> {
    // Periodic window, as scipy's `get_window('hann', n)`.
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// Welch PSD of `x` sampled at `sfreq`. `nperseg` is clamped to `x.len()`.
pub fn welch(x: &[f64], sfreq: f64, nperseg: usize) -> Psd {
    let n = nperseg.min(x.len()).max(1);
    let step = (n / 2).max(1);
    let win = hann(n);
    let win_energy: f64 = win.iter().map(|w| w * w).sum();
    let n_freqs = n / 2 + 1;

    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    let mut power = vec![0.0_f64; n_freqs];
    let mut n_seg = 0usize;

    let mut start = 0usize;
    while start + n <= x.len() {
        let seg = &x[start..start + n];
        let mean = seg.iter().sum::<f64>() / n as f64;
        let mut buf: Vec<Complex<f64>> = seg
            .iter()
            .zip(&win)
            .map(|(&v, &w)| Complex { re: (v - mean) * w, im: 0.0 })
            .collect();
        fft.process(&mut buf);
        for (p, b) in power.iter_mut().zip(&buf[..n_freqs]) {
            *p += b.norm_sqr();
        }
        n_seg += 1;
        start += step;
    }

    let scale = 1.0 / (sfreq * win_energy * n_seg.max(1) as f64);
    for (i, p) in power.iter_mut().enumerate() {
        *p *= scale;
        // One-sided: double everything except DC and (even n) Nyquist.
        let is_nyquist = n % 2 == 0 && i == n_freqs - 1;
        if i != 0 && !is_nyquist {
            *p *= 2.0;
        }
    }

    let freqs = (0..n_freqs).map(|i| i as f64 * sfreq / n as f64).collect();
    Psd { freqs, power }
}
