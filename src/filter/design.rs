//! Butterworth IIR design as cascaded second-order sections.
//!
//! Each analog Butterworth pole pair `s² + 2·sin(θ_k)·s + 1`, with
//! `θ_k = π(2k+1) / (2N)`, is mapped through the bilinear transform with
//! frequency prewarping `K = tan(π·f_c / f_s)`. Odd orders add a single
//! first-order section. A bandpass is the cascade of an order-`N` highpass
//! at `l_freq` and an order-`N` lowpass at `h_freq`.
use std::f64::consts::PI;

/// One biquad: `H(z) = (b0 + b1 z⁻¹ + b2 z⁻²) / (1 + a1 z⁻¹ + a2 z⁻²)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Biquad {
    /// Gain at DC (`z = 1`).
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// `true` for a first-order section (no z⁻² terms).
    pub fn is_first_order(&self) -> bool {
        self.b2 == 0.0 && self.a2 == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Lowpass,
    Highpass,
}

/// Prewarped analog cutoff for the bilinear transform.
fn prewarp(freq: f64, sfreq: f64) -> f64 {
    (PI * freq / sfreq).tan()
}

fn butter_sections(freq: f64, sfreq: f64, order: usize, kind: Kind) -> Vec<Biquad> {
    let k = prewarp(freq, sfreq);
    let k2 = k * k;
    let mut out = Vec::with_capacity(order.div_ceil(2));

    for i in 0..order / 2 {
        let theta = PI * (2 * i + 1) as f64 / (2 * order) as f64;
        let inv_q = 2.0 * theta.sin();
        let norm = 1.0 / (1.0 + k * inv_q + k2);
        let a1 = 2.0 * (k2 - 1.0) * norm;
        let a2 = (1.0 - k * inv_q + k2) * norm;
        let (b0, b1, b2) = match kind {
            Kind::Lowpass => (k2 * norm, 2.0 * k2 * norm, k2 * norm),
            Kind::Highpass => (norm, -2.0 * norm, norm),
        };
        out.push(Biquad { b0, b1, b2, a1, a2 });
    }

    if order % 2 == 1 {
        let norm = 1.0 / (1.0 + k);
        let a1 = (k - 1.0) * norm;
        let (b0, b1) = match kind {
            Kind::Lowpass => (k * norm, k * norm),
            Kind::Highpass => (norm, -norm),
        };
        out.push(Biquad { b0, b1, b2: 0.0, a1, a2: 0.0 });
    }
    out
}

/// Order-`order` Butterworth lowpass at `h_freq` Hz.
pub fn butter_lowpass(h_freq: f64, sfreq: f64, order: usize) -> Vec<Biquad> {
    butter_sections(h_freq, sfreq, order, Kind::Lowpass)
}

/// Order-`order` Butterworth highpass at `l_freq` Hz.
pub fn butter_highpass(l_freq: f64, sfreq: f64, order: usize) -> Vec<Biquad> {
    butter_sections(l_freq, sfreq, order, Kind::Highpass)
}

/// Bandpass `[l_freq, h_freq]`: highpass sections followed by lowpass sections.
pub fn butter_bandpass(l_freq: f64, h_freq: f64, sfreq: f64, order: usize) -> Vec<Biquad> {
    let mut sos = butter_highpass(l_freq, sfreq, order);
    sos.extend(butter_lowpass(h_freq, sfreq, order));
    sos
}

/// Magnitude response `|H(e^{jω})|` of a section cascade at `freq` Hz.
pub fn magnitude_response(sos: &[Biquad], freq: f64, sfreq: f64) -> f64 {
    let w = 2.0 * PI * freq / sfreq;
    let (c1, s1) = (w.cos(), -w.sin());
    let (c2, s2) = ((2.0 * w).cos(), -(2.0 * w).sin());
    sos.iter()
        .map(|q| {
            let num_re = q.b0 + q.b1 * c1 + q.b2 * c2;
            let num_im = q.b1 * s1 + q.b2 * s2;
            let den_re = 1.0 + q.a1 * c1 + q.a2 * c2;
            let den_im = q.a1 * s1 + q.a2 * s2;
            ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
        })
        .product()
}

/// Impulse-response length needed for the cascade to ring down below
/// `1e-3` of its peak, capped at `max_samples`.
///
/// Used as the edge padding length for zero-phase filtering, in the spirit
/// of MNE's `_estimate_ringing_samples`.
pub fn estimate_ringing_samples(sos: &[Biquad], max_samples: usize) -> usize {
    let mut state = vec![[0.0_f64; 2]; sos.len()];
    let mut peak = 0.0_f64;
    let mut last_above = 0usize;
    let mut quiet_run = 0usize;
    // Stop once the response has stayed below threshold for this many samples.
    let settle = 1000usize;

    for n in 0..max_samples {
        let mut v = if n == 0 { 1.0 } else { 0.0 };
        for (q, z) in sos.iter().zip(state.iter_mut()) {
            let y = q.b0 * v + z[0];
            z[0] = q.b1 * v - q.a1 * y + z[1];
            z[1] = q.b2 * v - q.a2 * y;
            v = y;
        }
        let a = v.abs();
        peak = peak.max(a);
        if a >= 1e-3 * peak {
            last_above = n;
            quiet_run = 0;
        } else {
            quiet_run += 1;
            if quiet_run >= settle {
                break;
            }
        }
    }
    last_above + 1
}
