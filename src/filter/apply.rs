//! Zero-phase application of second-order sections (forward-backward).
//!
//! Matches `scipy.signal.sosfiltfilt(..., padtype='odd')` with an explicit
//! pad length: the signal is extended by odd reflection on both sides,
//! filtered forward with steady-state initial conditions scaled by the first
//! sample, reversed, filtered again, reversed, and the padding stripped.
use ndarray::{Array2, ArrayView1};

use super::design::Biquad;
use crate::error::Result;

/// Filter each channel of `data` ([C, T]) in place with zero phase.
///
/// `padlen` is clamped to `T - 1` per call.
pub fn apply_sos_zero_phase(data: &mut Array2<f64>, sos: &[Biquad], padlen: usize) -> Result<()> {
    for mut row in data.rows_mut() {
        let x: Vec<f64> = row.to_vec();
        let y = filtfilt_1d(&x, sos, padlen);
        row.assign(&ArrayView1::from(&y));
    }
    Ok(())
}

/// Forward-backward filter one signal. Output length equals input length.
pub fn filtfilt_1d(x: &[f64], sos: &[Biquad], padlen: usize) -> Vec<f64> {
    let n_x = x.len();
    if n_x == 0 || sos.is_empty() {
        return x.to_vec();
    }
    let edge = padlen.min(n_x - 1);
    let mut ext = reflect_limited_pad(x, edge, edge);

    let zi = sos_steady_state(sos);

    let x0 = ext[0];
    sosfilt_inplace(&mut ext, sos, &zi, x0);
    ext.reverse();
    let y0 = ext[0];
    sosfilt_inplace(&mut ext, sos, &zi, y0);
    ext.reverse();

    ext[edge..edge + n_x].to_vec()
}

/// Run the cascade over `x` in place (Direct Form II transposed), starting
/// from the steady state `zi` scaled by `scale`.
fn sosfilt_inplace(x: &mut [f64], sos: &[Biquad], zi: &[[f64; 2]], scale: f64) {
    let mut state: Vec<[f64; 2]> = zi.iter().map(|z| [z[0] * scale, z[1] * scale]).collect();
    for v in x.iter_mut() {
        let mut s = *v;
        for (q, z) in sos.iter().zip(state.iter_mut()) {
            let y = q.b0 * s + z[0];
            z[0] = q.b1 * s - q.a1 * y + z[1];
            z[1] = q.b2 * s - q.a2 * y;
            s = y;
        }
        *v = s;
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Per-section state for a unit step that has reached steady state
/// (`scipy.signal.sosfilt_zi`).
///
/// For a section with DC gain `g` driven by a constant input `u`,
/// `z2 = (b2 - a2·g)·u` and `z1 = (b1 - a1·g)·u + z2`. The input of each
/// section is the steady output of the previous one.
fn sos_steady_state(sos: &[Biquad]) -> Vec<[f64; 2]> {
    let mut u = 1.0;
    sos.iter()
        .map(|q| {
            let g = q.dc_gain();
            let z2 = (q.b2 - q.a2 * g) * u;
            let z1 = (q.b1 - q.a1 * g) * u + z2;
            u *= g;
            [z1, z2]
        })
        .collect()
}

/// Reflect-limited padding (odd reflection, matches MNE's `_smart_pad`).
///
/// Left:  `pad[i] = 2*x[0] - x[n_l-i]`  for i in 1..=n_l
/// Right: `pad[i] = 2*x[-1] - x[-(i+1)]` for i in 1..=n_r
pub(crate) fn reflect_limited_pad(x: &[f64], n_l: usize, n_r: usize) -> Vec<f64> {
    let n = x.len();
    let actual_l = n_l.min(n - 1);
    let actual_r = n_r.min(n - 1);

    let mut out = Vec::with_capacity(n_l + n + n_r);

    // If requested padding exceeds signal, prepend zeros.
    out.extend(std::iter::repeat(0.0).take(n_l - actual_l));
    for i in (1..=actual_l).rev() {
        out.push(2.0 * x[0] - x[i]);
    }

    out.extend_from_slice(x);

    let last = x[n - 1];
    for i in 1..=actual_r {
        out.push(2.0 * last - x[n - 1 - i]);
    }
    out.extend(std::iter::repeat(0.0).take(n_r - actual_r));

    out
}
