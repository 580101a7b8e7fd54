//! Spherical-spline interpolation of bad channels (Perrin et al., 1989).
//!
//! Matches `mne.channels.interpolation._make_interpolation_matrix`:
//!
//! ```text
//! g(cos θ)  = Σ_{n=1..7} (2n+1) / (n^m (n+1)^m 4π) · P_n(cos θ),   m = 4
//! C         = [[G_good + αI, 1], [1ᵀ, 0]],                         α = 1e-5
//! W         = [G_bad,good, 1] · pinv(C)[:, :-1]
//! x_bad     = W · x_good
//! ```
//!
//! Positions are centred on their centroid and projected onto the unit sphere.
use log::{info, warn};
use ndarray::{Array1, Array2, Axis};
use std::f64::consts::PI;

use crate::error::{PrepError, Result};
use crate::linalg::{from_dmatrix, to_dmatrix};
use crate::recording::Recording;

const STIFFNESS: i32 = 4;
const N_LEGENDRE_TERMS: usize = 7;
const ALPHA: f64 = 1e-5;

/// Mark `labels` as bad on `rec`. Unknown labels fail with
/// [`PrepError::UnknownChannel`].
pub fn mark_bad(rec: &mut Recording, labels: &[String]) -> Result<()> {
    for label in labels {
        let idx = rec
            .channel_index(label)
            .ok_or_else(|| PrepError::UnknownChannel(label.clone()))?;
        rec.channels[idx].bad = true;
    }
    Ok(())
}

/// Replace every bad channel of `rec` with its interpolation from the good
/// channels; resets the bad flags and sets `interpolated`.
///
/// A recording with no bad channels is returned unchanged.
pub fn interpolate_bads(rec: &Recording) -> Result<Recording> {
    let bad: Vec<usize> = (0..rec.n_channels()).filter(|&i| rec.channels[i].bad).collect();
    if bad.is_empty() {
        return Ok(rec.clone());
    }
    let good: Vec<usize> = (0..rec.n_channels()).filter(|&i| !rec.channels[i].bad).collect();
    if good.len() < 3 {
        return Err(PrepError::Format(format!(
            "only {} good channels, cannot interpolate {} bad",
            good.len(),
            bad.len()
        )));
    }

    let montage = rec
        .montage
        .as_ref()
        .ok_or_else(|| PrepError::Format("interpolation requires an attached montage".into()))?;
    let mut pos = Array2::<f64>::zeros((rec.n_channels(), 3));
    for (i, ch) in rec.channels.iter().enumerate() {
        let p = montage
            .position(&ch.label)
            .ok_or_else(|| PrepError::UnknownChannel(ch.label.clone()))?;
        pos.row_mut(i).assign(&Array1::from(p.to_vec()));
    }
    let pos = unit_sphere(&pos);

    let pos_good = pos.select(Axis(0), &good);
    let pos_bad = pos.select(Axis(0), &bad);
    let weights = interpolation_matrix(&pos_good, &pos_bad)?;

    let bad_data = weights.dot(&rec.data.select(Axis(0), &good));
    let mut out = rec.clone();
    for (row, &ch) in bad.iter().enumerate() {
        out.data.row_mut(ch).assign(&bad_data.row(row));
        out.channels[ch].bad = false;
        out.channels[ch].interpolated = true;
    }

    let names: Vec<&str> = bad.iter().map(|&i| rec.channels[i].label.as_str()).collect();
    info!("interpolated {} bad channels from {} good: {:?}", bad.len(), good.len(), names);
    Ok(out)
}

fn unit_sphere(pos: &Array2<f64>) -> Array2<f64> {
    let centroid = pos.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(3));
    let mut out = pos - &centroid;
    for mut row in out.rows_mut() {
        let n = row.dot(&row).sqrt();
        if n > 0.0 {
            row /= n;
        } else {
            warn!("sensor at the sphere centre; leaving position unnormalised");
        }
    }
    out
}

/// Legendre series g(x) with the spherical-spline coefficients.
fn calc_g(x: f64) -> f64 {
    let mut p_prev = 1.0; // P_0
    let mut p = x; // P_1
    let mut g = 0.0;
    for n in 1..=N_LEGENDRE_TERMS {
        let nf = n as f64;
        let factor = (2.0 * nf + 1.0) / (nf.powi(STIFFNESS) * (nf + 1.0).powi(STIFFNESS) * 4.0 * PI);
        g += factor * p;
        let p_next = ((2.0 * nf + 1.0) * x * p - nf * p_prev) / (nf + 1.0);
        p_prev = p;
        p = p_next;
    }
    g
}

fn interpolation_matrix(pos_from: &Array2<f64>, pos_to: &Array2<f64>) -> Result<Array2<f64>> {
    let n_from = pos_from.nrows();
    let n_to = pos_to.nrows();

    let cos_from = pos_from.dot(&pos_from.t());
    let cos_to_from = pos_to.dot(&pos_from.t());

    let mut c = Array2::<f64>::zeros((n_from + 1, n_from + 1));
    for i in 0..n_from {
        for j in 0..n_from {
            c[[i, j]] = calc_g(cos_from[[i, j]].clamp(-1.0, 1.0));
        }
        c[[i, i]] += ALPHA;
        c[[i, n_from]] = 1.0;
        c[[n_from, i]] = 1.0;
    }

    let c_inv = to_dmatrix(c.view())
        .pseudo_inverse(1e-12)
        .map_err(|e| PrepError::InvalidParameter(format!("interpolation pinv failed: {e}")))?;
    let c_inv = from_dmatrix(&c_inv);

    let mut lhs = Array2::<f64>::ones((n_to, n_from + 1));
    for i in 0..n_to {
        for j in 0..n_from {
            lhs[[i, j]] = calc_g(cos_to_from[[i, j]].clamp(-1.0, 1.0));
        }
    }
    let full = lhs.dot(&c_inv);
    Ok(full.slice(ndarray::s![.., ..n_from]).to_owned())
}
