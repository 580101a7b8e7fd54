//! Artifact isolation by independent component analysis.
//!
//! 1. [`Ica::fit`]: FastICA (`linfa-ica`, log-cosh contrast) to `k`
//!    components, then the linear maps recovered from the fitted sources.
//! 2. [`decision`]: a [`DecisionProvider`] answers which components to
//!    exclude; [`parse_selection`] validates the answer against `[0, k)`.
//! 3. [`Ica::apply`]: subtract the back-projection of the excluded
//!    components from the input, `X − A[:, excl] · S[excl, :]`.
//!
//! [`isolate`] chains the three steps for one recording.
//!
//! With `U` the `[k, C]` unmixing matrix and `A` the `[C, k]` mixing
//! matrix:
//!
//! ```text
//! S = fastica(X)                 ([k, T] sources)
//! A = (X − μ) Sᵀ (S Sᵀ)^{-1}     (least squares)
//! U = (Aᵀ A)^{-1} Aᵀ             (U · A = I)
//! ```

pub mod decision;
pub mod heuristics;

pub use decision::{
    parse_selection, AnswerFile, DecisionProvider, FixedAnswer, Review, StdinPrompt,
};
pub use heuristics::{ComponentScores, HeuristicConfig, HeuristicProvider};

use std::collections::{BTreeMap, BTreeSet};

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_ica::fast_ica::{FastIca, GFunc};
use log::info;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};
use crate::linalg::{inverse, sorted_symmetric_eigen};
use crate::recording::{ChannelKind, Recording};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcaConfig {
    /// Number of independent components `k`.
    ///
    /// Default: `20`.
    pub n_components: usize,

    /// FastICA iteration cap. Default: `1000`.
    pub max_iter: usize,

    /// Convergence tolerance on the unmixing update. Default: `1e-4`.
    pub tol: f64,

    /// Seed for the initial unmixing matrix. Default: `97`.
    pub seed: u64,
}

impl Default for IcaConfig {
    fn default() -> Self {
        Self { n_components: 20, max_iter: 1000, tol: 1e-4, seed: 97 }
    }
}

/// One recovered source.
#[derive(Debug, Clone, PartialEq)]
pub struct IndependentComponent {
    pub index: usize,
    /// Spatial pattern: column of the mixing matrix, `[C]`.
    pub mixing: Array1<f64>,
    /// Spatial filter: row of the unmixing matrix, `[C]`.
    pub unmixing: Array1<f64>,
    /// Share of the fitted data variance carried by this component, per
    /// channel kind.
    pub explained_variance: BTreeMap<ChannelKind, f64>,
    pub excluded: bool,
}

/// A fitted decomposition.
#[derive(Debug, Clone)]
pub struct Ica {
    /// `[C]` channel means removed before unmixing.
    pub mean: Array1<f64>,
    /// `[k, C]`.
    pub unmixing: Array2<f64>,
    /// `[C, k]`.
    pub mixing: Array2<f64>,
    /// Channel labels the decomposition was fitted on.
    pub ch_labels: Vec<String>,
    /// Per component, per channel kind explained-variance ratio.
    component_variance: Vec<BTreeMap<ChannelKind, f64>>,
    /// Variance explained by all `k` components together, per channel kind.
    pub total_explained_variance: BTreeMap<ChannelKind, f64>,
    pub exclude: BTreeSet<usize>,
}

impl Ica {
    /// Fit `cfg.n_components` independent components on `rec`.
    pub fn fit(rec: &Recording, cfg: &IcaConfig) -> Result<Self> {
        let (n_ch, n_t) = rec.data.dim();
        let k = cfg.n_components;
        if k == 0 || k > n_ch {
            return Err(PrepError::InvalidParameter(format!(
                "n_components={k} must be in 1..={n_ch}"
            )));
        }
        if n_t <= k {
            return Err(PrepError::InvalidParameter(format!(
                "{n_t} samples are too few for {k} components"
            )));
        }

        let mean = rec.data.mean_axis(Axis(1)).unwrap_or_else(|| Array1::zeros(n_ch));
        let xc = &rec.data - &mean.view().insert_axis(Axis(1));
        let cov = xc.dot(&xc.t()) / (n_t - 1) as f64;

        let (vals, _) = sorted_symmetric_eigen(cov.view());
        let floor = vals[0].abs().max(f64::MIN_POSITIVE) * 1e-12;
        if vals[k - 1] <= floor {
            return Err(PrepError::InvalidParameter(format!(
                "data rank is below n_components={k} (eigenvalue {:.3e})",
                vals[k - 1]
            )));
        }

        // linfa works on [samples, features]
        let xt = rec.data.t().to_owned();
        let model = FastIca::params()
            .ncomponents(k)
            .gfunc(GFunc::Logcosh(1.0))
            .max_iter(cfg.max_iter)
            .tol(cfg.tol)
            .random_state(cfg.seed as usize)
            .fit(&DatasetBase::from(xt.clone()))
            .map_err(|e| PrepError::InvalidParameter(format!("FastICA failed: {e}")))?;
        let sources: Array2<f64> = model.predict(&xt); // [T, k]

        let (mixing, unmixing) = mixing_unmixing(&xc, &sources)?;
        let sources = unmixing.dot(&xc);
        let (component_variance, total_explained_variance) =
            explained_variance(rec, &xc, &mixing, &sources);

        info!("ICA fit {k} components on {n_ch} ch x {n_t} samples");
        for (kind, ratio) in &total_explained_variance {
            info!(
                "fraction of {} variance explained by all components: {ratio:.4}",
                kind.as_str()
            );
        }

        Ok(Self {
            mean,
            unmixing,
            mixing,
            ch_labels: rec.ch_labels().iter().map(|s| s.to_string()).collect(),
            component_variance,
            total_explained_variance,
            exclude: BTreeSet::new(),
        })
    }

    #[inline]
    pub fn n_components(&self) -> usize {
        self.unmixing.nrows()
    }

    /// Source time courses `[k, T]` of `rec`.
    pub fn sources(&self, rec: &Recording) -> Result<Array2<f64>> {
        self.check_channels(rec)?;
        let xc = &rec.data - &self.mean.view().insert_axis(Axis(1));
        Ok(self.unmixing.dot(&xc))
    }

    pub fn components(&self) -> Vec<IndependentComponent> {
        (0..self.n_components())
            .map(|i| IndependentComponent {
                index: i,
                mixing: self.mixing.column(i).to_owned(),
                unmixing: self.unmixing.row(i).to_owned(),
                explained_variance: self.component_variance[i].clone(),
                excluded: self.exclude.contains(&i),
            })
            .collect()
    }

    /// Replace the exclusion set. Every index must lie in `[0, k)`.
    pub fn set_exclude(&mut self, exclude: BTreeSet<usize>) -> Result<()> {
        let k = self.n_components();
        if let Some(&bad) = exclude.iter().find(|&&i| i >= k) {
            return Err(PrepError::InvalidSelection {
                input: format!("{exclude:?}"),
                reason: format!("component {bad} outside [0, {k})"),
            });
        }
        self.exclude = exclude;
        Ok(())
    }

    /// Cleaned copy of `rec` with the excluded components' contribution
    /// removed. A pure function of `rec` and `self.exclude`.
    pub fn apply(&self, rec: &Recording) -> Result<Recording> {
        self.check_channels(rec)?;
        if self.exclude.is_empty() {
            return Ok(rec.clone());
        }
        let idx: Vec<usize> = self.exclude.iter().copied().collect();
        let xc = &rec.data - &self.mean.view().insert_axis(Axis(1));
        let s_excl = self.unmixing.select(Axis(0), &idx).dot(&xc);
        let artifact = self.mixing.select(Axis(1), &idx).dot(&s_excl);
        let cleaned = &rec.data - &artifact;
        info!("removed {} components {:?}", idx.len(), idx);
        rec.with_data(cleaned)
    }

    fn check_channels(&self, rec: &Recording) -> Result<()> {
        let labels = rec.ch_labels();
        if labels.len() != self.ch_labels.len()
            || labels.iter().zip(&self.ch_labels).any(|(a, b)| *a != b.as_str())
        {
            return Err(PrepError::InvalidParameter(format!(
                "recording channels {labels:?} differ from the fitted {:?}",
                self.ch_labels
            )));
        }
        Ok(())
    }
}

/// Least-squares mixing `[C, k]` from centred data `[C, T]` and sources
/// `[T, k]`, and the unmixing `[k, C]` as its pseudo-inverse.
fn mixing_unmixing(xc: &Array2<f64>, sources: &Array2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
    let singular = || PrepError::InvalidParameter("ICA sources are linearly dependent".into());
    let sts = sources.t().dot(sources);
    let mixing = xc.dot(sources).dot(&inverse(sts.view()).ok_or_else(singular)?);
    let ata = mixing.t().dot(&mixing);
    let unmixing = inverse(ata.view()).ok_or_else(singular)?.dot(&mixing.t());
    Ok((mixing, unmixing))
}

type VarianceTable = (Vec<BTreeMap<ChannelKind, f64>>, BTreeMap<ChannelKind, f64>);

/// Explained-variance ratio of each component (and of all of them) per
/// channel kind: `‖(A S)[rows_kind]‖² / ‖X_c[rows_kind]‖²`.
///
/// A single component's back-projection is rank one, so its energy on a row
/// subset is `‖a_i[rows]‖² · ‖s_i‖²`.
fn explained_variance(
    rec: &Recording,
    xc: &Array2<f64>,
    mixing: &Array2<f64>,
    sources: &Array2<f64>,
) -> VarianceTable {
    let mut rows_by_kind: BTreeMap<ChannelKind, Vec<usize>> = BTreeMap::new();
    for (i, ch) in rec.channels.iter().enumerate() {
        rows_by_kind.entry(ch.kind).or_default().push(i);
    }

    let k = sources.nrows();
    let source_energy: Vec<f64> = sources.rows().into_iter().map(|s| s.dot(&s)).collect();
    let recomposed = mixing.dot(sources);

    let mut per_component = vec![BTreeMap::new(); k];
    let mut total = BTreeMap::new();
    for (kind, rows) in &rows_by_kind {
        let data_energy: f64 = rows.iter().map(|&r| xc.row(r).dot(&xc.row(r))).sum();
        if data_energy <= 0.0 {
            continue;
        }
        for (i, map) in per_component.iter_mut().enumerate() {
            let a2: f64 = rows.iter().map(|&r| mixing[[r, i]].powi(2)).sum();
            map.insert(*kind, a2 * source_energy[i] / data_energy);
        }
        let rec_energy: f64 = rows
            .iter()
            .map(|&r| recomposed.row(r).dot(&recomposed.row(r)))
            .sum();
        total.insert(*kind, rec_energy / data_energy);
    }
    (per_component, total)
}

/// Fit, ask `provider` for exclusions, and reconstruct.
///
/// An invalid answer returns [`PrepError::InvalidSelection`] before anything
/// is reconstructed.
pub fn isolate(
    recording_id: &str,
    filtered: &Recording,
    cfg: &IcaConfig,
    provider: &mut dyn DecisionProvider,
) -> Result<(Recording, Ica)> {
    let mut ica = Ica::fit(filtered, cfg)?;
    let exclude = decision::request_exclusions(recording_id, filtered, &ica, provider)?;
    ica.set_exclude(exclude)?;
    let cleaned = ica.apply(filtered)?;
    Ok((cleaned, ica))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Channel;

    /// Three channels mixing a sine, a sawtooth, and a square wave.
    fn mixed_recording() -> Recording {
        let n_t = 5000;
        let src = Array2::from_shape_fn((3, n_t), |(c, t)| {
            let t = t as f64 / 250.0;
            match c {
                0 => (2.0 * std::f64::consts::PI * 7.0 * t).sin(),
                1 => 2.0 * ((t * 3.0).fract() - 0.5),
                _ => (2.0 * std::f64::consts::PI * 1.3 * t).sin().signum(),
            }
        });
        let a = ndarray::array![[1.0, 0.5, 0.2], [0.3, 1.0, 0.4], [0.6, 0.2, 1.0]];
        let channels = (1..=3).map(|i| Channel::eeg(format!("ch_{i}"))).collect();
        Recording::new(a.dot(&src), 250.0, channels).unwrap()
    }

    fn cfg(k: usize) -> IcaConfig {
        IcaConfig { n_components: k, ..IcaConfig::default() }
    }

    #[test]
    fn mixing_inverts_unmixing_at_full_rank() {
        let ica = Ica::fit(&mixed_recording(), &cfg(3)).unwrap();
        let eye = ica.unmixing.dot(&ica.mixing);
        for i in 0..3 {
            for j in 0..3 {
                let e = if i == j { 1.0 } else { 0.0 };
                approx::assert_abs_diff_eq!(eye[[i, j]], e, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn same_seed_same_decomposition() {
        let rec = mixed_recording();
        let a = Ica::fit(&rec, &cfg(3)).unwrap();
        let b = Ica::fit(&rec, &cfg(3)).unwrap();
        assert_eq!(a.unmixing, b.unmixing);
        assert_eq!(a.mixing, b.mixing);
    }

    #[test]
    fn sources_are_uncorrelated() {
        let rec = mixed_recording();
        let ica = Ica::fit(&rec, &cfg(3)).unwrap();
        let s = ica.sources(&rec).unwrap();
        let n = s.ncols() as f64;
        let cov = s.dot(&s.t()) / n;
        for i in 0..3 {
            for j in 0..3 {
                if i != j {
                    let r = cov[[i, j]] / (cov[[i, i]] * cov[[j, j]]).sqrt();
                    assert!(r.abs() < 1e-3, "corr({i}, {j}) = {r}");
                }
            }
        }
    }

    #[test]
    fn full_rank_explains_all_variance() {
        let ica = Ica::fit(&mixed_recording(), &cfg(3)).unwrap();
        let total = ica.total_explained_variance[&ChannelKind::Eeg];
        approx::assert_abs_diff_eq!(total, 1.0, epsilon = 1e-8);
    }

    #[test]
    fn excluding_nothing_is_identity() {
        let rec = mixed_recording();
        let ica = Ica::fit(&rec, &cfg(3)).unwrap();
        assert_eq!(ica.apply(&rec).unwrap().data, rec.data);
    }

    #[test]
    fn excluding_everything_leaves_the_mean() {
        let rec = mixed_recording();
        let mut ica = Ica::fit(&rec, &cfg(3)).unwrap();
        ica.set_exclude((0..3).collect()).unwrap();
        let out = ica.apply(&rec).unwrap();
        for c in 0..3 {
            for &v in out.data.row(c).iter() {
                approx::assert_abs_diff_eq!(v, ica.mean[c], epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn out_of_range_exclusion_rejected() {
        let mut ica = Ica::fit(&mixed_recording(), &cfg(2)).unwrap();
        let err = ica.set_exclude([0, 2].into_iter().collect()).unwrap_err();
        assert!(matches!(err, PrepError::InvalidSelection { .. }));
        assert!(ica.exclude.is_empty());
    }

    #[test]
    fn too_many_components_rejected() {
        assert!(matches!(
            Ica::fit(&mixed_recording(), &cfg(4)),
            Err(PrepError::InvalidParameter(_))
        ));
    }
}
