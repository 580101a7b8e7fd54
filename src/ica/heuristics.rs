//! Automated exclusion decisions.
//!
//! Each component is scored against three artifact signatures and excluded
//! when any score crosses its threshold:
//!
//! - **ocular**: `|r|` between the source and the mean of the frontal proxy
//!   channels (blinks and saccades dominate frontopolar sensors);
//! - **line noise**: fraction of source power within ±1 Hz of the mains
//!   frequency;
//! - **muscle**: fraction of source power above `muscle_low` Hz.
//!
//! The answer is rendered as the same index text an operator would type, so
//! it goes through the same validation.
use log::debug;
use ndarray::{Array1, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use super::decision::{DecisionProvider, Review};
use crate::error::Result;
use crate::spectrum::welch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Labels averaged into the ocular proxy. Missing labels are ignored.
    pub frontal_proxies: Vec<String>,
    pub ocular_threshold: f64,
    pub line_freq: f64,
    pub line_threshold: f64,
    pub muscle_low: f64,
    pub muscle_threshold: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            frontal_proxies: ["FPz", "AF3", "AF4"].iter().map(|s| s.to_string()).collect(),
            ocular_threshold: 0.7,
            line_freq: 50.0,
            line_threshold: 0.5,
            muscle_low: 20.0,
            muscle_threshold: 0.6,
        }
    }
}

/// Per-component artifact scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentScores {
    pub ocular: Option<f64>,
    pub line: f64,
    pub muscle: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicProvider {
    pub cfg: HeuristicConfig,
}

impl HeuristicProvider {
    pub fn new(cfg: HeuristicConfig) -> Self {
        Self { cfg }
    }

    pub fn score(&self, review: &Review<'_>) -> Vec<ComponentScores> {
        let rec = review.recording;
        let sfreq = rec.sfreq();
        let proxy_rows: Vec<usize> = self
            .cfg
            .frontal_proxies
            .iter()
            .filter_map(|l| rec.channel_index(l))
            .collect();
        let proxy: Option<Array1<f64>> = if proxy_rows.is_empty() {
            None
        } else {
            rec.data.select(Axis(0), &proxy_rows).mean_axis(Axis(0))
        };

        let nperseg = (2.0 * sfreq).round() as usize;
        review
            .sources
            .rows()
            .into_iter()
            .map(|s| {
                let psd = welch(&s.to_vec(), sfreq, nperseg);
                let total = psd.total_power().max(f64::MIN_POSITIVE);
                let lf = self.cfg.line_freq;
                ComponentScores {
                    ocular: proxy.as_ref().map(|p| pearson(s, p.view()).abs()),
                    line: psd.band_power(lf - 1.0, lf + 1.0) / total,
                    muscle: psd.band_power(self.cfg.muscle_low, f64::INFINITY) / total,
                }
            })
            .collect()
    }
}

impl DecisionProvider for HeuristicProvider {
    fn request(&mut self, review: &Review<'_>) -> Result<String> {
        let scores = self.score(review);
        let picked: Vec<String> = scores
            .iter()
            .enumerate()
            .filter(|(i, sc)| {
                let hit = sc.ocular.is_some_and(|r| r >= self.cfg.ocular_threshold)
                    || sc.line >= self.cfg.line_threshold
                    || sc.muscle >= self.cfg.muscle_threshold;
                let verdict = if hit { "exclude" } else { "keep" };
                debug!("{} ICA{i:03}: {sc:?} -> {verdict}", review.recording_id);
                hit
            })
            .map(|(i, _)| i.to_string())
            .collect();
        Ok(picked.join(" "))
    }
}

fn pearson(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let ma = a.iter().take(n).sum::<f64>() / n as f64;
    let mb = b.iter().take(n).sum::<f64>() / n as f64;
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b.iter()).take(n) {
        let (dx, dy) = (x - ma, y - mb);
        sab += dx * dy;
        saa += dx * dx;
        sbb += dy * dy;
    }
    if saa <= 0.0 || sbb <= 0.0 {
        0.0
    } else {
        sab / (saa * sbb).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pearson_of_scaled_copy_is_one() {
        let a = Array1::from_iter((0..100).map(|i| (i as f64 * 0.3).sin()));
        let b = a.mapv(|v| -3.0 * v + 1.0);
        approx::assert_abs_diff_eq!(pearson(a.view(), b.view()), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn pearson_of_constant_is_zero() {
        let a = Array1::from_elem(10, 2.0);
        let b = Array1::from_iter((0..10).map(|i| i as f64));
        assert_eq!(pearson(a.view(), b.view()), 0.0);
    }
}
