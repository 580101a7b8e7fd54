mod common;
use common::{zeros_recording, SFREQ};
use exg_prep::filter::{butter_bandpass, magnitude_response};
use exg_prep::{bandpass, PrepError};
use std::f64::consts::PI;

fn sine_recording(freq: f64, n_t: usize) -> exg_prep::Recording {
    let mut rec = zeros_recording(2, n_t);
    for ((c, t), v) in rec.data.indexed_iter_mut() {
        *v = (2.0 * PI * freq * t as f64 / SFREQ + c as f64).sin();
    }
    rec
}

fn middle_peak(rec: &exg_prep::Recording) -> f64 {
    let n = rec.n_times();
    rec.data
        .slice(ndarray::s![.., n / 4..3 * n / 4])
        .iter()
        .fold(0.0_f64, |m, v| m.max(v.abs()))
}

#[test]
fn shape_and_metadata_preserved() {
    let mut rec = sine_recording(10.0, 5000);
    rec.annotations.push(exg_prep::Annotation { onset: 1.0, duration: 0.0, description: "imagery up".into() });
    for (l, h) in [(1.0, 45.0), (0.5, 30.0), (4.0, 100.0), (1.0, 124.0)] {
        let out = bandpass(&rec, l, h, 4).unwrap();
        assert_eq!(out.data.dim(), rec.data.dim(), "{l}..{h}");
        assert_eq!(out.channels, rec.channels);
        assert_eq!(out.annotations, rec.annotations);
        assert_eq!(out.sfreq(), rec.sfreq());
        assert!(out.data.iter().all(|v| v.is_finite()), "{l}..{h}");
    }
}

#[test]
fn passband_sine_is_untouched() {
    let rec = sine_recording(10.0, 5000);
    let out = bandpass(&rec, 1.0, 45.0, 4).unwrap();
    let n = rec.n_times();
    for c in 0..2 {
        for t in n / 4..3 * n / 4 {
            approx::assert_abs_diff_eq!(out.data[[c, t]], rec.data[[c, t]], epsilon = 1e-2);
        }
    }
}

#[test]
fn stopband_sines_are_attenuated() {
    for freq in [0.1, 100.0] {
        let out = bandpass(&sine_recording(freq, 10_000), 1.0, 45.0, 4).unwrap();
        let peak = middle_peak(&out);
        assert!(peak < 0.01, "{freq} Hz: peak {peak}");
    }
}

#[test]
fn dc_offset_is_removed() {
    let mut rec = sine_recording(10.0, 5000);
    rec.data += 50.0;
    let out = bandpass(&rec, 1.0, 45.0, 4).unwrap();
    let n = rec.n_times();
    let mean = out.data.slice(ndarray::s![0, n / 4..3 * n / 4]).mean().unwrap();
    assert!(mean.abs() < 0.05, "residual mean {mean}");
}

#[test]
fn output_is_deterministic() {
    let rec = sine_recording(7.0, 3000);
    let a = bandpass(&rec, 1.0, 45.0, 4).unwrap();
    let b = bandpass(&rec, 1.0, 45.0, 4).unwrap();
    assert_eq!(a.data, b.data);
}

#[test]
fn invalid_cutoffs_rejected() {
    let rec = sine_recording(10.0, 1000);
    for (l, h) in [(0.0, 45.0), (45.0, 1.0), (10.0, 10.0), (1.0, 125.0), (1.0, 200.0)] {
        assert!(
            matches!(bandpass(&rec, l, h, 4), Err(PrepError::InvalidParameter(_))),
            "accepted {l}..{h}"
        );
    }
    assert!(bandpass(&rec, 1.0, 45.0, 0).is_err());
}

#[test]
fn design_has_unit_gain_mid_band() {
    let sos = butter_bandpass(1.0, 45.0, SFREQ, 4);
    approx::assert_abs_diff_eq!(magnitude_response(&sos, 10.0, SFREQ), 1.0, epsilon = 1e-3);
    let at_edge = magnitude_response(&sos, 45.0, SFREQ);
    approx::assert_abs_diff_eq!(at_edge, std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-2);
}
