//! IIR bandpass filtering.
//!
//! - [`design`]: Butterworth second-order-section design (bilinear transform).
//! - [`apply`]: zero-phase forward-backward application, matching
//!   `scipy.signal.sosfiltfilt` with odd padding.
//!
//! [`bandpass`] is the stage entry point used by the pipeline:
//! the equivalent of `raw.filter(l_freq, h_freq, method='iir')`.

pub mod apply;
pub mod design;

pub use apply::{apply_sos_zero_phase, filtfilt_1d};
pub use design::{
    butter_bandpass, butter_highpass, butter_lowpass, estimate_ringing_samples,
    magnitude_response, Biquad,
};

use log::{debug, info};

use crate::error::{PrepError, Result};
use crate::recording::Recording;

/// Upper bound on the padding search, in samples.
const MAX_RINGING_SAMPLES: usize = 100_000;

/// Zero-phase Butterworth bandpass of every channel of `rec`.
///
/// Returns a new recording with the same channels, sample count, and
/// metadata. The output depends only on the samples, `l_freq`, `h_freq`,
/// `order`, and the sampling rate.
pub fn bandpass(rec: &Recording, l_freq: f64, h_freq: f64, order: usize) -> Result<Recording> {
    let sfreq = rec.sfreq();
    let nyquist = sfreq / 2.0;
    if !(l_freq > 0.0 && l_freq < h_freq && h_freq < nyquist) {
        return Err(PrepError::InvalidParameter(format!(
            "bandpass requires 0 < l_freq < h_freq < nyquist, got {l_freq}..{h_freq} Hz \
             at {sfreq} Hz"
        )));
    }
    if order == 0 {
        return Err(PrepError::InvalidParameter("filter order must be at least 1".into()));
    }

    let sos = butter_bandpass(l_freq, h_freq, sfreq, order);
    let padlen = estimate_ringing_samples(&sos, MAX_RINGING_SAMPLES);
    debug!("bandpass {} sections, padlen {}", sos.len(), padlen);

    let mut data = rec.data.clone();
    apply_sos_zero_phase(&mut data, &sos, padlen)?;
    info!("filtered {} ch: {l_freq}-{h_freq} Hz, order {order} IIR zero-phase", rec.n_channels());
    rec.with_data(data)
}
