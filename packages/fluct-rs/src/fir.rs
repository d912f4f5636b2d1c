//! FIR Filter Design
//!
//! Windowed-sinc kernels (Blackman window) for low-pass, high-pass and
//! band-block responses. The high-pass response reuses the low-pass kernel and
//! subtracts its output from the input at apply time.

use crate::error::{FluctError, Result};
use crate::types::{FilterKind, FirResponse};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Transition bandwidth used when the caller does not pick one
pub const DEFAULT_TRANSITION_BANDWIDTH: f64 = 0.08;

/// Longest kernel a filter may be designed with
pub const MAX_KERNEL_TAPS: usize = 1 << 20;

/// Immutable FIR filter: the response it was designed for plus its kernel
#[derive(Debug, Clone)]
pub struct FirFilter {
    response: FirResponse,
    sample_rate: f64,
    transition_bandwidth: f64,
    kernel: Vec<f64>,
}

impl FirFilter {
    /// Design a filter
    ///
    /// # Arguments
    /// * `response` - Response kind and cutoff frequencies (Hz)
    /// * `sample_rate` - Sampling rate (Hz)
    /// * `transition_bandwidth` - Normalized transition width `b`; the kernel
    ///   has `ceil(4 / b)` taps, rounded up to an odd count
    pub fn new(response: FirResponse, sample_rate: f64, transition_bandwidth: f64) -> Result<Self> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(FluctError::InvalidParameter(format!(
                "Sample rate must be positive, got {}",
                sample_rate
            )));
        }
        if !transition_bandwidth.is_finite() || transition_bandwidth <= 0.0 {
            return Err(FluctError::InvalidParameter(format!(
                "Transition bandwidth must be positive, got {}",
                transition_bandwidth
            )));
        }

        let taps = kernel_length(transition_bandwidth);
        if taps > MAX_KERNEL_TAPS {
            return Err(FluctError::InvalidParameter(format!(
                "Transition bandwidth {} needs {} taps, more than the maximum of {}",
                transition_bandwidth, taps, MAX_KERNEL_TAPS
            )));
        }

        let nyquist = sample_rate / 2.0;
        match response {
            FirResponse::LowPass { cutoff_hz } | FirResponse::HighPass { cutoff_hz } => {
                check_cutoff("Cutoff", cutoff_hz, nyquist)?;
            }
            FirResponse::BandBlock { low_hz, high_hz } => {
                check_cutoff("Low cutoff", low_hz, nyquist)?;
                check_cutoff("High cutoff", high_hz, nyquist)?;
                if low_hz >= high_hz {
                    return Err(FluctError::InvalidParameter(format!(
                        "Low cutoff ({} Hz) must be less than high cutoff ({} Hz)",
                        low_hz, high_hz
                    )));
                }
            }
        }

        let kernel = match response {
            FirResponse::LowPass { cutoff_hz } | FirResponse::HighPass { cutoff_hz } => {
                windowed_sinc_lowpass(cutoff_hz / sample_rate, taps)
            }
            FirResponse::BandBlock { low_hz, high_hz } => {
                let upper = spectral_inversion(windowed_sinc_lowpass(high_hz / sample_rate, taps));
                windowed_sinc_lowpass(low_hz / sample_rate, taps)
                    .into_iter()
                    .zip(upper)
                    .map(|(lo, hi)| lo + hi)
                    .collect()
            }
        };

        log::debug!("[FIR] Designed {:?} kernel with {} taps", response, taps);

        Ok(Self {
            response,
            sample_rate,
            transition_bandwidth,
            kernel,
        })
    }

    /// Design a filter from the `(kind, fs, fL, fH, b)` form
    ///
    /// `Pass` with `fL = 0` is a low-pass at `fH`, `Pass` with `fH = 0` is a
    /// high-pass at `fL`, `Block` rejects `fL..fH`. A `Pass` with both
    /// cutoffs set would be a band-pass, which is not offered.
    pub fn from_cutoffs(
        kind: FilterKind,
        sample_rate: f64,
        low_hz: f64,
        high_hz: f64,
        transition_bandwidth: f64,
    ) -> Result<Self> {
        let response = match kind {
            FilterKind::Pass if low_hz == 0.0 && high_hz == 0.0 => {
                return Err(FluctError::InvalidParameter(
                    "Pass filter needs one non-zero cutoff".to_string(),
                ));
            }
            FilterKind::Pass if low_hz == 0.0 => FirResponse::LowPass { cutoff_hz: high_hz },
            FilterKind::Pass if high_hz == 0.0 => FirResponse::HighPass { cutoff_hz: low_hz },
            FilterKind::Pass => {
                return Err(FluctError::InvalidParameter(format!(
                    "Pass filter takes a single cutoff, got {} Hz and {} Hz",
                    low_hz, high_hz
                )));
            }
            FilterKind::Block => FirResponse::BandBlock { low_hz, high_hz },
        };

        Self::new(response, sample_rate, transition_bandwidth)
    }

    pub fn response(&self) -> FirResponse {
        self.response
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn transition_bandwidth(&self) -> f64 {
        self.transition_bandwidth
    }

    /// Kernel coefficients (the low-pass kernel for a high-pass response)
    pub fn kernel(&self) -> &[f64] {
        &self.kernel
    }

    pub fn taps(&self) -> usize {
        self.kernel.len()
    }

    /// Filter a signal and return a new, time-aligned signal of the same length
    pub fn apply(&self, signal: &[f64]) -> Result<Vec<f64>> {
        if signal.is_empty() || signal.len() < self.kernel.len() {
            return Err(FluctError::ShapeMismatch(format!(
                "Signal has {} samples, kernel needs at least {}",
                signal.len(),
                self.kernel.len()
            )));
        }

        let filtered = self.convolve_aligned(signal);

        match self.response {
            FirResponse::HighPass { .. } => Ok(signal
                .iter()
                .zip(filtered)
                .map(|(&x, low)| x - low)
                .collect()),
            _ => Ok(filtered),
        }
    }

    /// Filter every channel in parallel
    pub fn apply_channels(&self, channels: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        channels
            .par_iter()
            .map(|channel| self.apply(channel))
            .collect()
    }

    /// Zero-phase amplitude of the effective (delay-corrected) response at `freq_hz`
    pub fn amplitude_response(&self, freq_hz: f64) -> f64 {
        let omega = 2.0 * PI * freq_hz / self.sample_rate;
        let center = (self.kernel.len() - 1) as f64 / 2.0;
        let amplitude: f64 = self
            .kernel
            .iter()
            .enumerate()
            .map(|(n, &h)| h * (omega * (n as f64 - center)).cos())
            .sum();

        match self.response {
            FirResponse::HighPass { .. } => 1.0 - amplitude,
            _ => amplitude,
        }
    }

    /// Slice of the full convolution starting at `taps / 2`, which undoes the
    /// group delay of the symmetric kernel.
    fn convolve_aligned(&self, signal: &[f64]) -> Vec<f64> {
        let taps = self.kernel.len();
        let len = signal.len();
        let offset = taps / 2;

        (0..len)
            .map(|i| {
                let k = i + offset;
                let first = k.saturating_sub(len - 1);
                let last = k.min(taps - 1);
                (first..=last)
                    .map(|j| self.kernel[j] * signal[k - j])
                    .sum::<f64>()
            })
            .collect()
    }
}

fn check_cutoff(label: &str, freq_hz: f64, nyquist: f64) -> Result<()> {
    if !freq_hz.is_finite() || freq_hz <= 0.0 {
        return Err(FluctError::InvalidParameter(format!(
            "{} must be positive, got {} Hz",
            label, freq_hz
        )));
    }
    if freq_hz > nyquist {
        return Err(FluctError::InvalidParameter(format!(
            "{} ({} Hz) must not exceed Nyquist ({} Hz)",
            label, freq_hz, nyquist
        )));
    }
    Ok(())
}

/// Odd number of taps for transition bandwidth `b`
pub fn kernel_length(transition_bandwidth: f64) -> usize {
    let n = ((4.0 / transition_bandwidth).ceil() as usize).max(1);
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn blackman(taps: usize) -> Vec<f64> {
    if taps == 1 {
        return vec![1.0];
    }
    let m = (taps - 1) as f64;
    (0..taps)
        .map(|n| {
            let x = n as f64 / m;
            0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
        })
        .collect()
}

/// Blackman-windowed sinc with normalized cutoff `fc` (cycles per sample),
/// scaled to unity DC gain
fn windowed_sinc_lowpass(fc: f64, taps: usize) -> Vec<f64> {
    let center = (taps - 1) as f64 / 2.0;
    let mut h: Vec<f64> = blackman(taps)
        .into_iter()
        .enumerate()
        .map(|(n, w)| sinc(2.0 * fc * (n as f64 - center)) * w)
        .collect();

    let sum: f64 = h.iter().sum();
    for coeff in &mut h {
        *coeff /= sum;
    }
    h
}

/// Turn a low-pass kernel into the complementary high-pass
fn spectral_inversion(mut kernel: Vec<f64>) -> Vec<f64> {
    for coeff in &mut kernel {
        *coeff = -*coeff;
    }
    let center = (kernel.len() - 1) / 2;
    kernel[center] += 1.0;
    kernel
}
