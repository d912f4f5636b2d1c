//! Per-channel baseline conditioning applied ahead of filtering

use crate::error::{FluctError, Result};
use crate::stats;
use crate::types::Normalization;
use std::ops::Range;

fn checked_window(len: usize, window: &Range<usize>) -> Result<()> {
    if window.start >= window.end || window.end > len {
        return Err(FluctError::ShapeMismatch(format!(
            "Baseline window {}..{} is empty or outside a signal of {} samples",
            window.start, window.end, len
        )));
    }
    Ok(())
}

/// Subtract the mean of `signal[window]` from every sample
pub fn remove_offset(signal: &[f64], window: Range<usize>) -> Result<Vec<f64>> {
    checked_window(signal.len(), &window)?;
    let offset = stats::mean(&signal[window]);
    Ok(signal.iter().map(|v| v - offset).collect())
}

/// Express `signal` as a fractional deviation from a reference mean
///
/// A zero reference mean cannot be divided out; the channel is returned
/// unchanged and the anomaly is logged.
pub fn normalize(signal: &[f64], normalization: &Normalization) -> Result<Vec<f64>> {
    let reference = match *normalization {
        Normalization::None => return Ok(signal.to_vec()),
        Normalization::Mean => stats::mean(signal),
        Normalization::Baseline { start, end } => {
            let window = start..end;
            checked_window(signal.len(), &window)?;
            stats::mean(&signal[window])
        }
    };

    if reference == 0.0 || !reference.is_finite() {
        log::warn!(
            "[CONDITION] Reference mean is {}, leaving channel unnormalized",
            reference
        );
        return Ok(signal.to_vec());
    }

    Ok(signal.iter().map(|v| v / reference - 1.0).collect())
}

/// Subtract the least-squares straight line through `signal`
pub fn detrend_linear(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n < 2 {
        return vec![0.0; n];
    }

    let t_mean = (n - 1) as f64 / 2.0;
    let y_mean = stats::mean(signal);
    let (num, den) = signal
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &y)| {
            let dt = i as f64 - t_mean;
            (num + dt * (y - y_mean), den + dt * dt)
        });
    let slope = num / den;

    signal
        .iter()
        .enumerate()
        .map(|(i, &y)| y - y_mean - slope * (i as f64 - t_mean))
        .collect()
}
