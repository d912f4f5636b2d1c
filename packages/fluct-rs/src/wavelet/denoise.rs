//! Coherent/incoherent split of a 2-D array
//!
//! The noise floor is the fixed point of
//! `e = alpha * sqrt(var(c) * ln(|c|))` evaluated over the coefficients with
//! magnitude below the current `e`. Coefficients under the floor are the
//! incoherent part; the rest are transformed back as the coherent signal.

use super::transform::Dwt2;
use crate::error::{FluctError, Result};
use crate::stats;
use crate::types::{checked_shape, WaveletFamily};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Configuration for the wavelet denoiser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveletDenoiserConfig {
    #[serde(default)]
    pub family: WaveletFamily,

    /// Scale factor on the noise threshold
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Relative threshold change (percent) at which the search stops
    #[serde(default = "default_tolerance_percent")]
    pub tolerance_percent: f64,

    /// Upper bound on threshold refinements
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Decomposition level; picked from the image size when absent
    #[serde(default)]
    pub level: Option<usize>,
}

fn default_alpha() -> f64 {
    1.0
}
fn default_tolerance_percent() -> f64 {
    5.0
}
fn default_max_iterations() -> usize {
    100
}

impl Default for WaveletDenoiserConfig {
    fn default() -> Self {
        Self {
            family: WaveletFamily::default(),
            alpha: 1.0,
            tolerance_percent: 5.0,
            max_iterations: 100,
            level: None,
        }
    }
}

/// Result of a denoising pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveletDenoiseOutput {
    /// Reconstruction from the coefficients above the noise floor
    pub coherent: Vec<Vec<f64>>,
    /// Square root of the energy above the noise floor
    pub coherent_level: f64,
    /// Square root of the energy below the noise floor
    pub incoherent_level: f64,
    /// Total coefficient energy; equals the input energy when no odd-length
    /// extension was needed
    pub total_energy: f64,
    /// Converged noise threshold
    pub threshold: f64,
    pub level: usize,
    pub iterations: usize,
}

#[derive(Debug, Clone)]
pub struct WaveletDenoiser {
    config: WaveletDenoiserConfig,
    dwt: Dwt2,
}

impl WaveletDenoiser {
    pub fn new(config: WaveletDenoiserConfig) -> Result<Self> {
        if !config.alpha.is_finite() || config.alpha <= 0.0 {
            return Err(FluctError::InvalidParameter(format!(
                "Threshold scale alpha must be positive, got {}",
                config.alpha
            )));
        }
        if !config.tolerance_percent.is_finite() || config.tolerance_percent <= 0.0 {
            return Err(FluctError::InvalidParameter(format!(
                "Convergence tolerance must be positive, got {}%",
                config.tolerance_percent
            )));
        }
        if config.max_iterations == 0 {
            return Err(FluctError::InvalidParameter(
                "Threshold search needs at least one iteration".to_string(),
            ));
        }
        if config.level == Some(0) {
            return Err(FluctError::InvalidParameter(
                "Decomposition level must be at least 1".to_string(),
            ));
        }

        let dwt = Dwt2::new(config.family);
        Ok(Self { config, dwt })
    }

    pub fn config(&self) -> &WaveletDenoiserConfig {
        &self.config
    }

    /// Split `image` (rows of equal length, at least 2 x 2) into coherent and
    /// incoherent parts
    pub fn apply(&self, image: &[Vec<f64>]) -> Result<WaveletDenoiseOutput> {
        let (rows, cols) = checked_shape(image)?;
        if rows < 2 || cols < 2 {
            return Err(FluctError::ShapeMismatch(format!(
                "Wavelet denoiser needs at least a 2x2 array, got {}x{}",
                rows, cols
            )));
        }
        if image.iter().flatten().any(|v| !v.is_finite()) {
            return Err(FluctError::NonFiniteInput(
                "Wavelet denoiser input contains NaN or infinite values".to_string(),
            ));
        }

        let level = self.resolve_level(rows.min(cols))?;
        let matrix = DMatrix::from_fn(rows, cols, |r, c| image[r][c]);

        let mut decomposition = self.dwt.decompose(&matrix, level)?;
        let coefficients: Vec<f64> = decomposition.coefficients().collect();
        let total_energy = stats::energy(&coefficients);

        let (threshold, iterations) = estimate_noise_threshold(
            &coefficients,
            self.config.alpha,
            self.config.tolerance_percent,
            self.config.max_iterations,
        );

        let incoherent_energy: f64 = coefficients
            .iter()
            .filter(|c| c.abs() < threshold)
            .map(|c| c * c)
            .sum();
        let coherent_level = (total_energy - incoherent_energy).max(0.0).sqrt();
        let incoherent_level = incoherent_energy.sqrt();

        log::debug!(
            "[WAVELET] {:?} level {} on {}x{}: threshold {:.4e} after {} iteration(s)",
            self.dwt.family(),
            level,
            rows,
            cols,
            threshold,
            iterations
        );

        decomposition.hard_threshold(threshold);
        let restored = self.dwt.reconstruct(&decomposition);
        let coherent = restored
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect();

        Ok(WaveletDenoiseOutput {
            coherent,
            coherent_level,
            incoherent_level,
            total_energy,
            threshold,
            level,
            iterations,
        })
    }

    fn resolve_level(&self, min_dim: usize) -> Result<usize> {
        match self.config.level {
            None => Ok(decomposition_level(min_dim)),
            Some(level) => {
                let max_level = min_dim.next_power_of_two().trailing_zeros() as usize;
                if level > max_level {
                    return Err(FluctError::ShapeMismatch(format!(
                        "Smallest dimension {} is too small for decomposition level {} (max {})",
                        min_dim, level, max_level
                    )));
                }
                Ok(level)
            }
        }
    }
}

/// Level chosen for a smallest dimension `min_dim`: `log2` of whichever of the
/// enclosing powers of two `p/2 < min_dim <= p` is closer, `p/2` on a tie.
pub fn decomposition_level(min_dim: usize) -> usize {
    let upper = min_dim.max(2).next_power_of_two();
    let lower = upper / 2;
    let min_dim = min_dim.max(2);
    if upper - min_dim < min_dim - lower {
        upper.trailing_zeros() as usize
    } else {
        lower.trailing_zeros() as usize
    }
}

/// Iterate the noise threshold to a fixed point
///
/// Returns the threshold and the number of accepted refinements. The search
/// stops early, keeping the last valid threshold, when the subset below the
/// threshold is empty, has zero variance or would produce a zero threshold.
pub fn estimate_noise_threshold(
    coefficients: &[f64],
    alpha: f64,
    tolerance_percent: f64,
    max_iterations: usize,
) -> (f64, usize) {
    if coefficients.is_empty() {
        return (0.0, 0);
    }

    let mut threshold =
        alpha * (stats::variance(coefficients) * (coefficients.len() as f64).ln()).sqrt();
    let mut iterations = 0;

    while iterations < max_iterations && threshold > 0.0 {
        let below: Vec<f64> = coefficients
            .iter()
            .copied()
            .filter(|c| c.abs() < threshold)
            .collect();
        let variance = stats::variance(&below);
        if below.is_empty() || variance == 0.0 {
            break;
        }

        let next = alpha * (variance * (below.len() as f64).ln()).sqrt();
        if next.is_nan() || next <= 0.0 {
            break;
        }

        iterations += 1;
        let change = (next - threshold).abs() / threshold * 100.0;
        threshold = next;
        if change < tolerance_percent {
            break;
        }
    }

    (threshold, iterations)
}
