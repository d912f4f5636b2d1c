//! SVD Spatial Mode Filter
//!
//! The usable channels of a channel x time matrix become the columns of a
//! design matrix. Its singular modes are ranked by power and only the leading
//! modes that together reach `cutoff` of the total power are kept when the
//! channels are rebuilt.

use crate::error::{FluctError, Result};
use crate::stats;
use crate::types::checked_shape;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Fraction of cumulative mode power kept by default
pub const DEFAULT_SVD_CUTOFF: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvdFilter {
    cutoff: f64,
}

/// Result of an SVD filter pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvdFilterOutput {
    /// Filtered channels; unusable channels are copied through untouched
    pub data: Vec<Vec<f64>>,
    /// Mask actually used for this call (`true` = channel entered the SVD)
    pub channel_mask: Vec<bool>,
    /// Singular values of the design matrix before filtering, largest first
    pub singular_values: Vec<f64>,
    pub retained_modes: usize,
    /// Normalized Shannon entropy of the mode power distribution
    pub normalized_entropy: f64,
}

impl Default for SvdFilter {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_SVD_CUTOFF,
        }
    }
}

impl SvdFilter {
    /// Create a filter keeping modes up to `cutoff` of the total power, `0 < cutoff <= 1`
    pub fn new(cutoff: f64) -> Result<Self> {
        if !(cutoff > 0.0 && cutoff <= 1.0) {
            return Err(FluctError::InvalidParameter(format!(
                "SVD cutoff must be in (0, 1], got {}",
                cutoff
            )));
        }
        Ok(Self { cutoff })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Filter a channel x time matrix
    ///
    /// # Arguments
    /// * `data` - Channels as rows, at least 2 samples each
    /// * `channel_mask` - Optional usable-channel mask; computed when absent,
    ///   empty or all `false`
    pub fn apply(&self, data: &[Vec<f64>], channel_mask: Option<&[bool]>) -> Result<SvdFilterOutput> {
        let (num_channels, num_samples) = checked_shape(data)?;
        if num_samples < 2 {
            return Err(FluctError::ShapeMismatch(format!(
                "SVD filter needs at least 2 samples per channel, got {}",
                num_samples
            )));
        }

        let mask = resolve_channel_mask(data, channel_mask)?;
        let usable: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|&(_, &ok)| ok)
            .map(|(idx, _)| idx)
            .collect();

        let mut output = data.to_vec();

        if usable.is_empty() {
            log::warn!(
                "[SVD-FILT] None of {} channels is usable, data left unchanged",
                num_channels
            );
            return Ok(SvdFilterOutput {
                data: output,
                channel_mask: mask,
                singular_values: Vec::new(),
                retained_modes: 0,
                normalized_entropy: 0.0,
            });
        }

        log::info!(
            "[SVD-FILT] Decomposing {} of {} channels x {} samples (cutoff {})",
            usable.len(),
            num_channels,
            num_samples,
            self.cutoff
        );

        let scale = (num_samples as f64).sqrt();
        let means: Vec<f64> = usable
            .iter()
            .map(|&c| stats::mean(&data[c]) / scale)
            .collect();
        let x = DMatrix::from_fn(num_samples, usable.len(), |t, g| {
            data[usable[g]][t] / scale - means[g]
        });

        let mut svd = x.svd(true, true);

        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| {
            svd.singular_values[b]
                .partial_cmp(&svd.singular_values[a])
                .unwrap_or(Ordering::Equal)
        });
        let singular_values: Vec<f64> = order.iter().map(|&i| svd.singular_values[i]).collect();

        let power: Vec<f64> = singular_values.iter().map(|s| s * s).collect();
        let total_power: f64 = power.iter().sum();
        let normalized_power: Vec<f64> = if total_power > 0.0 {
            power.iter().map(|p| p / total_power).collect()
        } else {
            vec![0.0; power.len()]
        };
        let normalized_entropy = stats::normalized_entropy(&normalized_power);

        let retained_modes = if total_power > 0.0 {
            retained_mode_count(&normalized_power, self.cutoff)
        } else {
            order.len()
        };

        log::debug!(
            "[SVD-FILT] Normalized entropy {:.4}, keeping {} of {} modes",
            normalized_entropy,
            retained_modes,
            order.len()
        );

        for &idx in &order[retained_modes..] {
            svd.singular_values[idx] = 0.0;
        }

        let filtered = svd
            .recompose()
            .map_err(|e| FluctError::Numerical(e.to_string()))?;

        for (g, &c) in usable.iter().enumerate() {
            for (t, sample) in output[c].iter_mut().enumerate() {
                *sample = (filtered[(t, g)] + means[g]) * scale;
            }
        }

        Ok(SvdFilterOutput {
            data: output,
            channel_mask: mask,
            singular_values,
            retained_modes,
            normalized_entropy,
        })
    }
}

/// Decide which channels may enter the decomposition
///
/// A supplied mask with at least one `true` entry is used as given, except that
/// channels holding non-finite samples are always dropped. Otherwise a channel
/// is usable when it is finite and not flat.
pub fn resolve_channel_mask(data: &[Vec<f64>], supplied: Option<&[bool]>) -> Result<Vec<bool>> {
    if let Some(mask) = supplied {
        if !mask.is_empty() && mask.len() != data.len() {
            return Err(FluctError::ShapeMismatch(format!(
                "Channel mask has {} entries for {} channels",
                mask.len(),
                data.len()
            )));
        }

        if mask.iter().any(|&m| m) {
            return Ok(mask
                .iter()
                .zip(data)
                .enumerate()
                .map(|(idx, (&selected, channel))| {
                    if selected && channel.iter().any(|v| !v.is_finite()) {
                        log::warn!("[SVD-FILT] Channel {} has non-finite samples, excluded", idx);
                        false
                    } else {
                        selected
                    }
                })
                .collect());
        }
    }

    let mask: Vec<bool> = data.iter().map(|ch| stats::is_usable_channel(ch)).collect();
    let excluded = mask.iter().filter(|&&m| !m).count();
    if excluded > 0 {
        log::info!(
            "[SVD-FILT] Excluded {} flat or non-finite channel(s) of {}",
            excluded,
            data.len()
        );
    }
    Ok(mask)
}

/// Number of leading modes to keep: modes are taken in order until the kept
/// power reaches `cutoff`.
pub fn retained_mode_count(normalized_power: &[f64], cutoff: f64) -> usize {
    let mut kept = 0.0;
    for (idx, &p) in normalized_power.iter().enumerate() {
        if kept >= cutoff {
            return idx;
        }
        kept += p;
    }
    normalized_power.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn noisy_channels(channels: usize, samples: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..channels)
            .map(|c| {
                (0..samples)
                    .map(|t| {
                        (2.0 * PI * (c + 1) as f64 * t as f64 / samples as f64).sin()
                            + rng.gen_range(-0.5..0.5)
                            + c as f64
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_retained_mode_count() {
        let p = [0.5, 0.25, 0.25];
        assert_eq!(retained_mode_count(&p, 0.5), 1);
        assert_eq!(retained_mode_count(&p, 0.7), 2);
        assert_eq!(retained_mode_count(&p, 0.9), 3);
        assert_eq!(retained_mode_count(&p, 1.0), 3);
    }

    #[test]
    fn test_full_cutoff_is_identity() {
        let data = noisy_channels(4, 200, 11);
        let filter = SvdFilter::new(1.0).unwrap();
        let out = filter.apply(&data, None).unwrap();

        assert_eq!(out.retained_modes, 4);
        assert_eq!(out.channel_mask, vec![true; 4]);
        for (orig, filt) in data.iter().zip(&out.data) {
            for (a, b) in orig.iter().zip(filt) {
                assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_zero_channel_excluded() {
        let mut data = noisy_channels(3, 500, 3);
        data[2] = vec![0.0; 500];

        let out = SvdFilter::default().apply(&data, None).unwrap();
        assert_eq!(out.channel_mask, vec![true, true, false]);
        assert_eq!(out.data[2], vec![0.0; 500]);
        assert_eq!(out.singular_values.len(), 2);
    }

    #[test]
    fn test_masked_channels_untouched() {
        let mut data = noisy_channels(4, 128, 5);
        data[1][7] = f64::NAN;
        let mask = [true, false, true, true];

        let out = SvdFilter::new(0.5).unwrap().apply(&data, Some(&mask)).unwrap();
        assert_eq!(out.channel_mask, mask.to_vec());
        let original: Vec<u64> = data[1].iter().map(|v| v.to_bits()).collect();
        let returned: Vec<u64> = out.data[1].iter().map(|v| v.to_bits()).collect();
        assert_eq!(original, returned);
    }

    #[test]
    fn test_supplied_mask_drops_non_finite() {
        let mut data = noisy_channels(3, 64, 9);
        data[0][3] = f64::INFINITY;

        let out = SvdFilter::default().apply(&data, Some(&[true, true, true])).unwrap();
        assert_eq!(out.channel_mask, vec![false, true, true]);
        assert!(out.data[0][3].is_infinite());
    }

    #[test]
    fn test_common_mode_kept_noise_removed() {
        let mut rng = StdRng::seed_from_u64(42);
        let samples = 400;
        let clean: Vec<f64> = (0..samples)
            .map(|t| (2.0 * PI * t as f64 / 50.0).sin())
            .collect();
        let gains = [1.0, 0.8, 1.2, 0.9, 1.1, 0.7, 1.3, 1.0];

        let data: Vec<Vec<f64>> = gains
            .iter()
            .map(|g| clean.iter().map(|s| g * s + rng.gen_range(-0.05..0.05)).collect())
            .collect();

        let out = SvdFilter::new(0.9).unwrap().apply(&data, None).unwrap();
        assert_eq!(out.retained_modes, 1);
        assert!(out.normalized_entropy < 0.5);

        let error = |rows: &[Vec<f64>]| -> f64 {
            rows.iter()
                .zip(gains.iter())
                .map(|(row, g)| {
                    row.iter()
                        .zip(&clean)
                        .map(|(x, s)| (x - g * s).powi(2))
                        .sum::<f64>()
                })
                .sum()
        };
        assert!(error(&out.data) < error(&data) * 0.5);
    }

    #[test]
    fn test_all_channels_unusable() {
        let data = vec![vec![1.0; 10], vec![f64::NAN; 10]];
        let out = SvdFilter::default().apply(&data, None).unwrap();
        assert_eq!(out.channel_mask, vec![false, false]);
        assert_eq!(out.retained_modes, 0);
        assert_eq!(out.data[0], data[0]);
        assert!(out.data[1].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_shape_errors() {
        let filter = SvdFilter::default();
        let data = noisy_channels(3, 20, 1);
        assert!(matches!(
            filter.apply(&data, Some(&[true, false])),
            Err(FluctError::ShapeMismatch(_))
        ));

        let ragged = vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0]];
        assert!(matches!(filter.apply(&ragged, None), Err(FluctError::ShapeMismatch(_))));

        let single = vec![vec![1.0], vec![2.0]];
        assert!(matches!(filter.apply(&single, None), Err(FluctError::ShapeMismatch(_))));
    }

    #[test]
    fn test_invalid_cutoff() {
        for cutoff in [0.0, -0.1, 1.5, f64::NAN] {
            assert!(SvdFilter::new(cutoff).is_err(), "cutoff {} accepted", cutoff);
        }
    }
}
