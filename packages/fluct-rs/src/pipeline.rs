//! Conditioning Pipeline
//!
//! Runs the configured stages over a channel x time block:
//! 1. Offset removal, normalisation and linear detrend (per channel)
//! 2. FIR filter (per channel, in parallel)
//! 3. SVD mode filter (across channels)
//! 4. Wavelet coherent/incoherent split of the resulting map
//!
//! Channels left out of the usable mask (null after offset removal, non-finite
//! or flat) are zeroed in the map handed to the wavelet stage.

use crate::conditioning::{detrend_linear, normalize, remove_offset};
use crate::error::{FluctError, Result};
use crate::fir::{FirFilter, DEFAULT_TRANSITION_BANDWIDTH};
use crate::profile_scope;
use crate::profiling::ProfileScope;
use crate::stats;
use crate::svd::{resolve_channel_mask, SvdFilter, DEFAULT_SVD_CUTOFF};
use crate::types::{checked_shape, FirResponse, Normalization};
use crate::wavelet::{WaveletDenoiseOutput, WaveletDenoiser, WaveletDenoiserConfig};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;

/// FIR stage settings; the sample rate comes from the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirStage {
    pub response: FirResponse,

    /// Transition bandwidth as a fraction of the sample rate
    #[serde(default = "default_transition_bandwidth")]
    pub transition_bandwidth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvdStage {
    /// Fraction of cumulative mode power to keep
    #[serde(default = "default_svd_cutoff")]
    pub cutoff: f64,
}

impl Default for SvdStage {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_SVD_CUTOFF,
        }
    }
}

/// Configuration for the conditioning pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Sample rate of the data (Hz)
    pub sample_rate: f64,

    /// Sample window whose mean is subtracted from each channel; channels
    /// whose mean is exactly zero afterwards carry no data and are masked out
    #[serde(default)]
    pub offset_window: Option<Range<usize>>,

    #[serde(default)]
    pub normalization: Normalization,

    /// Remove a least-squares line from each channel
    #[serde(default)]
    pub detrend: bool,

    #[serde(default)]
    pub fir: Option<FirStage>,

    #[serde(default)]
    pub svd: Option<SvdStage>,

    #[serde(default)]
    pub wavelet: Option<WaveletDenoiserConfig>,
}

fn default_transition_bandwidth() -> f64 {
    DEFAULT_TRANSITION_BANDWIDTH
}
fn default_svd_cutoff() -> f64 {
    DEFAULT_SVD_CUTOFF
}

impl PipelineConfig {
    /// Config with no stages enabled
    pub fn passthrough(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            offset_window: None,
            normalization: Normalization::None,
            detrend: false,
            fir: None,
            svd: None,
            wavelet: None,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("[PIPELINE] Loading config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

/// Result of running the pipeline over one block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Conditioned channel data (before the wavelet split)
    pub channels: Vec<Vec<f64>>,
    /// Channels considered usable (`true`) for the block
    pub channel_mask: Vec<bool>,
    pub wavelet: Option<WaveletDenoiseOutput>,
    /// Processing time in milliseconds
    pub processing_time_ms: f64,
}

/// Conditioning pipeline with every stage built and validated up front
#[derive(Debug, Clone)]
pub struct ConditioningPipeline {
    config: PipelineConfig,
    fir: Option<FirFilter>,
    svd: Option<SvdFilter>,
    wavelet: Option<WaveletDenoiser>,
}

impl ConditioningPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        if !config.sample_rate.is_finite() || config.sample_rate <= 0.0 {
            return Err(FluctError::InvalidParameter(format!(
                "Sample rate must be positive, got {}",
                config.sample_rate
            )));
        }
        if let Some(window) = &config.offset_window {
            if window.start >= window.end {
                return Err(FluctError::InvalidParameter(format!(
                    "Offset window {}..{} is empty",
                    window.start, window.end
                )));
            }
        }
        if let Normalization::Baseline { start, end } = config.normalization {
            if start >= end {
                return Err(FluctError::InvalidParameter(format!(
                    "Baseline window {}..{} is empty",
                    start, end
                )));
            }
        }

        let fir = config
            .fir
            .as_ref()
            .map(|stage| {
                FirFilter::new(stage.response, config.sample_rate, stage.transition_bandwidth)
            })
            .transpose()?;
        let svd = config
            .svd
            .as_ref()
            .map(|stage| SvdFilter::new(stage.cutoff))
            .transpose()?;
        let wavelet = config
            .wavelet
            .clone()
            .map(WaveletDenoiser::new)
            .transpose()?;

        log::info!(
            "[PIPELINE] Configured at {} Hz: fir={}, svd={}, wavelet={}",
            config.sample_rate,
            fir.is_some(),
            svd.is_some(),
            wavelet.is_some()
        );

        Ok(Self {
            config,
            fir,
            svd,
            wavelet,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Offset removal, normalisation and detrend for one channel; the flag
    /// marks a channel with no data left after offset removal
    fn condition_channel(&self, channel: &[f64]) -> Result<(Vec<f64>, bool)> {
        let (offset_free, null) = match &self.config.offset_window {
            Some(window) => {
                let v = remove_offset(channel, window.clone())?;
                let null = stats::mean(&v) == 0.0;
                (v, null)
            }
            None => (channel.to_vec(), false),
        };

        let normalized = normalize(&offset_free, &self.config.normalization)?;
        let conditioned = if self.config.detrend {
            detrend_linear(&normalized)
        } else {
            normalized
        };
        Ok((conditioned, null))
    }

    /// Condition a channel x time block; the input is left untouched
    pub fn process(
        &self,
        channels: &[Vec<f64>],
        channel_mask: Option<&[bool]>,
    ) -> Result<PipelineOutput> {
        let scope = ProfileScope::new("pipeline");
        let (num_channels, num_samples) = checked_shape(channels)?;

        let (mut processed, null_channels): (Vec<Vec<f64>>, Vec<bool>) = {
            profile_scope!("conditioning");
            let conditioned = channels
                .par_iter()
                .map(|channel| self.condition_channel(channel))
                .collect::<Result<Vec<_>>>()?;
            conditioned.into_iter().unzip()
        };

        if let Some(fir) = &self.fir {
            profile_scope!("fir");
            processed = fir.apply_channels(&processed)?;
        }

        let requested_mask = if null_channels.iter().any(|&null| null) {
            let mut mask = resolve_channel_mask(&processed, channel_mask)?;
            for (idx, (usable, &null)) in mask.iter_mut().zip(&null_channels).enumerate() {
                if null {
                    log::warn!("[PIPELINE] Channel {} is null after offset removal, excluded", idx);
                    *usable = false;
                }
            }
            Some(mask)
        } else {
            channel_mask.map(<[bool]>::to_vec)
        };

        let mut channel_mask = match &self.svd {
            Some(svd) => {
                profile_scope!("svd");
                let output = svd.apply(&processed, requested_mask.as_deref())?;
                log::debug!(
                    "[PIPELINE] SVD kept {} of {} mode(s)",
                    output.retained_modes,
                    output.singular_values.len()
                );
                processed = output.data;
                output.channel_mask
            }
            None => resolve_channel_mask(&processed, requested_mask.as_deref())?,
        };
        for (usable, &null) in channel_mask.iter_mut().zip(&null_channels) {
            *usable &= !null;
        }

        let wavelet = match &self.wavelet {
            Some(denoiser) => {
                profile_scope!("wavelet");
                let map: Vec<Vec<f64>> = processed
                    .iter()
                    .zip(&channel_mask)
                    .map(|(channel, &usable)| {
                        if usable {
                            channel.clone()
                        } else {
                            vec![0.0; channel.len()]
                        }
                    })
                    .collect();
                Some(denoiser.apply(&map)?)
            }
            None => None,
        };

        let processing_time_ms = scope.elapsed_ms();
        log::info!(
            "[PIPELINE] Processed {} channel(s) x {} sample(s) in {:.2}ms",
            num_channels,
            num_samples,
            processing_time_ms
        );

        Ok(PipelineOutput {
            channels: processed,
            channel_mask,
            wavelet,
            processing_time_ms,
        })
    }
}
