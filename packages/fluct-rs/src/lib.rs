//! Signal conditioning for multichannel fluctuation diagnostics
//!
//! Three independent filters over channel x time data: a windowed-sinc FIR
//! filter, an SVD spatial mode filter and a 2-D wavelet denoiser that splits
//! an array into coherent and incoherent parts. `ConditioningPipeline` chains
//! them from a JSON-loadable configuration.

pub mod conditioning;
pub mod error;
pub mod fir;
pub mod pipeline;
pub mod profiling;
pub mod stats;
pub mod svd;
pub mod types;
pub mod wavelet;

pub use error::{FluctError, Result};
pub use fir::FirFilter;
pub use pipeline::{ConditioningPipeline, FirStage, PipelineConfig, PipelineOutput, SvdStage};
pub use svd::{SvdFilter, SvdFilterOutput};
pub use types::*;
pub use wavelet::{WaveletDenoiseOutput, WaveletDenoiser, WaveletDenoiserConfig};
