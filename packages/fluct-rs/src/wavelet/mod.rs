//! Wavelet Denoising
//!
//! Provides a periodized orthogonal 2-D discrete wavelet transform and a
//! denoiser that splits a 2-D array into coherent and incoherent parts:
//! - Haar, Daubechies-2, Daubechies-4 and Symlet-4 filter banks
//! - Iterative noise-threshold estimation over all subbands
//!
//! The transform is energy preserving, so coefficient energies can be read as
//! signal energies.

mod denoise;
mod transform;

pub use denoise::{
    decomposition_level, estimate_noise_threshold, WaveletDenoiseOutput, WaveletDenoiser,
    WaveletDenoiserConfig,
};
pub use transform::{DetailBands, Dwt2, WaveletDecomposition};
