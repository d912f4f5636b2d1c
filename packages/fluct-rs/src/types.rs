use crate::error::{FluctError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Legacy response selector used by the `(kind, fs, fL, fH, b)` filter form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Pass band below `fH` (when `fL = 0`) or above `fL` (when `fH = 0`)
    Pass,
    /// Reject the band between `fL` and `fH`
    Block,
}

/// FIR response, with cutoffs in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FirResponse {
    LowPass { cutoff_hz: f64 },
    /// Realized as `signal - lowpass(signal)`
    HighPass { cutoff_hz: f64 },
    BandBlock { low_hz: f64, high_hz: f64 },
}

/// Per-channel normalisation applied before filtering
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    None,
    /// `v / mean(v) - 1`
    Mean,
    /// `v / mean(v[start..end]) - 1`
    Baseline { start: usize, end: usize },
}

/// Orthogonal wavelet families available to the 2-D transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaveletFamily {
    #[default]
    Haar,
    Db2,
    Db4,
    Sym4,
}

impl FromStr for WaveletFamily {
    type Err = FluctError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "haar" | "db1" => Ok(Self::Haar),
            "db2" => Ok(Self::Db2),
            "db4" => Ok(Self::Db4),
            "sym4" => Ok(Self::Sym4),
            other => Err(FluctError::InvalidParameter(format!(
                "Unknown wavelet family '{}'",
                other
            ))),
        }
    }
}

/// Validate a row-major 2-D array and return `(rows, cols)`
pub fn checked_shape(data: &[Vec<f64>]) -> Result<(usize, usize)> {
    let rows = data.len();
    if rows == 0 {
        return Err(FluctError::ShapeMismatch("Array has no rows".to_string()));
    }
    let cols = data[0].len();
    if let Some((idx, row)) = data.iter().enumerate().find(|(_, row)| row.len() != cols) {
        return Err(FluctError::ShapeMismatch(format!(
            "Row {} has {} samples, expected {}",
            idx,
            row.len(),
            cols
        )));
    }
    Ok((rows, cols))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wavelet_family_names() {
        assert_eq!("haar".parse::<WaveletFamily>().unwrap(), WaveletFamily::Haar);
        assert_eq!("DB1".parse::<WaveletFamily>().unwrap(), WaveletFamily::Haar);
        assert_eq!("db4".parse::<WaveletFamily>().unwrap(), WaveletFamily::Db4);
        assert_eq!("sym4".parse::<WaveletFamily>().unwrap(), WaveletFamily::Sym4);
        assert!("coif1".parse::<WaveletFamily>().is_err());
    }

    #[test]
    fn test_response_json_tags() {
        let response: FirResponse =
            serde_json::from_str(r#"{"type": "band_block", "low_hz": 40.0, "high_hz": 60.0}"#)
                .unwrap();
        assert_eq!(
            response,
            FirResponse::BandBlock {
                low_hz: 40.0,
                high_hz: 60.0
            }
        );
        let normalization: Normalization = serde_json::from_str(r#"{"type": "mean"}"#).unwrap();
        assert_eq!(normalization, Normalization::Mean);
    }

    #[test]
    fn test_checked_shape() {
        assert_eq!(checked_shape(&[vec![0.0; 3], vec![1.0; 3]]).unwrap(), (2, 3));
        assert!(checked_shape(&[]).is_err());
        assert!(checked_shape(&[vec![0.0; 3], vec![1.0; 2]]).is_err());
    }
}
