//! Periodized 2-D Discrete Wavelet Transform
//!
//! Each level filters the rows, then the columns, with the scaling filter `h`
//! and the wavelet filter `g` and decimates by 2 using circular boundaries.
//! With an orthonormal filter pair this is an orthogonal transform for every
//! even length, so reconstruction is exact and energy is preserved.

use crate::error::{FluctError, Result};
use crate::types::WaveletFamily;
use nalgebra::DMatrix;

impl WaveletFamily {
    /// Decomposition low-pass (scaling) filter
    pub fn scaling_filter(&self) -> Vec<f64> {
        match self {
            WaveletFamily::Haar => {
                let c = std::f64::consts::FRAC_1_SQRT_2;
                vec![c, c]
            }
            WaveletFamily::Db2 => vec![
                -0.129_409_522_551_260_34,
                0.224_143_868_042_013_4,
                0.836_516_303_737_807_7,
                0.482_962_913_144_534_1,
            ],
            WaveletFamily::Db4 => vec![
                -0.010_597_401_784_997_278,
                0.032_883_011_666_982_945,
                0.030_841_381_835_986_965,
                -0.187_034_811_718_881_06,
                -0.027_983_769_416_983_849,
                0.630_880_767_929_590_38,
                0.714_846_570_552_541_6,
                0.230_377_813_308_855_14,
            ],
            WaveletFamily::Sym4 => vec![
                -0.075_765_714_789_273_33,
                -0.029_635_527_645_954_48,
                0.497_618_667_632_563_04,
                0.803_738_751_805_916_2,
                0.297_857_795_605_605_2,
                -0.099_219_543_576_847_22,
                -0.012_603_967_262_037_833,
                0.032_223_100_604_071_27,
            ],
        }
    }

    /// Decomposition high-pass filter, `g[n] = (-1)^n h[L-1-n]`
    pub fn wavelet_filter(&self) -> Vec<f64> {
        let lo = self.scaling_filter();
        let len = lo.len();
        (0..len)
            .map(|n| {
                let sign = if n % 2 == 0 { 1.0 } else { -1.0 };
                sign * lo[len - 1 - n]
            })
            .collect()
    }
}

/// Detail subbands of one decomposition level
#[derive(Debug, Clone, PartialEq)]
pub struct DetailBands {
    /// Low-pass along rows, high-pass along columns
    pub horizontal: DMatrix<f64>,
    /// High-pass along rows, low-pass along columns
    pub vertical: DMatrix<f64>,
    /// High-pass along both axes
    pub diagonal: DMatrix<f64>,
    /// Shape of the array this level was computed from, before any
    /// odd-length extension
    pub source_shape: (usize, usize),
}

impl DetailBands {
    fn bands(&self) -> [&DMatrix<f64>; 3] {
        [&self.horizontal, &self.vertical, &self.diagonal]
    }

    fn bands_mut(&mut self) -> [&mut DMatrix<f64>; 3] {
        [&mut self.horizontal, &mut self.vertical, &mut self.diagonal]
    }
}

/// Multi-level 2-D decomposition
#[derive(Debug, Clone, PartialEq)]
pub struct WaveletDecomposition {
    /// Coarsest approximation subband
    pub approximation: DMatrix<f64>,
    /// Detail subbands per level, `details[0]` is the finest
    pub details: Vec<DetailBands>,
}

impl WaveletDecomposition {
    pub fn levels(&self) -> usize {
        self.details.len()
    }

    /// Every coefficient, approximation first, then details from fine to coarse
    pub fn coefficients(&self) -> impl Iterator<Item = f64> + '_ {
        self.approximation.iter().copied().chain(
            self.details
                .iter()
                .flat_map(|level| level.bands().into_iter().flat_map(|band| band.iter().copied())),
        )
    }

    pub fn coefficient_count(&self) -> usize {
        self.approximation.len()
            + self
                .details
                .iter()
                .map(|level| level.bands().iter().map(|band| band.len()).sum::<usize>())
                .sum::<usize>()
    }

    /// Sum of squared coefficients
    pub fn energy(&self) -> f64 {
        self.coefficients().map(|c| c * c).sum()
    }

    /// Zero every coefficient whose magnitude is below `threshold`
    pub fn hard_threshold(&mut self, threshold: f64) {
        let prune = |band: &mut DMatrix<f64>| {
            for c in band.iter_mut() {
                if c.abs() < threshold {
                    *c = 0.0;
                }
            }
        };

        prune(&mut self.approximation);
        for level in &mut self.details {
            for band in level.bands_mut() {
                prune(band);
            }
        }
    }
}

/// 2-D transform for one wavelet family
#[derive(Debug, Clone)]
pub struct Dwt2 {
    family: WaveletFamily,
    lo: Vec<f64>,
    hi: Vec<f64>,
}

impl Dwt2 {
    pub fn new(family: WaveletFamily) -> Self {
        Self {
            family,
            lo: family.scaling_filter(),
            hi: family.wavelet_filter(),
        }
    }

    pub fn family(&self) -> WaveletFamily {
        self.family
    }

    /// Decompose `image` to `level` levels
    ///
    /// An odd dimension is extended by repeating its last row or column before
    /// each level, so any array with `min(rows, cols) > 2^(level - 1)` works.
    pub fn decompose(&self, image: &DMatrix<f64>, level: usize) -> Result<WaveletDecomposition> {
        if level == 0 {
            return Err(FluctError::InvalidParameter(
                "Decomposition level must be at least 1".to_string(),
            ));
        }

        let (rows, cols) = image.shape();
        1usize
            .checked_shl((level - 1) as u32)
            .filter(|&coarsest| rows.min(cols) > coarsest)
            .ok_or_else(|| {
                FluctError::ShapeMismatch(format!(
                    "{}x{} array cannot be decomposed to level {}",
                    rows, cols, level
                ))
            })?;
        log::trace!("[WAVELET] Decomposing {}x{} to level {}", rows, cols, level);

        let mut approximation = image.clone();
        let mut details = Vec::with_capacity(level);
        for _ in 0..level {
            let (next, bands) = self.analyze_level(&approximation);
            details.push(bands);
            approximation = next;
        }

        Ok(WaveletDecomposition {
            approximation,
            details,
        })
    }

    /// Inverse of [`Dwt2::decompose`]
    pub fn reconstruct(&self, decomposition: &WaveletDecomposition) -> DMatrix<f64> {
        let mut current = decomposition.approximation.clone();
        for bands in decomposition.details.iter().rev() {
            let full = self.synthesize_level(&current, bands);
            let (rows, cols) = bands.source_shape;
            current = if full.shape() == (rows, cols) {
                full
            } else {
                DMatrix::from_fn(rows, cols, |r, c| full[(r, c)])
            };
        }
        current
    }

    fn analyze_level(&self, m: &DMatrix<f64>) -> (DMatrix<f64>, DetailBands) {
        let extended = extend_to_even(m);
        let (row_lo, row_hi) = self.analyze_rows(&extended);
        let (ll, lh) = self.analyze_rows(&row_lo.transpose());
        let (hl, hh) = self.analyze_rows(&row_hi.transpose());

        (
            ll.transpose(),
            DetailBands {
                horizontal: lh.transpose(),
                vertical: hl.transpose(),
                diagonal: hh.transpose(),
                source_shape: m.shape(),
            },
        )
    }

    fn synthesize_level(&self, approximation: &DMatrix<f64>, bands: &DetailBands) -> DMatrix<f64> {
        let row_lo = self
            .synthesize_rows(&approximation.transpose(), &bands.horizontal.transpose())
            .transpose();
        let row_hi = self
            .synthesize_rows(&bands.vertical.transpose(), &bands.diagonal.transpose())
            .transpose();
        self.synthesize_rows(&row_lo, &row_hi)
    }

    fn analyze_rows(&self, m: &DMatrix<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
        let (rows, cols) = m.shape();
        let half = cols / 2;
        let mut lo = DMatrix::zeros(rows, half);
        let mut hi = DMatrix::zeros(rows, half);

        for r in 0..rows {
            let row: Vec<f64> = m.row(r).iter().copied().collect();
            let (approx, detail) = self.analysis_step(&row);
            for k in 0..half {
                lo[(r, k)] = approx[k];
                hi[(r, k)] = detail[k];
            }
        }

        (lo, hi)
    }

    fn synthesize_rows(&self, lo: &DMatrix<f64>, hi: &DMatrix<f64>) -> DMatrix<f64> {
        let (rows, half) = lo.shape();
        let mut out = DMatrix::zeros(rows, half * 2);

        for r in 0..rows {
            let approx: Vec<f64> = lo.row(r).iter().copied().collect();
            let detail: Vec<f64> = hi.row(r).iter().copied().collect();
            for (k, value) in self.synthesis_step(&approx, &detail).into_iter().enumerate() {
                out[(r, k)] = value;
            }
        }

        out
    }

    /// `a[k] = sum_j h[j] x[(2k - j) mod N]`, likewise `d` with `g`
    fn analysis_step(&self, signal: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let n = signal.len() as isize;
        let half = signal.len() / 2;
        let mut approx = vec![0.0; half];
        let mut detail = vec![0.0; half];

        for k in 0..half {
            for (j, (&h, &g)) in self.lo.iter().zip(&self.hi).enumerate() {
                let idx = (2 * k as isize - j as isize).rem_euclid(n) as usize;
                approx[k] += h * signal[idx];
                detail[k] += g * signal[idx];
            }
        }

        (approx, detail)
    }

    /// Transpose of [`Dwt2::analysis_step`]
    fn synthesis_step(&self, approx: &[f64], detail: &[f64]) -> Vec<f64> {
        let n = (approx.len() * 2) as isize;
        let mut out = vec![0.0; approx.len() * 2];

        for (k, (&a, &d)) in approx.iter().zip(detail).enumerate() {
            for (j, (&h, &g)) in self.lo.iter().zip(&self.hi).enumerate() {
                let idx = (2 * k as isize - j as isize).rem_euclid(n) as usize;
                out[idx] += h * a + g * d;
            }
        }

        out
    }
}

/// Repeat the last row and/or column so both dimensions are even
fn extend_to_even(m: &DMatrix<f64>) -> DMatrix<f64> {
    let (rows, cols) = m.shape();
    if rows % 2 == 0 && cols % 2 == 0 {
        return m.clone();
    }
    DMatrix::from_fn(rows + rows % 2, cols + cols % 2, |r, c| {
        m[(r.min(rows - 1), c.min(cols - 1))]
    })
}
