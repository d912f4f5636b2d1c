use fluct_rs::{
    ConditioningPipeline, FilterKind, FirFilter, FirResponse, PipelineConfig, SvdFilter,
    WaveletDenoiser, WaveletDenoiserConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::io::Write;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
        .collect()
}

/// Box-Muller on a seeded generator
fn gaussian(rng: &mut StdRng, sigma: f64) -> f64 {
    let u1: f64 = rng.gen();
    let u2: f64 = rng.gen();
    sigma * (-2.0 * (1.0 - u1).ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn rms_diff(a: &[Vec<f64>], b: &[Vec<f64>]) -> f64 {
    a.iter()
        .flatten()
        .zip(b.iter().flatten())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[test]
fn test_lowpass_keeps_slow_wave_and_drops_fast_one() {
    init_logging();
    let fs = 1000.0;
    let n = 1000;
    let filter = FirFilter::from_cutoffs(FilterKind::Pass, fs, 0.0, 100.0, 0.08).unwrap();
    assert_eq!(filter.taps(), 51);

    let slow = filter.apply(&sine(10.0, fs, n)).unwrap();
    let fast = filter.apply(&sine(300.0, fs, n)).unwrap();
    assert_eq!(slow.len(), n);
    assert_eq!(fast.len(), n);

    let interior = 60..n - 60;
    let slow_peak = slow[interior.clone()]
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let fast_peak = fast[interior]
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    assert!((slow_peak - 1.0).abs() < 0.05, "slow peak {}", slow_peak);
    assert!(fast_peak < 0.1, "fast peak {}", fast_peak);
}

#[test]
fn test_band_block_suppresses_line_noise() {
    init_logging();
    let fs = 1000.0;
    let n = 2000;
    let filter = FirFilter::new(
        FirResponse::BandBlock {
            low_hz: 40.0,
            high_hz: 80.0,
        },
        fs,
        0.02,
    )
    .unwrap();

    let slow = sine(5.0, fs, n);
    let hum = sine(60.0, fs, n);
    let mixed: Vec<f64> = slow.iter().zip(&hum).map(|(s, h)| s + h).collect();
    let out = filter.apply(&mixed).unwrap();

    let margin = filter.taps();
    let worst = out[margin..n - margin]
        .iter()
        .zip(&slow[margin..n - margin])
        .fold(0.0_f64, |acc, (o, s)| acc.max((o - s).abs()));
    assert!(worst < 0.05, "residual {}", worst);
}

#[test]
fn test_svd_leaves_dead_channel_alone() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(42);
    let n = 500;
    let mut data: Vec<Vec<f64>> = (0..2)
        .map(|_| (0..n).map(|_| gaussian(&mut rng, 1.0)).collect())
        .collect();
    data.push(vec![0.0; n]);

    let out = SvdFilter::new(0.9).unwrap().apply(&data, None).unwrap();
    assert_eq!(out.channel_mask, vec![true, true, false]);
    assert_eq!(out.data[2], vec![0.0; n]);
    assert_eq!(out.singular_values.len(), 2);
    assert!(out.retained_modes >= 1 && out.retained_modes <= 2);
}

#[test]
fn test_wavelet_noise_floor_matches_sigma() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(7);
    let sigma = 0.5;
    let image: Vec<Vec<f64>> = (0..64)
        .map(|_| (0..64).map(|_| gaussian(&mut rng, sigma)).collect())
        .collect();

    let out = WaveletDenoiser::new(WaveletDenoiserConfig::default())
        .unwrap()
        .apply(&image)
        .unwrap();

    let expected = sigma * 64.0;
    assert!(
        out.incoherent_level > 0.8 * expected && out.incoherent_level < 1.1 * expected,
        "incoherent level {} vs {}",
        out.incoherent_level,
        expected
    );
    assert!(out.coherent_level < out.incoherent_level);
}

#[test]
fn test_wavelet_recovers_blob() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(3);
    let clean: Vec<Vec<f64>> = (0..64)
        .map(|r| {
            (0..64)
                .map(|c| {
                    let d2 = ((r as f64 - 32.0).powi(2) + (c as f64 - 32.0).powi(2)) / 128.0;
                    5.0 * (-d2).exp()
                })
                .collect()
        })
        .collect();
    let noisy: Vec<Vec<f64>> = clean
        .iter()
        .map(|row| row.iter().map(|v| v + gaussian(&mut rng, 1.0)).collect())
        .collect();

    let out = WaveletDenoiser::new(WaveletDenoiserConfig::default())
        .unwrap()
        .apply(&noisy)
        .unwrap();

    let noisy_error = rms_diff(&noisy, &clean);
    let denoised_error = rms_diff(&out.coherent, &clean);
    assert!(
        denoised_error < 0.6 * noisy_error,
        "denoised {} vs noisy {}",
        denoised_error,
        noisy_error
    );
}

#[test]
fn test_pipeline_from_config_file() {
    init_logging();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "sample_rate": 1000.0,
            "normalization": {{ "type": "mean" }},
            "fir": {{ "response": {{ "type": "high_pass", "cutoff_hz": 50.0 }} }},
            "svd": {{ "cutoff": 0.95 }},
            "wavelet": {{ "family": "sym4", "level": 2 }}
        }}"#
    )
    .unwrap();

    let config = PipelineConfig::from_json_file(file.path()).unwrap();
    let pipeline = ConditioningPipeline::new(config).unwrap();

    let n = 256;
    let data: Vec<Vec<f64>> = (0..8)
        .map(|ch| {
            sine(120.0, 1000.0, n)
                .into_iter()
                .map(|v| 10.0 + 0.5 * v + ch as f64)
                .collect()
        })
        .collect();

    let out = pipeline.process(&data, None).unwrap();
    assert_eq!(out.channels.len(), 8);
    assert!(out.channels.iter().all(|c| c.len() == n));
    assert_eq!(out.channel_mask, vec![true; 8]);

    let wavelet = out.wavelet.unwrap();
    assert_eq!(wavelet.level, 2);
    let energy: f64 = out.channels.iter().flatten().map(|v| v * v).sum();
    let split = wavelet.coherent_level.powi(2) + wavelet.incoherent_level.powi(2);
    assert!((split - energy).abs() <= 1e-9 * energy.max(1.0));
}
