//! Small statistics helpers shared by the filters.

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population variance (divides by N), 0.0 for an empty slice
pub fn variance(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / data.len() as f64
}

/// Population standard deviation
pub fn std_dev(data: &[f64]) -> f64 {
    variance(data).sqrt()
}

/// Sum of squares
pub fn energy(data: &[f64]) -> f64 {
    data.iter().map(|&x| x * x).sum()
}

/// A channel can enter a cross-channel decomposition only if every sample is
/// finite and it is not flat.
pub fn is_usable_channel(data: &[f64]) -> bool {
    if data.is_empty() || data.iter().any(|v| !v.is_finite()) {
        return false;
    }
    std_dev(data) != 0.0
}

/// Shannon entropy of a probability vector normalized by `ln(n)`, so that a
/// uniform distribution scores 1.0.
///
/// Zero entries contribute nothing. Vectors with fewer than two entries have
/// no spread to measure and return 0.0.
pub fn normalized_entropy(probabilities: &[f64]) -> f64 {
    if probabilities.len() < 2 {
        return 0.0;
    }

    let h: f64 = probabilities
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum();

    h / (probabilities.len() as f64).ln()
}
