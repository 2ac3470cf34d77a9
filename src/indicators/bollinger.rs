// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ), with σ the population standard deviation of
// the window.

/// Aligned band arrays; entries before index `period - 1` are NaN.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Calculate rolling Bollinger Bands over `closes`.
///
/// Every output vector has the same length as `closes`. With `period == 0`
/// or fewer than `period` closes, every entry is NaN.
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> BollingerBands {
    let n = closes.len();
    let mut bands = BollingerBands {
        upper: vec![f64::NAN; n],
        middle: vec![f64::NAN; n],
        lower: vec![f64::NAN; n],
    };
    if period == 0 || n < period {
        return bands;
    }

    for end in period..=n {
        let window = &closes[end - period..end];
        let middle = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();

        let i = end - 1;
        bands.middle[i] = middle;
        bands.upper[i] = middle + num_std * std_dev;
        bands.lower[i] = middle - num_std * std_dev;
    }

    bands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0);
        assert!(bb.upper[18].is_nan());
        assert!(bb.upper[19] > bb.middle[19]);
        assert!(bb.lower[19] < bb.middle[19]);
        assert!((bb.middle[19] - 10.5).abs() < 1e-10);
    }

    #[test]
    fn bollinger_insufficient_data() {
        let bb = calculate_bollinger(&[1.0, 2.0, 3.0], 20, 2.0);
        assert_eq!(bb.upper.len(), 3);
        assert!(bb.upper.iter().chain(&bb.lower).all(|v| v.is_nan()));
    }

    #[test]
    fn bollinger_flat_collapses_bands() {
        let bb = calculate_bollinger(&[100.0; 20], 5, 2.0);
        for i in 4..20 {
            assert!((bb.upper[i] - 100.0).abs() < 1e-10);
            assert!((bb.lower[i] - 100.0).abs() < 1e-10);
        }
    }

    #[test]
    fn bollinger_is_rolling() {
        let closes = [1.0, 2.0, 3.0, 10.0, 10.0, 10.0];
        let bb = calculate_bollinger(&closes, 3, 1.0);
        assert!((bb.middle[2] - 2.0).abs() < 1e-10);
        assert!((bb.middle[5] - 10.0).abs() < 1e-10);
    }
}
