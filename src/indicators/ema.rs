// =============================================================================
// Moving Averages: Simple (SMA) and Exponential (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period` closes.
//
// Both functions return a vector aligned with `closes`: entries before index
// `period - 1` are NaN.
// =============================================================================

/// Compute the EMA series for `closes` and look-back `period`.
///
/// # Edge cases
/// - `period == 0` => all NaN
/// - `closes.len() < period` => all NaN
/// - A non-finite intermediate value ends the series; later entries stay NaN.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; closes.len()];
    if period == 0 || closes.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the first `period` values.
    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return result;
    }
    result[period - 1] = sma;

    let mut prev_ema = sma;
    for (i, &close) in closes.iter().enumerate().skip(period) {
        let ema = close * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            // Downstream consumers should not trust a broken series.
            break;
        }
        result[i] = ema;
        prev_ema = ema;
    }

    result
}

/// Compute the rolling SMA series for `closes` and `period`.
pub fn calculate_sma(closes: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; closes.len()];
    if period == 0 || closes.len() < period {
        return result;
    }

    let mut sum: f64 = closes[..period].iter().sum();
    result[period - 1] = sum / period as f64;
    for i in period..closes.len() {
        sum += closes[i] - closes[i - period];
        result[i] = sum / period as f64;
    }

    result
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn defined(series: &[f64]) -> Vec<f64> {
        series.iter().copied().filter(|v| !v.is_nan()).collect()
    }

    // ---- calculate_ema ---------------------------------------------------

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero() {
        let ema = calculate_ema(&[1.0, 2.0, 3.0], 0);
        assert_eq!(ema.len(), 3);
        assert!(ema.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn ema_insufficient_data() {
        let ema = calculate_ema(&[1.0, 2.0], 5);
        assert!(ema.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn ema_period_equals_length() {
        let ema = calculate_ema(&[2.0, 4.0, 6.0], 3);
        assert!(ema[0].is_nan() && ema[1].is_nan());
        // Should be the SMA = (2+4+6)/3 = 4.0
        assert!((ema[2] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [1..=10]: SMA seed 3.0, multiplier 1/3.
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let ema = calculate_ema(&closes, 5);
        assert_eq!(ema.len(), 10);
        assert!(ema[..4].iter().all(|v| v.is_nan()));

        let mult = 2.0 / 6.0;
        let mut expected = 3.0;
        let mut expected_vec = vec![expected];
        for &c in &closes[5..] {
            expected = c * mult + expected * (1.0 - mult);
            expected_vec.push(expected);
        }
        for (a, b) in defined(&ema).iter().zip(expected_vec.iter()) {
            assert!((a - b).abs() < 1e-10, "got {a}, expected {b}");
        }
    }

    #[test]
    fn ema_handles_nan_in_input() {
        let closes = vec![1.0, 2.0, 3.0, f64::NAN, 5.0];
        let ema = calculate_ema(&closes, 3);
        // Seed at index 2, then the NaN close breaks the series.
        assert_eq!(defined(&ema), vec![2.0]);
        assert!(ema[4].is_nan());
    }

    // ---- calculate_sma ---------------------------------------------------

    #[test]
    fn sma_rolling_window() {
        let sma = calculate_sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(sma[1].is_nan());
        assert_eq!(defined(&sma), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn sma_insufficient_data() {
        assert!(calculate_sma(&[1.0], 2).iter().all(|v| v.is_nan()));
    }
}
