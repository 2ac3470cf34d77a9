// =============================================================================
// MACD (Moving Average Convergence Divergence)
// =============================================================================
//
// MACD line   = EMA(fast) - EMA(slow)
// Signal line = EMA(signal) of the MACD line
//
// Warm-up: the MACD line is defined from index max(fast, slow) - 1, the signal
// line `signal - 1` bars later. Earlier entries are NaN.
// =============================================================================

use super::ema::calculate_ema;

#[derive(Debug, Clone)]
pub struct MacdLines {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
}

pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdLines {
    let n = closes.len();
    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);

    // NaN propagates through the subtraction while either EMA warms up.
    let macd: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();

    let mut signal = vec![f64::NAN; n];
    if let Some(start) = macd.iter().position(|v| v.is_finite()) {
        let tail = calculate_ema(&macd[start..], signal_period);
        signal[start..].copy_from_slice(&tail);
    }

    MacdLines { macd, signal }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_defined(series: &[f64]) -> Option<usize> {
        series.iter().position(|v| !v.is_nan())
    }

    #[test]
    fn warmup_boundaries() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let lines = calculate_macd(&closes, 12, 26, 9);
        assert_eq!(lines.macd.len(), 60);
        assert_eq!(first_defined(&lines.macd), Some(25));
        assert_eq!(first_defined(&lines.signal), Some(33));
    }

    #[test]
    fn rising_series_has_positive_macd() {
        let closes: Vec<f64> = (1..=50).map(|x| x as f64).collect();
        let lines = calculate_macd(&closes, 3, 6, 3);
        assert!(lines.macd[49] > 0.0);
        assert!(lines.signal[49] > 0.0);
    }

    #[test]
    fn flat_series_has_zero_macd() {
        let lines = calculate_macd(&[10.0; 40], 5, 10, 4);
        assert!(lines.macd[39].abs() < 1e-12);
        assert!(lines.signal[39].abs() < 1e-12);
    }

    #[test]
    fn too_short_is_all_nan() {
        let lines = calculate_macd(&[1.0, 2.0, 3.0], 12, 26, 9);
        assert!(lines.macd.iter().chain(&lines.signal).all(|v| v.is_nan()));
    }
}
