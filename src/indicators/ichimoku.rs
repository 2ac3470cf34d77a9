// =============================================================================
// Ichimoku Cloud (close-only variant)
// =============================================================================
//
// All five lines are derived from closing prices; a "midpoint" over a window
// is (max + min) / 2 of the closes strictly before the current bar.
//
//   conversion (tenkan)   = midpoint of the previous 9 closes
//   base (kijun)          = midpoint of the previous 26 closes
//   leading span A        = (conversion + base) / 2, shifted forward 26 bars
//   leading span B        = midpoint of the previous 52 closes, shifted forward 26
//   lagging span (chikou) = close from 26 bars earlier
//
// Undefined entries are NaN; span B is first defined at index 78.
// =============================================================================

pub const CONVERSION_PERIOD: usize = 9;
pub const BASE_PERIOD: usize = 26;
pub const SPAN_B_PERIOD: usize = 52;
pub const DISPLACEMENT: usize = 26;

#[derive(Debug, Clone)]
pub struct IchimokuCloud {
    pub conversion: Vec<f64>,
    pub base: Vec<f64>,
    pub span_a: Vec<f64>,
    pub span_b: Vec<f64>,
    pub lagging: Vec<f64>,
}

pub fn calculate_ichimoku(closes: &[f64]) -> IchimokuCloud {
    let n = closes.len();
    let conversion = rolling_midpoint(closes, CONVERSION_PERIOD);
    let base = rolling_midpoint(closes, BASE_PERIOD);
    let span_b_raw = rolling_midpoint(closes, SPAN_B_PERIOD);

    let span_a_raw: Vec<f64> = conversion
        .iter()
        .zip(&base)
        .map(|(c, b)| (c + b) / 2.0)
        .collect();

    let mut span_a = vec![f64::NAN; n];
    let mut span_b = vec![f64::NAN; n];
    let mut lagging = vec![f64::NAN; n];
    for i in DISPLACEMENT..n {
        span_a[i] = span_a_raw[i - DISPLACEMENT];
        span_b[i] = span_b_raw[i - DISPLACEMENT];
        lagging[i] = closes[i - DISPLACEMENT];
    }

    IchimokuCloud {
        conversion,
        base,
        span_a,
        span_b,
        lagging,
    }
}

/// `(max + min) / 2` of `closes[i - period..i]`, defined for `i >= period`.
fn rolling_midpoint(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    for i in period..closes.len() {
        let window = &closes[i - period..i];
        let (lo, hi) = window
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        out[i] = (lo + hi) / 2.0;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_lines_aligned_with_input() {
        let closes: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let cloud = calculate_ichimoku(&closes);
        for line in [&cloud.conversion, &cloud.base, &cloud.span_a, &cloud.span_b, &cloud.lagging] {
            assert_eq!(line.len(), 100);
        }
    }

    #[test]
    fn warmup_boundaries() {
        let closes: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let cloud = calculate_ichimoku(&closes);
        assert!(cloud.conversion[8].is_nan() && !cloud.conversion[9].is_nan());
        assert!(cloud.base[25].is_nan() && !cloud.base[26].is_nan());
        assert!(cloud.lagging[25].is_nan() && !cloud.lagging[26].is_nan());
        assert!(cloud.span_a[51].is_nan() && !cloud.span_a[52].is_nan());
        assert!(cloud.span_b[77].is_nan() && !cloud.span_b[78].is_nan());
    }

    #[test]
    fn known_values_on_linear_series() {
        let closes: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let cloud = calculate_ichimoku(&closes);
        // Window 1..=9 -> (1 + 9) / 2
        assert!((cloud.conversion[10] - 5.0).abs() < 1e-12);
        assert!((cloud.lagging[40] - 14.0).abs() < 1e-12);
        // span_b[80] = midpoint of closes[2..54] = (2 + 53) / 2
        assert!((cloud.span_b[80] - 27.5).abs() < 1e-12);
    }

    #[test]
    fn short_series_is_undefined() {
        let cloud = calculate_ichimoku(&[1.0; 5]);
        assert!(cloud.conversion.iter().all(|v| v.is_nan()));
        assert!(cloud.span_b.iter().all(|v| v.is_nan()));
    }
}
