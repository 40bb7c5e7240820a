//! Small numeric helpers shared by the attack engine and the result tables.

use std::time::Duration;

/// Rounds `value` to `decimals` decimal places, ties to even (as `numpy.round`).
pub fn round_to_decimals(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Calculates min, median, max and mean, in seconds, of a slice of Durations.
///
/// # Returns
/// A tuple `(min_sec, median_sec, max_sec, mean_sec)`.
/// Returns all zeros if the slice is empty.
pub fn calculate_stats(durations: &[Duration]) -> (f64, f64, f64, f64) {
    if durations.is_empty() {
        return (0.0, 0.0, 0.0, 0.0);
    }

    let mut times_sec: Vec<f64> = durations.iter().map(Duration::as_secs_f64).collect();
    times_sec.sort_unstable_by(f64::total_cmp);
    let n = times_sec.len();

    let mean = times_sec.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 1 {
        times_sec[n / 2]
    } else {
        (times_sec[n / 2 - 1] + times_sec[n / 2]) / 2.0
    };

    (times_sec[0], median, times_sec[n - 1], mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_three_decimals() {
        assert_eq!(round_to_decimals(2.0 / 3.0, 3), 0.667);
        assert_eq!(round_to_decimals(0.5, 3), 0.5);
        assert_eq!(round_to_decimals(1.0, 3), 1.0);
        assert_eq!(round_to_decimals(0.0004, 3), 0.0);
    }

    #[test]
    fn test_round_ties_go_to_even() {
        // 5/16 and 1/16 are exact halves at the third decimal.
        assert_eq!(round_to_decimals(0.3125, 3), 0.312);
        assert_eq!(round_to_decimals(0.0625, 3), 0.062);
        assert_eq!(round_to_decimals(0.1875, 3), 0.188);
    }

    #[test]
    fn test_calculate_stats() {
        assert_eq!(calculate_stats(&[]), (0.0, 0.0, 0.0, 0.0));

        let durations = [Duration::from_secs(3), Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(6)];
        let (min, median, max, mean) = calculate_stats(&durations);
        assert_eq!(min, 1.0);
        assert_eq!(median, 2.5);
        assert_eq!(max, 6.0);
        assert_eq!(mean, 3.0);
    }
}
