//! Sub-sample zero-crossing estimation by linear interpolation.

use crate::constants::INTERPOLATION_EPSILON;

/// Scan `sig` for sign changes and return up to `count` fractional
/// crossing positions. A sample that is exactly zero is itself a crossing.
///
/// Positions are strictly increasing. Fewer than `count` results mean the
/// signal ran out of crossings and the caller must fail the cycle.
pub fn find_crossings(sig: &[f32], count: usize) -> Vec<f32> {
    let mut crossings = Vec::with_capacity(count);
    if sig.len() < 2 {
        return crossings;
    }
    for i in 0..sig.len() - 1 {
        if crossings.len() >= count {
            break;
        }
        if sig[i] == 0.0 {
            crossings.push(i as f32);
        } else if sig[i] * sig[i + 1] < 0.0 {
            // y = a*x + b with unit sample spacing; solve y = 0.
            let a = sig[i + 1] - sig[i];
            let b = sig[i];
            if a.abs() > INTERPOLATION_EPSILON {
                crossings.push(i as f32 - b / a);
            } else {
                crossings.push(i as f32);
            }
        }
    }
    crossings
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::PI;

    #[test]
    fn test_interpolated_position() {
        let sig = vec![-0.3, -0.1, 0.2, 0.4];
        let crossings = find_crossings(&sig, 6);
        assert_eq!(crossings.len(), 1);
        assert_abs_diff_eq!(crossings[0], 1.0 + 0.1 / 0.3, epsilon = 1e-6);
    }

    #[test]
    fn test_exact_zero_sample() {
        let sig = vec![-1.0, 0.0, 1.0, -1.0];
        let crossings = find_crossings(&sig, 6);
        assert_abs_diff_eq!(crossings[0], 1.0);
    }

    #[test]
    fn test_count_limit_and_ordering() {
        let sig: Vec<f32> = (0..200).map(|i| (i as f32 * 0.3).sin()).collect();
        let crossings = find_crossings(&sig, 6);
        assert_eq!(crossings.len(), 6);
        for pair in crossings.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_short_signal_returns_fewer() {
        let sig = vec![1.0, 2.0, 3.0];
        assert!(find_crossings(&sig, 6).is_empty());
    }

    #[test]
    fn test_recovers_carrier_phase() {
        // 40 kHz at 1 MSPS with a known fractional phase shift.
        let shift = 0.37f32;
        let sig: Vec<f32> = (0..100)
            .map(|i| (2.0 * PI * 0.04 * (i as f32 - shift)).sin())
            .collect();
        let crossings = find_crossings(&sig, 6);
        assert_eq!(crossings.len(), 6);
        // Crossings sit at shift + k * 12.5.
        for (k, &c) in crossings.iter().enumerate() {
            let expected = shift + 12.5 * k as f32;
            assert_abs_diff_eq!(c, expected, epsilon = 0.1);
        }
    }
}
