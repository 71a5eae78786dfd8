//! Stop-offset learning for volumetric runs.
//!
//! A volumetric run stops when `volume ≥ target + flow · delay`. The delay is
//! a signed offset in milliseconds: negative values stop the pump early so
//! the liquid still in flight lands on target. After each run the offset is
//! nudged by the observed error converted to time at the stopping flow rate.

/// Fraction of the observed error corrected per run.
pub const DELAY_GAIN: f64 = 0.5;
/// Largest correction applied after a single run.
pub const MAX_DELAY_STEP_MS: f64 = 500.0;
pub const MIN_DELAY_MS: f64 = -4_000.0;
pub const MAX_DELAY_MS: f64 = 1_000.0;
/// Errors smaller than this (grams) count as an exact hit.
pub const ERROR_TOLERANCE: f64 = 0.1;
/// Flow assumed when the run ended without a usable flow estimate (g/s).
pub const FALLBACK_FLOW: f64 = 2.0;
const MIN_FLOW: f64 = 0.05;

/// Next stop offset given the last one and the run's outcome.
///
/// Overshoot moves the offset down (stop earlier), undershoot moves it up.
pub fn adjust_delay(current_ms: f64, target: f64, measured: f64, stop_flow: f64) -> f64 {
    let error = measured - target;
    if !error.is_finite() || error.abs() < ERROR_TOLERANCE {
        return current_ms;
    }
    let flow = if stop_flow.is_finite() && stop_flow > MIN_FLOW {
        stop_flow
    } else {
        FALLBACK_FLOW
    };
    let step = (DELAY_GAIN * error / flow * 1000.0).clamp(-MAX_DELAY_STEP_MS, MAX_DELAY_STEP_MS);
    (current_ms - step).clamp(MIN_DELAY_MS, MAX_DELAY_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: f64 = -1_000.0;

    #[test]
    fn overshoot_stops_earlier() {
        let next = adjust_delay(START, 100.0, 110.0, 2.0);
        assert!(next < START);
        assert!((START - next - MAX_DELAY_STEP_MS).abs() < f64::EPSILON);
    }

    #[test]
    fn undershoot_stops_later() {
        let next = adjust_delay(START, 100.0, 90.0, 2.0);
        assert!(next > START);
    }

    #[test]
    fn exact_hit_is_unchanged() {
        assert_eq!(adjust_delay(START, 100.0, 100.0, 2.0), START);
        assert_eq!(adjust_delay(START, 100.0, 100.05, 2.0), START);
    }

    #[test]
    fn small_error_gives_proportional_step() {
        // 0.4 g over at 2 g/s → 0.2 s of flow, half of it corrected.
        let next = adjust_delay(START, 36.0, 36.4, 2.0);
        assert!((next - (START - 100.0)).abs() < 1e-9);
    }

    #[test]
    fn offset_stays_bounded() {
        let mut d = START;
        for _ in 0..50 {
            d = adjust_delay(d, 36.0, 60.0, 1.0);
        }
        assert!((d - MIN_DELAY_MS).abs() < f64::EPSILON);
        for _ in 0..50 {
            d = adjust_delay(d, 36.0, 10.0, 1.0);
        }
        assert!((d - MAX_DELAY_MS).abs() < f64::EPSILON);
    }

    #[test]
    fn stalled_flow_uses_fallback() {
        let a = adjust_delay(START, 36.0, 36.5, 0.0);
        let b = adjust_delay(START, 36.0, 36.5, FALLBACK_FLOW);
        assert!((a - b).abs() < f64::EPSILON);
    }
}
