//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Clamp a value into `[min, max]`.
///
/// Unlike `f64::clamp` this does not panic when `min > max`, the maximum wins
/// instead, which is the behaviour the anti-windup bounds rely on.
pub fn clamp<T>(value: T, min: T, max: T) -> T 
where
    T: Float
{
    let mut ret = value;

    if ret < min {
        ret = min
    }
    if ret > max {
        ret = max
    }

    ret
}

/// Move `current` towards `target` by no more than `max_step`.
pub fn step_towards<T>(current: T, target: T, max_step: T) -> T
where
    T: Float
{
    let max_step = max_step.abs();
    current + clamp(target - current, -max_step, max_step)
}

/// One step of an exponential (first order low pass) filter.
///
/// `alpha` is the weight of the new sample in `[0, 1]`.
pub fn low_pass<T>(filtered: T, sample: T, alpha: T) -> T
where
    T: Float
{
    filtered + alpha * (sample - filtered)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(5.0, -1.0, 1.0), 1.0);
        assert_eq!(clamp(-5.0, -1.0, 1.0), -1.0);
        assert_eq!(clamp(0.5, -1.0, 1.0), 0.5);
    }

    #[test]
    fn test_step_towards() {
        assert_eq!(step_towards(0.0, 50.0, 10.0), 10.0);
        assert_eq!(step_towards(45.0, 50.0, 10.0), 50.0);
        assert_eq!(step_towards(0.0, -50.0, 10.0), -10.0);
        assert_eq!(step_towards(0.0, 50.0, -10.0), 10.0);
    }

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((1000.0, 2000.0), (-100.0, 100.0), 1500.0), 0.0);
        assert_eq!(lin_map((1000.0, 2000.0), (-100.0, 100.0), 2000.0), 100.0);
    }

    #[test]
    fn test_low_pass() {
        assert_eq!(low_pass(0.0, 10.0, 0.5), 5.0);
        assert_eq!(low_pass(0.0, 10.0, 1.0), 10.0);
    }
}
