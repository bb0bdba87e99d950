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

pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Sign of the value, with zero mapping to zero.
///
/// `Float::signum` returns `1` for `+0.0`, which is not wanted for friction
/// terms.
pub fn sign<T>(value: T) -> T
where
    T: Float
{
    if value == T::zero() {
        T::zero()
    }
    else {
        value.signum()
    }
}

/// Wrap an angle in degrees into the range (-180, 180].
pub fn wrap_deg<T>(angle_deg: T) -> T
where
    T: Float
{
    let half: T = lit(180.0);
    let full: T = lit(360.0);

    let wrapped = rem_euclid(angle_deg + half, full) - half;

    // rem_euclid gives [0, 360) so the lower bound is inclusive, move it up to
    // the top of the range.
    if wrapped <= -half {
        wrapped + full
    }
    else {
        wrapped
    }
}

/// Get the shortest signed angular distance to move from `from_deg` to
/// `to_deg`, in degrees within (-180, 180].
pub fn ang_dist_deg<T>(from_deg: T, to_deg: T) -> T
where
    T: Float
{
    wrap_deg(to_deg - from_deg)
}

/// Convert an `f64` literal into `T`, which is always representable for the
/// float types.
fn lit<T: Float>(value: f64) -> T {
    T::from(value).unwrap_or_else(T::nan)
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wrap_deg() {
        assert_eq!(wrap_deg(0f64), 0f64);
        assert_eq!(wrap_deg(180f64), 180f64);
        assert_eq!(wrap_deg(-180f64), 180f64);
        assert_eq!(wrap_deg(190f64), -170f64);
        assert_eq!(wrap_deg(-190f64), 170f64);
        assert_eq!(wrap_deg(540f64), 180f64);
        assert_eq!(wrap_deg(-720f64), 0f64);
        assert_eq!(wrap_deg(359f64), -1f64);
    }

    #[test]
    fn test_ang_dist_deg() {
        assert_eq!(ang_dist_deg(10f64, 20f64), 10f64);
        assert_eq!(ang_dist_deg(20f64, 10f64), -10f64);
        assert_eq!(ang_dist_deg(179f64, -179f64), 2f64);
        assert_eq!(ang_dist_deg(-179f64, 179f64), -2f64);
        assert_eq!(ang_dist_deg(0f64, 360f64), 0f64);
    }

    #[test]
    fn test_sign() {
        assert_eq!(sign(0f64), 0f64);
        assert_eq!(sign(-0f64), 0f64);
        assert_eq!(sign(2.5f64), 1f64);
        assert_eq!(sign(-0.1f64), -1f64);
    }

    #[test]
    fn test_lin_map_and_clamp() {
        assert_eq!(lin_map((-4.0, 4.0), (-1.0, 1.0), 2.0f64), 0.5);
        assert_eq!(clamp(&1.5f64, &-1.0, &1.0), 1.0);
        assert_eq!(clamp(&-3.0f64, &-1.0, &1.0), -1.0);
        assert_eq!(clamp(&0.25f64, &-1.0, &1.0), 0.25);
    }
}
