//! Bit cost of the universal integer code used by the size estimators.
//!
//! Values are costed as Elias-gamma codewords of `v + 1`, so zero is
//! representable: `floor(log2(v + 1))` leading zeros, then the
//! `floor(log2(v + 1)) + 1` significant bits.

/// Number of bits the dynamic (Elias-gamma) code needs for `v`.
///
/// Pure and monotonic non-decreasing in `v`.
///
/// # Examples
///
/// ```
/// use derand_core::dynamic::cost_bits;
///
/// assert_eq!(cost_bits(0), 1);
/// assert_eq!(cost_bits(1), 3);
/// assert_eq!(cost_bits(2), 3);
/// assert_eq!(cost_bits(3), 5);
/// ```
#[inline]
pub fn cost_bits(v: u64) -> u32 {
    let n = v as u128 + 1;
    let log2 = 127 - n.leading_zeros();
    2 * log2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn small_values() {
        let expected = [1, 3, 3, 5, 5, 5, 5, 7];
        for (v, &bits) in expected.iter().enumerate() {
            assert_eq!(cost_bits(v as u64), bits, "v = {v}");
        }
    }

    #[test]
    fn max_value_does_not_overflow() {
        assert_eq!(cost_bits(u64::MAX), 129);
    }

    proptest! {
        #[test]
        fn monotonic(a in any::<u64>(), b in any::<u64>()) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(cost_bits(lo) <= cost_bits(hi));
        }

        #[test]
        fn always_odd(v in any::<u64>()) {
            prop_assert_eq!(cost_bits(v) % 2, 1);
        }
    }
}
