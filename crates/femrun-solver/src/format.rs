//! Number formatting shared by the deck writers. Every writer goes through
//! these so output stays byte-stable across platforms.

/// Exponent notation with a signed, two-digit exponent: `1.0000000000000E+01`.
pub fn exp(value: f64, precision: usize, upper: bool) -> String {
    let value = value + 0.0;
    let raw = if upper {
        format!("{value:.precision$E}")
    } else {
        format!("{value:.precision$e}")
    };
    let marker = if upper { 'E' } else { 'e' };
    match raw.split_once(marker) {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}{marker}{sign}{:02}", exponent.abs())
        }
        None => raw,
    }
}

/// Shortest round-tripping decimal, negative zero folded to zero.
pub fn real(value: f64) -> String {
    format!("{:?}", value + 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponent_gets_sign_and_two_digits() {
        assert_eq!(exp(10.0, 13, true), "1.0000000000000E+01");
        assert_eq!(exp(0.0, 13, true), "0.0000000000000E+00");
        assert_eq!(exp(-0.0, 13, true), "0.0000000000000E+00");
        assert_eq!(exp(-10000.0, 13, true), "-1.0000000000000E+04");
        assert_eq!(exp(7.9e-9, 3, false), "7.900e-09");
        assert_eq!(exp(1.5e-123, 1, false), "1.5e-123");
    }

    #[test]
    fn real_is_shortest_form() {
        assert_eq!(real(1000.0), "1000.0");
        assert_eq!(real(-0.0), "0.0");
        assert_eq!(real(2.0e11), "200000000000.0");
        assert_eq!(real(1.0e-8), "1e-8");
    }
}
