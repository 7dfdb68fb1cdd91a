//! Natural-log domain helpers. Every score in the decoder is a log value.

pub const LOG_ZERO: f32 = f32::NEG_INFINITY;
pub const LOG_ONE: f32 = 0.0;

/// Converts a linear probability (or beam factor) to the log domain.
/// Zero and negative values map to [`LOG_ZERO`].
pub fn linear_to_log(value: f64) -> f32 {
    if value <= 0.0 {
        LOG_ZERO
    } else {
        value.ln() as f32
    }
}

pub fn log_to_linear(value: f32) -> f64 {
    (value as f64).exp()
}

/// `ln(exp(a) + exp(b))` without overflow.
pub fn log_add(a: f32, b: f32) -> f32 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if lo == LOG_ZERO {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_maps_to_log_zero() {
        assert_eq!(linear_to_log(0.0), LOG_ZERO);
        assert_eq!(linear_to_log(-1.0), LOG_ZERO);
        assert_eq!(linear_to_log(1.0), LOG_ONE);
    }

    #[test]
    fn log_add_matches_linear_sum() {
        let a = linear_to_log(0.25);
        let b = linear_to_log(0.5);
        assert!((log_to_linear(log_add(a, b)) - 0.75).abs() < 1e-6);
        assert_eq!(log_add(LOG_ZERO, b), b);
        assert_eq!(log_add(LOG_ZERO, LOG_ZERO), LOG_ZERO);
    }
}
