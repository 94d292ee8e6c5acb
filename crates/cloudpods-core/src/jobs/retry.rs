//! Exponential backoff schedule shared by job retries and webhook
//! redelivery.

/// Returns the delay in milliseconds before the next attempt.
///
/// The delay doubles with every prior failure and is capped:
/// `min(base * 2^exponent, cap)`. For job retries the exponent is the
/// number of failed attempts so far; for webhook deliveries it is the
/// attempt count before the failing attempt is recorded, which yields the
/// same first-retry-at-base schedule.
pub fn backoff_ms(base_seconds: u64, cap_seconds: u64, exponent: u32) -> i64 {
    let factor = 2u64.saturating_pow(exponent);
    let delay_seconds = base_seconds.saturating_mul(factor).min(cap_seconds);
    delay_seconds.saturating_mul(1000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        assert_eq!(backoff_ms(30, 3600, 0), 30_000);
        assert_eq!(backoff_ms(30, 3600, 1), 60_000);
        assert_eq!(backoff_ms(30, 3600, 2), 120_000);
        assert_eq!(backoff_ms(30, 3600, 3), 240_000);
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_ms(30, 3600, 7), 3_600_000);
        assert_eq!(backoff_ms(30, 3600, 20), 3_600_000);
    }

    #[test]
    fn test_backoff_survives_huge_exponents() {
        // saturating_pow overflows to u64::MAX; the cap still wins
        assert_eq!(backoff_ms(30, 3600, 200), 3_600_000);
    }

    #[test]
    fn test_webhook_schedule_starts_at_base() {
        // first failure is recorded with zero prior attempts
        assert_eq!(backoff_ms(60, 3600, 0), 60_000);
        assert_eq!(backoff_ms(60, 3600, 1), 120_000);
    }
}
