/// Half-up rounding to cents.
pub fn round2(value: f64) -> f64 {
    (value * 100.).round() / 100.
}

/// Seconds as hours rounded to two decimals.
pub fn hours(seconds: i64) -> f64 {
    round2(seconds as f64 / 3600.)
}

/// Money earned by one entry. Group totals are sums of these per-entry rounded amounts, so the
/// rounding error of every entry is carried into the total.
pub fn billable_amount(duration_seconds: i64, hourly_rate: f64, is_billable: bool) -> f64 {
    if !is_billable || !hourly_rate.is_finite() || hourly_rate <= 0. || duration_seconds <= 0 {
        return 0.;
    }
    round2(duration_seconds as f64 / 3600. * hourly_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billable_amount() {
        assert_eq!(billable_amount(1200, 100., true), 33.33);
        assert_eq!(billable_amount(3600, 50., true), 50.);
        assert_eq!(billable_amount(5400, 45.5, true), 68.25);
    }

    #[test]
    fn test_not_billable_cases() {
        assert_eq!(billable_amount(3600, 50., false), 0.);
        assert_eq!(billable_amount(3600, 0., true), 0.);
        assert_eq!(billable_amount(3600, -10., true), 0.);
        assert_eq!(billable_amount(0, 50., true), 0.);
    }

    #[test]
    fn test_rounding_accumulates_per_entry() {
        let per_entry = (0..3).map(|_| billable_amount(1200, 100., true)).sum::<f64>();
        assert_eq!(round2(per_entry), 99.99);
        assert_eq!(billable_amount(3600, 100., true), 100.);
    }

    #[test]
    fn test_hours() {
        assert_eq!(hours(5400), 1.5);
        assert_eq!(hours(1000), 0.28);
        assert_eq!(hours(0), 0.);
    }
}
