quantity!(
    /// Dollars per kilowatt-hour.
    KilowattHourRate,
    "$/kWh"
);

impl KilowattHourRate {
    /// Amber quotes tariffs in cents.
    pub const fn from_cents(cents: f64) -> Self {
        Self(cents / 100.0)
    }

    pub fn round_to_cents(self) -> Self {
        Self((self.0 * 100.0).round() / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_round_to_cents() {
        assert_abs_diff_eq!(KilowattHourRate(0.12345).round_to_cents().0, 0.12);
        assert_abs_diff_eq!(KilowattHourRate::from_cents(-7.6).round_to_cents().0, -0.08);
    }
}
