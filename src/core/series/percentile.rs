use itertools::Itertools;

impl<T> Percentile for T where T: ?Sized {}

pub trait Percentile {
    /// Linearly interpolated percentile, `quantile` being in `[0, 1]`.
    ///
    /// Non-finite values are ignored.
    #[must_use]
    #[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn percentile(self, quantile: f64) -> Option<f64>
    where
        Self: Iterator<Item = f64> + Sized,
    {
        let values =
            self.filter(|value| value.is_finite()).sorted_unstable_by(f64::total_cmp).collect_vec();
        if values.is_empty() {
            return None;
        }
        let rank = quantile.clamp(0.0, 1.0) * (values.len() - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        Some(values[lower] + (values[upper] - values[lower]) * (rank - lower as f64))
    }
}
