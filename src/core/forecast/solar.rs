use chrono::{DateTime, Local};
use itertools::Itertools;

use crate::{
    core::{Error, forecast::STEPS_PER_PERIOD},
    quantity::power::Kilowatts,
};

/// Provider solar forecast with 30-minute periods.
#[derive(Clone, Debug, Default)]
pub struct SolarForecast(Vec<(DateTime<Local>, Kilowatts)>);

impl FromIterator<(DateTime<Local>, Kilowatts)> for SolarForecast {
    fn from_iter<T: IntoIterator<Item = (DateTime<Local>, Kilowatts)>>(iter: T) -> Self {
        Self(iter.into_iter().sorted_by_key(|(period_start, _)| *period_start).collect())
    }
}

impl SolarForecast {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Linearly interpolate the periods starting at or after `since` onto the 5-minute grid.
    ///
    /// `since` is expected to sit on a step boundary.
    #[expect(clippy::cast_precision_loss)]
    pub fn resample(&self, since: DateTime<Local>, n_steps: usize) -> Result<Vec<Kilowatts>, Error> {
        let n_periods = n_steps.div_ceil(STEPS_PER_PERIOD);
        let periods = self
            .0
            .iter()
            .filter(|(period_start, _)| *period_start >= since)
            .map(|(_, power)| *power)
            .take(n_periods)
            .collect_vec();
        if periods.len() < n_periods {
            return Err(Error::ForecastUnavailable {
                series: "solar",
                available: periods.len() * STEPS_PER_PERIOD,
                required: n_steps,
            });
        }
        let resampled = (0..n_steps)
            .map(|step| {
                let index = step / STEPS_PER_PERIOD;
                let fraction = (step % STEPS_PER_PERIOD) as f64 / STEPS_PER_PERIOD as f64;
                let from = periods[index];
                let to = periods.get(index + 1).copied().unwrap_or(from);
                (from + (to - from) * fraction).max(Kilowatts::ZERO)
            })
            .collect();
        Ok(resampled)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    fn at(minutes: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 10, 20, 10, 0, 0).unwrap() + TimeDelta::minutes(minutes)
    }

    fn forecast() -> SolarForecast {
        [(at(30), Kilowatts(3.0)), (at(0), Kilowatts(0.0)), (at(60), Kilowatts(6.0))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_resample() {
        let resampled = forecast().resample(at(0), 12).unwrap();
        assert_eq!(resampled.len(), 12);
        assert_abs_diff_eq!(resampled[0].0, 0.0);
        assert_abs_diff_eq!(resampled[3].0, 1.5);
        assert_abs_diff_eq!(resampled[6].0, 3.0);
        assert_abs_diff_eq!(resampled[11].0, 3.0);
    }

    #[test]
    fn test_resample_skips_past_periods() {
        let resampled = forecast().resample(at(10), 12).unwrap();
        assert_abs_diff_eq!(resampled[0].0, 3.0);
        assert_abs_diff_eq!(resampled[3].0, 4.5);
        assert_abs_diff_eq!(resampled[6].0, 6.0);
    }

    #[test]
    fn test_resample_too_short() {
        let result = forecast().resample(at(0), 24);
        assert!(matches!(
            result,
            Err(Error::ForecastUnavailable { series: "solar", available: 18, required: 24 }),
        ));
    }
}
