use std::ops::Range;

use bon::Builder;
use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeDelta, Timelike};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        Error,
        series::{FillGaps, Interpolation, Percentile, round_to_hundredths},
    },
    prelude::*,
    quantity::{energy::KilowattHours, power::Kilowatts, time::Hours},
};

pub const BUCKET_WIDTH: TimeDelta = TimeDelta::minutes(5);

/// Number of [`BUCKET_WIDTH`] buckets in a day.
pub const BUCKETS_PER_DAY: usize = 288;

/// Builds the canonical day of the cumulative daily load-energy counter.
pub trait DayShapeModel {
    /// `history` holds the numeric counter samples, in any order.
    fn day_shape(&self, history: &[(DateTime<Local>, KilowattHours)]) -> Result<DayShape, Error>;
}

/// Cumulative daily load energy at the start of every 5-minute bucket of a day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<KilowattHours>", into = "Vec<KilowattHours>")]
pub struct DayShape(Vec<KilowattHours>);

impl TryFrom<Vec<KilowattHours>> for DayShape {
    type Error = Error;

    fn try_from(cumulative: Vec<KilowattHours>) -> Result<Self, Self::Error> {
        if cumulative.len() == BUCKETS_PER_DAY {
            Ok(Self(cumulative))
        } else {
            Err(Error::MalformedDayShape { expected: BUCKETS_PER_DAY, actual: cumulative.len() })
        }
    }
}

impl From<DayShape> for Vec<KilowattHours> {
    fn from(shape: DayShape) -> Self {
        shape.0
    }
}

impl DayShape {
    /// Energy consumed over the whole day.
    pub fn daily_total(&self) -> KilowattHours {
        self.0[BUCKETS_PER_DAY - 1] - self.0[0]
    }

    /// Average power for each of the `n_steps` buckets starting at the bucket containing `since`.
    ///
    /// The shape is repeated for a second day, so that the window may cross midnight.
    /// Non-positive differences are replaced with the two-day average power.
    pub fn power_forecast(&self, since: NaiveTime, n_steps: usize) -> Result<Vec<Kilowatts>, Error> {
        if n_steps > BUCKETS_PER_DAY {
            return Err(Error::HorizonTooLong { requested: n_steps, max: BUCKETS_PER_DAY });
        }
        let last = self.0[BUCKETS_PER_DAY - 1];
        let two_days =
            self.0.iter().copied().chain(self.0.iter().map(|energy| *energy + last)).collect_vec();
        let average_power = (two_days[two_days.len() - 1] - two_days[0]) / Hours(48.0);
        let bucket_hours = Hours::from(BUCKET_WIDTH);

        let start = bucket_index(since);
        let forecast = (start..start + n_steps)
            .map(|index| {
                let delta = if index == 0 {
                    two_days[1] - two_days[0]
                } else {
                    two_days[index] - two_days[index - 1]
                };
                let power = delta / bucket_hours;
                if power > Kilowatts::ZERO { power } else { average_power }
            })
            .collect();
        Ok(forecast)
    }

    /// Forecast consumption from `from` till the next `till`, wrapping past midnight.
    pub fn consumption_between(&self, from: NaiveTime, till: NaiveTime) -> KilowattHours {
        let from_energy = self.0[bucket_index(from)];
        let till_energy = self.0[bucket_index(till)];
        if bucket_index(till) >= bucket_index(from) {
            till_energy - from_energy
        } else {
            till_energy + self.0[BUCKETS_PER_DAY - 1] - from_energy
        }
    }
}

/// Averages the counter over several days, each trimmed of the neighbouring days' counter values.
#[derive(Builder)]
pub struct MultiDayAverage {
    /// Calendar days taken into account.
    days: Range<NaiveDate>,
}

impl DayShapeModel for MultiDayAverage {
    #[instrument(skip_all, fields(days = ?self.days, n_samples = history.len()))]
    fn day_shape(&self, history: &[(DateTime<Local>, KilowattHours)]) -> Result<DayShape, Error> {
        let samples_by_date = history
            .iter()
            .filter(|(timestamp, _)| self.days.contains(&timestamp.date_naive()))
            .map(|(timestamp, energy)| (*timestamp, energy.0))
            .sorted_by_key(|(timestamp, _)| *timestamp)
            .chunk_by(|(timestamp, _)| timestamp.date_naive());

        let mut days = Vec::new();
        for (date, samples) in &samples_by_date {
            let mut samples = samples.collect_vec();
            trim_carry_over(&mut samples);
            match bucket_day(&samples) {
                Some(buckets) => days.push(buckets),
                None => debug!(%date, "no usable samples"),
            }
        }
        if days.is_empty() {
            return Err(Error::InsufficientHistory { days: self.days.clone() });
        }

        #[expect(clippy::cast_precision_loss)]
        let n_days = days.len() as f64;
        let cumulative = (0..BUCKETS_PER_DAY)
            .map(|index| {
                KilowattHours(round_to_hundredths(
                    days.iter().map(|buckets| buckets[index]).sum::<f64>() / n_days,
                ))
            })
            .collect_vec();
        info!(n_days = days.len(), daily_total = ?(cumulative[BUCKETS_PER_DAY - 1] - cumulative[0]), "built the day shape");
        DayShape::try_from(cumulative)
    }
}

/// Drop the previous day's counter from the head and the next day's counter from the tail.
fn trim_carry_over(samples: &mut Vec<(DateTime<Local>, f64)>) {
    if samples.len() < 2 {
        return;
    }
    let half = samples.len() / 2;
    let first_half_min = samples[..half].iter().map(|(_, value)| *value).fold(f64::INFINITY, f64::min);
    let second_half_min = samples[half..samples.len() - 1]
        .iter()
        .map(|(_, value)| *value)
        .reduce(f64::min);

    let n_leading = samples.iter().take_while(|(_, value)| *value > first_half_min).count();
    samples.drain(..n_leading);

    if let Some(second_half_min) = second_half_min {
        while samples.last().is_some_and(|(_, value)| *value < second_half_min) {
            samples.pop();
        }
    }
}

/// Mean counter value per time-of-day bucket, gaps filled from the day's own neighbours.
fn bucket_day(samples: &[(DateTime<Local>, f64)]) -> Option<Vec<f64>> {
    let mut sums = vec![(0.0, 0_u32); BUCKETS_PER_DAY];
    for (timestamp, value) in samples {
        let (sum, count) = &mut sums[bucket_index(timestamp.time())];
        *sum += value;
        *count += 1;
    }
    let mut buckets =
        sums.into_iter().map(|(sum, count)| (count != 0).then(|| sum / f64::from(count))).collect_vec();
    if buckets.iter().all(Option::is_none) {
        return None;
    }
    buckets.fill_gaps(Interpolation::Linear);
    Some(buckets.into_iter().flatten().collect())
}

fn bucket_index(time: NaiveTime) -> usize {
    (time.num_seconds_from_midnight() / 300) as usize
}

/// Typical background consumption: the 20th percentile of the load power history.
pub fn base_load(load_power: impl IntoIterator<Item = Kilowatts>) -> Option<Kilowatts> {
    load_power.into_iter().map(|power| power.0).percentile(0.2).map(Kilowatts)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    /// A counter growing by 1 kWh per hour, reset at midnight.
    fn linear_day(day: u32) -> Vec<(DateTime<Local>, KilowattHours)> {
        (0..BUCKETS_PER_DAY)
            .map(|index| {
                let timestamp = Local.from_local_datetime(&date(day).and_time(time(0, 0))).unwrap()
                    + BUCKET_WIDTH * i32::try_from(index).unwrap();
                #[expect(clippy::cast_precision_loss)]
                let energy = KilowattHours(index as f64 / 12.0);
                (timestamp, energy)
            })
            .collect()
    }

    fn linear_shape() -> DayShape {
        let history = [linear_day(18), linear_day(19)].concat();
        MultiDayAverage::builder().days(date(18)..date(20)).build().day_shape(&history).unwrap()
    }

    #[test]
    fn test_day_shape_average() {
        let mut history = linear_day(18);
        history.extend(linear_day(19).into_iter().map(|(timestamp, energy)| (timestamp, energy * 3.0)));
        let shape =
            MultiDayAverage::builder().days(date(18)..date(20)).build().day_shape(&history).unwrap();
        assert_abs_diff_eq!(shape.0[12].0, 2.0);
        assert_abs_diff_eq!(shape.daily_total().0, 47.83, epsilon = 0.01);
    }

    #[test]
    fn test_day_shape_fills_missing_buckets() {
        let history = linear_day(18)
            .into_iter()
            .filter(|(timestamp, _)| !(1..3).contains(&timestamp.hour()))
            .collect_vec();
        let shape =
            MultiDayAverage::builder().days(date(18)..date(19)).build().day_shape(&history).unwrap();
        assert_abs_diff_eq!(shape.0[24].0, 2.0, epsilon = 0.01);
        assert_abs_diff_eq!(shape.0[30].0, 2.5, epsilon = 0.01);
    }

    #[test]
    fn test_day_shape_without_history() {
        let result = MultiDayAverage::builder().days(date(18)..date(20)).build().day_shape(&[]);
        assert!(matches!(result, Err(Error::InsufficientHistory { .. })));
    }

    #[test]
    fn test_trim_carry_over() {
        let at = |minutes| Local.with_ymd_and_hms(2025, 10, 18, 0, 0, 0).unwrap() + TimeDelta::minutes(minutes);
        let mut samples = vec![
            (at(0), 30.0),
            (at(5), 0.1),
            (at(10), 0.2),
            (at(15), 0.3),
            (at(20), 0.4),
            (at(25), 0.5),
            (at(30), 0.0),
        ];
        trim_carry_over(&mut samples);
        assert_eq!(samples.iter().map(|(_, value)| *value).collect_vec(), [0.1, 0.2, 0.3, 0.4, 0.5]);
    }

    #[test]
    fn test_power_forecast() {
        let forecast = linear_shape().power_forecast(time(12, 0), 6).unwrap();
        assert_eq!(forecast.len(), 6);
        for power in forecast {
            assert_abs_diff_eq!(power.0, 1.0, epsilon = 0.1);
        }
    }

    #[test]
    fn test_power_forecast_across_midnight() {
        let forecast = linear_shape().power_forecast(time(23, 50), 4).unwrap();
        assert_eq!(forecast.len(), 4);
        // The second day starts where the first one ends, so the flat bucket takes the average.
        for power in forecast {
            assert!(power > Kilowatts::ZERO);
        }
    }

    #[test]
    fn test_power_forecast_too_long() {
        assert!(matches!(
            linear_shape().power_forecast(time(0, 0), BUCKETS_PER_DAY + 1),
            Err(Error::HorizonTooLong { .. }),
        ));
    }

    #[test]
    fn test_consumption_between() {
        let shape = linear_shape();
        assert_abs_diff_eq!(shape.consumption_between(time(6, 0), time(18, 0)).0, 12.0, epsilon = 0.01);
        assert_abs_diff_eq!(shape.consumption_between(time(18, 0), time(6, 0)).0, 11.92, epsilon = 0.01);
    }

    #[test]
    fn test_malformed_day_shape() {
        assert!(matches!(
            DayShape::try_from(vec![KilowattHours::ZERO; 3]),
            Err(Error::MalformedDayShape { expected: BUCKETS_PER_DAY, actual: 3 }),
        ));
    }

    #[test]
    fn test_base_load() {
        let load = [0.3, 0.5, 2.0, 4.0, 0.4].map(Kilowatts);
        assert_abs_diff_eq!(base_load(load).unwrap().0, 0.38, epsilon = 1e-9);
    }
}
