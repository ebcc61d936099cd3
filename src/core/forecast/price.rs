use std::iter::successors;

use bon::Builder;
use chrono::{DateTime, Local, TimeDelta};
use itertools::Itertools;

use crate::{
    core::{
        Error,
        forecast::{STEPS_PER_PERIOD, load::BUCKET_WIDTH},
        series::{FillGaps, Interpolation},
    },
    prelude::*,
    quantity::rate::KilowattHourRate,
};

/// Near-term 5-minute prices cover at most an hour.
pub const MAX_NEAR_TERM_STEPS: usize = 12;

/// Provider forecast period.
pub const PERIOD_WIDTH: TimeDelta = TimeDelta::minutes(30);

/// Price of the interval starting at the timestamp.
pub type PricePoint = (DateTime<Local>, KilowattHourRate);

/// Stitches provider prices of different resolutions into one 5-minute series.
///
/// Providers publish around 12 hours ahead, the rest of the horizon is covered by
/// the look-back prices, shifted to follow the mid-term forecast.
#[derive(Builder)]
pub struct PriceForecast<'a> {
    /// 5-minute prices by interval start.
    near_term: &'a [PricePoint],

    /// 30-minute forecast by period start.
    mid_term: &'a [PricePoint],

    /// 30-minute prices of the look-back window by period start, oldest first.
    history: &'a [PricePoint],
}

impl PriceForecast<'_> {
    /// Number of past 30-minute periods needed to complete a horizon of `n_steps`.
    ///
    /// One extra period covers a start in the middle of a period.
    pub const fn look_back_periods(n_steps: usize, n_mid_term: usize) -> usize {
        (n_steps.div_ceil(STEPS_PER_PERIOD) + 1).saturating_sub(n_mid_term)
    }

    /// Exactly `n_steps` prices of the steps starting at `start`.
    ///
    /// Each step takes the price of the interval containing it. Uncovered steps hold the
    /// previous known price, leading ones take the first.
    #[instrument(
        skip_all,
        fields(
            start = ?start,
            n_near_term = self.near_term.len(),
            n_mid_term = self.mid_term.len(),
            n_history = self.history.len(),
        ),
    )]
    pub fn extrapolate(&self, start: DateTime<Local>, n_steps: usize) -> Result<Vec<KilowattHourRate>, Error> {
        let near_term = &self.near_term[..self.near_term.len().min(MAX_NEAR_TERM_STEPS)];
        let history_shift = match (self.mid_term.last(), self.history.first()) {
            (Some((last, _)), Some((first, _))) => *last + PERIOD_WIDTH - *first,
            (None, Some((first, _))) => start - *first,
            (_, None) => TimeDelta::zero(),
        };

        let mut prices = successors(Some(start), |time| Some(*time + BUCKET_WIDTH))
            .take(n_steps)
            .map(|time| {
                price_at(near_term, BUCKET_WIDTH, TimeDelta::zero(), time)
                    .or_else(|| price_at(self.mid_term, PERIOD_WIDTH, TimeDelta::zero(), time))
                    .or_else(|| price_at(self.history, PERIOD_WIDTH, history_shift, time))
                    .map(|price| price.0)
            })
            .collect_vec();

        let available = prices.iter().flatten().count();
        if available == 0 {
            return Err(Error::ForecastUnavailable { series: "price", available, required: n_steps });
        }
        if available < n_steps {
            warn!(available, required = n_steps, "padding with the nearest known price");
            prices.fill_gaps(Interpolation::Step);
        }
        Ok(prices.into_iter().map(|price| KilowattHourRate(price.unwrap_or_default())).collect())
    }
}

fn price_at(points: &[PricePoint], width: TimeDelta, shift: TimeDelta, time: DateTime<Local>) -> Option<KilowattHourRate> {
    points
        .iter()
        .find(|(since, _)| *since + shift <= time && time < *since + shift + width)
        .map(|(_, price)| *price)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 10, 20, hour, minute, 0).unwrap()
    }

    /// Consecutive intervals of `width` minutes starting at `since`.
    fn points(since: DateTime<Local>, width: i64, values: &[f64]) -> Vec<PricePoint> {
        values
            .iter()
            .zip(0..)
            .map(|(value, index)| (since + TimeDelta::minutes(width * index), KilowattHourRate(*value)))
            .collect()
    }

    fn rates(values: &[f64]) -> Vec<KilowattHourRate> {
        values.iter().copied().map(KilowattHourRate).collect()
    }

    #[test]
    fn test_extrapolate() {
        let near_term = points(at(10, 0), 5, &[0.9, 0.8]);
        let mid_term = points(at(10, 0), 30, &[0.1, 0.2]);
        let history = points(at(9, 0), 30, &[0.3, 0.4, 0.5]);
        let prices = PriceForecast::builder()
            .near_term(&near_term)
            .mid_term(&mid_term)
            .history(&history)
            .build()
            .extrapolate(at(10, 0), 24)
            .unwrap();
        let expected = [
            [0.9, 0.8, 0.1, 0.1, 0.1, 0.1],
            [0.2; 6],
            [0.3; 6],
            [0.4; 6],
        ]
        .concat();
        assert_eq!(prices, rates(&expected));
    }

    #[test]
    fn test_first_step_takes_the_interval_containing_the_start() {
        let near_term = points(at(10, 0), 5, &[0.9, 0.8, 0.7]);
        let mid_term = points(at(10, 0), 30, &[0.1, 0.2]);
        let prices = PriceForecast::builder()
            .near_term(&near_term)
            .mid_term(&mid_term)
            .history(&[])
            .build()
            .extrapolate(at(10, 5), 8)
            .unwrap();
        assert_eq!(prices, rates(&[0.8, 0.7, 0.1, 0.1, 0.1, 0.2, 0.2, 0.2]));
    }

    #[test]
    fn test_extrapolate_pads() {
        let mid_term = points(at(10, 0), 30, &[0.1]);
        let prices = PriceForecast::builder()
            .near_term(&[])
            .mid_term(&mid_term)
            .history(&[])
            .build()
            .extrapolate(at(10, 0), 8)
            .unwrap();
        assert_eq!(prices, rates(&[0.1; 8]));
    }

    #[test]
    fn test_extrapolate_near_term_only() {
        let near_term = points(at(10, 0), 5, &[0.5, 0.6]);
        let prices = PriceForecast::builder()
            .near_term(&near_term)
            .mid_term(&[])
            .history(&[])
            .build()
            .extrapolate(at(10, 0), 3)
            .unwrap();
        assert_eq!(prices, rates(&[0.5, 0.6, 0.6]));
    }

    #[test]
    fn test_extrapolate_without_prices() {
        let result = PriceForecast::builder()
            .near_term(&[])
            .mid_term(&[])
            .history(&[])
            .build()
            .extrapolate(at(10, 0), 3);
        assert!(matches!(result, Err(Error::ForecastUnavailable { series: "price", .. })));
    }

    #[test]
    fn test_look_back_periods() {
        assert_eq!(PriceForecast::look_back_periods(288, 24), 25);
        assert_eq!(PriceForecast::look_back_periods(288, 60), 0);
    }
}
