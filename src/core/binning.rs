use std::iter::successors;

use bon::Builder;
use chrono::{DateTime, Local, TimeDelta};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    core::series::{FillGaps, Interpolation, round_to_hundredths},
    prelude::*,
};

/// Label of a categorical bin that has never seen a sample.
pub const UNKNOWN_STATE: &str = "Unknown";

/// One fixed-width interval of a binned series.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BinnedSample<V> {
    /// Start of the bin.
    pub time: DateTime<Local>,

    /// Raw values that fell into the bin, in chronological order.
    pub values: Vec<V>,

    /// Aggregated value. `None` only when the entire series lacks usable samples.
    pub aggregate: Option<V>,
}

/// Aggregates irregular samples into `n_bins` consecutive bins of `width` starting at `start`.
#[derive(Builder)]
pub struct Binner {
    start: DateTime<Local>,
    width: TimeDelta,
    n_bins: usize,
}

impl Binner {
    /// Numeric series: bin means rounded to hundredths, empty bins filled by `interpolation`.
    ///
    /// States that do not parse as a finite number are dropped.
    #[instrument(skip_all, fields(start = ?self.start, n_bins = self.n_bins, ?interpolation))]
    pub fn bin_numeric<S: AsRef<str>>(
        &self,
        samples: impl IntoIterator<Item = (DateTime<Local>, S)>,
        interpolation: Interpolation,
    ) -> Vec<BinnedSample<f64>> {
        let samples = samples
            .into_iter()
            .filter_map(|(timestamp, state)| parse_numeric(state.as_ref()).map(|value| (timestamp, value)));
        let mut bins = self.assign(samples);

        #[expect(clippy::cast_precision_loss)]
        let mut aggregates = bins
            .iter()
            .map(|bin| {
                (!bin.values.is_empty()).then(|| {
                    round_to_hundredths(bin.values.iter().sum::<f64>() / bin.values.len() as f64)
                })
            })
            .collect_vec();
        let n_empty = aggregates.iter().filter(|aggregate| aggregate.is_none()).count();
        aggregates.fill_gaps(interpolation);
        trace!(n_empty, "filled the gaps");

        for (bin, aggregate) in bins.iter_mut().zip(aggregates) {
            bin.aggregate = aggregate.map(round_to_hundredths);
        }
        bins
    }

    /// Categorical series: the last state seen in a bin, held forward across empty bins.
    #[instrument(skip_all, fields(start = ?self.start, n_bins = self.n_bins))]
    pub fn bin_categorical<S: AsRef<str>>(
        &self,
        samples: impl IntoIterator<Item = (DateTime<Local>, S)>,
    ) -> Vec<BinnedSample<String>> {
        let mut bins = self.assign(
            samples.into_iter().map(|(timestamp, state)| (timestamp, state.as_ref().to_owned())),
        );
        let mut last_known = UNKNOWN_STATE.to_owned();
        for bin in &mut bins {
            if let Some(last) = bin.values.last() {
                last_known.clone_from(last);
            }
            bin.aggregate = Some(last_known.clone());
        }
        bins
    }

    /// Start times of the bins.
    pub fn times(&self) -> impl Iterator<Item = DateTime<Local>> {
        let width = self.width;
        successors(Some(self.start), move |time| Some(*time + width)).take(self.n_bins)
    }

    fn assign<V>(
        &self,
        samples: impl IntoIterator<Item = (DateTime<Local>, V)>,
    ) -> Vec<BinnedSample<V>> {
        let mut bins = self
            .times()
            .map(|time| BinnedSample { time, values: Vec::new(), aggregate: None })
            .collect_vec();
        for (timestamp, value) in samples.into_iter().sorted_by_key(|(timestamp, _)| *timestamp) {
            if let Some(index) = self.index_of(timestamp) {
                bins[index].values.push(value);
            }
        }
        bins
    }

    fn index_of(&self, timestamp: DateTime<Local>) -> Option<usize> {
        let offset = (timestamp - self.start).num_milliseconds();
        let width = self.width.num_milliseconds();
        if offset < 0 || width <= 0 {
            return None;
        }
        usize::try_from(offset / width).ok().filter(|index| *index < self.n_bins)
    }
}

/// Parse a raw telemetry state, rejecting `unavailable`, `unknown` and the like.
#[must_use]
pub fn parse_numeric(state: &str) -> Option<f64> {
    state.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn binner(n_bins: usize) -> Binner {
        Binner::builder()
            .start(Local.with_ymd_and_hms(2025, 10, 20, 12, 0, 0).unwrap())
            .width(TimeDelta::minutes(5))
            .n_bins(n_bins)
            .build()
    }

    fn at(minutes: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 10, 20, 12, 0, 0).unwrap() + TimeDelta::minutes(minutes)
    }

    #[test]
    fn test_bin_numeric_linear() {
        let samples = [(at(1), "5"), (at(21), "6"), (at(12), "unavailable")];
        let aggregates = binner(5)
            .bin_numeric(samples, Interpolation::Linear)
            .into_iter()
            .map(|bin| bin.aggregate)
            .collect_vec();
        assert_eq!(aggregates, [Some(5.0), Some(5.25), Some(5.5), Some(5.75), Some(6.0)]);
    }

    #[test]
    fn test_bin_numeric_step() {
        let samples = [(at(1), "5"), (at(21), "6")];
        let aggregates = binner(5)
            .bin_numeric(samples, Interpolation::Step)
            .into_iter()
            .map(|bin| bin.aggregate)
            .collect_vec();
        assert_eq!(aggregates, [Some(5.0), Some(5.0), Some(5.0), Some(5.0), Some(6.0)]);
    }

    #[test]
    fn test_bin_mean_and_range() {
        let samples = [(at(-1), "100"), (at(0), "1"), (at(4), "2"), (at(10), "7"), (at(15), "9")];
        let bins = binner(3).bin_numeric(samples, Interpolation::Linear);
        assert_eq!(bins.len(), 3);
        assert_eq!(bins[0].values, [1.0, 2.0]);
        assert_eq!(bins[0].aggregate, Some(1.5));
        assert_eq!(bins[1].aggregate, Some(4.25));
        assert_eq!(bins[2].aggregate, Some(7.0));
        assert_eq!(bins[2].time, at(10));
    }

    #[test]
    fn test_bin_numeric_without_samples() {
        let bins = binner(2).bin_numeric([(at(1), "unknown")], Interpolation::Linear);
        assert!(bins.iter().all(|bin| bin.aggregate.is_none()));
    }

    #[test]
    fn test_binning_is_idempotent() {
        let samples = [(at(2), "1.5"), (at(3), "2.5"), (at(13), "4"), (at(29), "-1")];
        let binner = binner(6);
        let first = binner.bin_numeric(samples, Interpolation::Linear);
        let rebinned = binner.bin_numeric(
            first.iter().map(|bin| (bin.time, bin.aggregate.unwrap().to_string())),
            Interpolation::Linear,
        );
        assert_eq!(
            first.iter().map(|bin| bin.aggregate).collect_vec(),
            rebinned.iter().map(|bin| bin.aggregate).collect_vec(),
        );
    }

    #[test]
    fn test_bin_categorical() {
        let samples = [(at(6), "Self Consumption"), (at(7), "Dispatching"), (at(17), "Grid Import")];
        let aggregates = binner(4)
            .bin_categorical(samples)
            .into_iter()
            .map(|bin| bin.aggregate.unwrap())
            .collect_vec();
        assert_eq!(aggregates, [UNKNOWN_STATE, "Dispatching", "Dispatching", "Grid Import"]);
    }
}
