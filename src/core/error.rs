use std::ops::Range;

use chrono::NaiveDate;

/// Named failures of the planning core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{series} forecast covers {available} steps, {required} are required")]
    ForecastUnavailable { series: &'static str, available: usize, required: usize },

    #[error("no usable load history within {days:?}")]
    InsufficientHistory { days: Range<NaiveDate> },

    #[error("day shape must have {expected} buckets, got {actual}")]
    MalformedDayShape { expected: usize, actual: usize },

    #[error("horizon of {requested} steps exceeds the maximum of {max} steps")]
    HorizonTooLong { requested: usize, max: usize },

    #[error("the dispatch problem is infeasible")]
    Infeasible,

    #[error("the solver did not reach an optimal solution")]
    Solver(#[source] good_lp::ResolutionError),
}

impl From<good_lp::ResolutionError> for Error {
    fn from(error: good_lp::ResolutionError) -> Self {
        match error {
            good_lp::ResolutionError::Infeasible => Self::Infeasible,
            error => Self::Solver(error),
        }
    }
}
