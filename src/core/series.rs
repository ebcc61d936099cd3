mod fill_gaps;
mod percentile;

pub use self::{
    fill_gaps::{FillGaps, Interpolation},
    percentile::Percentile,
};

/// Round to two decimal places, the resolution telemetry is reported in.
#[must_use]
pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
