pub mod load;
pub mod price;
pub mod solar;

use chrono::{DateTime, DurationRound, Local};

use crate::{core::forecast::load::BUCKET_WIDTH, prelude::*};

/// Optimizer steps in one 30-minute provider period.
pub const STEPS_PER_PERIOD: usize = 6;

/// Round up to the next step boundary.
pub fn ceil_to_step(time: DateTime<Local>) -> Result<DateTime<Local>> {
    let floor = time.duration_trunc(BUCKET_WIDTH)?;
    Ok(if floor == time { floor } else { floor + BUCKET_WIDTH })
}

/// Round down to the step boundary.
pub fn floor_to_step(time: DateTime<Local>) -> Result<DateTime<Local>> {
    Ok(time.duration_trunc(BUCKET_WIDTH)?)
}
