use std::path::PathBuf;

use chrono::{DateTime, Days, Local, TimeDelta};
use clap::Parser;

use crate::{
    api::home_assistant::Gateway,
    cache::DayShapeCache,
    core::forecast::load::{DayShape, DayShapeModel, MultiDayAverage},
    plant::PlantReader,
    prelude::*,
};

#[derive(Parser)]
pub struct LoadModelArgs {
    /// Number of past days averaged into the day shape.
    #[clap(long = "load-history-days", default_value = "3", env = "LOAD_HISTORY_DAYS")]
    history_days: u64,

    #[clap(long = "day-shape-cache-path", default_value = "day-shape.toml", env = "DAY_SHAPE_CACHE_PATH")]
    cache_path: PathBuf,

    /// Recompute the day shape once it is older than this.
    #[clap(long = "day-shape-max-age", default_value = "24h", env = "DAY_SHAPE_MAX_AGE")]
    max_age: humantime::Duration,

    /// Ignore the cached day shape.
    #[clap(long = "recompute-day-shape")]
    force_recompute: bool,
}

impl LoadModelArgs {
    /// Cached day shape, recomputed from the daily consumption counter when stale.
    #[instrument(skip_all)]
    pub fn day_shape<G: Gateway>(&self, reader: &PlantReader<G>, now: DateTime<Local>) -> Result<DayShape> {
        let max_age = if self.force_recompute { TimeDelta::zero() } else { TimeDelta::from_std(self.max_age.into())? };
        DayShapeCache::get_or_compute(&self.cache_path, now, max_age, || {
            let today = now.date_naive();
            let since = today
                .checked_sub_days(Days::new(self.history_days))
                .context("the load history start is out of range")?;
            let days = since..today;
            info!(?days, "computing the day shape…");
            let history = reader.read_load_history(&days)?;
            Ok(MultiDayAverage::builder().days(days).build().day_shape(&history)?)
        })
        .inspect(|shape| info!(daily_total = ?shape.daily_total(), "using the day shape"))
    }
}
