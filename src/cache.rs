use std::{fmt::Debug, fs, path::Path};

use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::{core::forecast::load::DayShape, prelude::*};

/// Load day shape persisted between cycles.
#[derive(Serialize, Deserialize)]
pub struct DayShapeCache {
    pub computed_at: DateTime<Local>,
    pub shape: DayShape,
}

impl DayShapeCache {
    /// `None` when the file does not exist yet.
    #[instrument(name = "reading the cache…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if path.is_file() { Ok(Some(toml::from_str(&fs::read_to_string(path)?)?)) } else { Ok(None) }
    }

    #[instrument(skip(self), name = "writing the cache…")]
    pub fn write_to<P: AsRef<Path> + Debug>(&self, path: P) -> Result {
        fs::write(path, toml::to_string(self)?)?;
        Ok(())
    }

    pub fn is_fresh(&self, now: DateTime<Local>, max_age: TimeDelta) -> bool {
        now - self.computed_at < max_age
    }

    /// Reuse the cached shape while it is fresh, otherwise compute and store a new one.
    ///
    /// A broken cache file is reported and recomputed.
    pub fn get_or_compute<P: AsRef<Path> + Debug>(
        path: P,
        now: DateTime<Local>,
        max_age: TimeDelta,
        compute: impl FnOnce() -> Result<DayShape>,
    ) -> Result<DayShape> {
        match Self::read_from(&path) {
            Ok(Some(cache)) if cache.is_fresh(now, max_age) => {
                info!(computed_at = ?cache.computed_at, "using the cached day shape");
                return Ok(cache.shape);
            }
            Ok(_) => {}
            Err(error) => warn!("failed to read the cache: {error:#}"),
        }
        let cache = Self { computed_at: now, shape: compute()? };
        if let Err(error) = cache.write_to(&path) {
            warn!("failed to write the cache: {error:#}");
        }
        Ok(cache.shape)
    }
}

#[cfg(test)]
mod tests {
    use std::env::temp_dir;

    use chrono::TimeZone;

    use super::*;
    use crate::{core::forecast::load::BUCKETS_PER_DAY, quantity::energy::KilowattHours};

    #[expect(clippy::cast_precision_loss)]
    fn shape() -> Result<DayShape> {
        Ok(DayShape::try_from((0..BUCKETS_PER_DAY).map(|index| KilowattHours(index as f64 * 0.1)).collect::<Vec<_>>())?)
    }

    #[test]
    fn test_get_or_compute() -> Result {
        let path = temp_dir().join(format!("wattle-day-shape-{}.toml", std::process::id()));
        let _ = fs::remove_file(&path);
        let now = Local.with_ymd_and_hms(2025, 10, 20, 12, 0, 0).unwrap();
        let max_age = TimeDelta::hours(24);

        let computed = DayShapeCache::get_or_compute(&path, now, max_age, shape)?;
        let cached = DayShapeCache::get_or_compute(&path, now + TimeDelta::hours(1), max_age, || {
            bail!("must not be recomputed")
        })?;
        assert_eq!(cached, computed);

        let recomputed = DayShapeCache::get_or_compute(&path, now + TimeDelta::hours(25), max_age, || {
            bail!("recomputed")
        });
        assert!(recomputed.is_err());

        fs::remove_file(&path)?;
        Ok(())
    }
}
