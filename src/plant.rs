use std::ops::Range;

use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, TimeDelta};
use itertools::Itertools;

use crate::{
    api::home_assistant::{DetailedForecast, Gateway},
    core::{
        PlantLimits,
        PlantState,
        binning::{BinnedSample, Binner, parse_numeric},
        forecast::{floor_to_step, load::base_load, solar::SolarForecast},
        series::Interpolation,
    },
    prelude::*,
    quantity::{energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate},
};

/// Number of whole days the base load is estimated over.
const BASE_LOAD_DAYS: u64 = 7;

/// Entity IDs of the plant telemetry.
#[derive(Clone, Debug)]
pub struct PlantEntities {
    pub rated_capacity: String,
    pub state_of_charge: String,
    pub backup_state_of_charge: String,
    pub charge_cut_off_state_of_charge: String,
    pub available_discharging_capacity: String,
    pub available_charging_capacity: String,

    /// Battery power, positive when discharging.
    pub battery_power: String,

    pub solar_power: String,
    pub inverter_power: String,
    pub grid_power: String,
    pub load_power: String,

    /// Daily load consumption counter, reset at midnight.
    pub daily_load_consumption: String,

    pub solar_forecast_today: String,
    pub solar_forecast_tomorrow: String,
    pub solar_forecast_remaining_today: String,
    pub solar_forecast_this_hour: String,

    /// Published buy price in cents, used for the history.
    pub buy_price: String,

    /// Published sell price in cents, used for the history.
    pub sell_price: String,

    /// Published working mode label, used for the history.
    pub working_mode: String,
}

/// Power ratings of the hardware.
#[derive(Copy, Clone, Debug)]
pub struct PowerRatings {
    pub max_charging_power: Kilowatts,
    pub max_discharging_power: Kilowatts,
    pub max_solar_power: Kilowatts,
    pub max_inverter_power: Kilowatts,
    pub max_import_power: Kilowatts,
    pub max_export_power: Kilowatts,
}

/// Battery energy around the usable window.
#[derive(Copy, Clone, Debug)]
pub struct EnergyBalance {
    /// Stored energy above the backup reserve.
    pub available: KilowattHours,

    /// Energy the battery can still take before the charge cut-off.
    pub till_full: KilowattHours,
}

/// Binned recent telemetry for the dashboard.
#[derive(Clone, Debug, Default)]
pub struct PlantHistory {
    pub time: Vec<DateTime<Local>>,
    pub residual_energy: Vec<KilowattHours>,
    pub battery_power: Vec<Kilowatts>,
    pub inverter_power: Vec<Kilowatts>,
    pub solar_power: Vec<Kilowatts>,
    pub load_power: Vec<Kilowatts>,
    pub grid_power: Vec<Kilowatts>,
    pub buy_price: Vec<KilowattHourRate>,
    pub sell_price: Vec<KilowattHourRate>,
    pub working_mode: Vec<String>,
}

impl PlantHistory {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

pub struct PlantReader<'a, G> {
    gateway: &'a G,
    entities: &'a PlantEntities,
    ratings: PowerRatings,
}

impl<'a, G: Gateway> PlantReader<'a, G> {
    pub const fn new(gateway: &'a G, entities: &'a PlantEntities, ratings: PowerRatings) -> Self {
        Self { gateway, entities, ratings }
    }

    #[instrument(skip_all)]
    pub fn read_limits(&self) -> Result<PlantLimits> {
        let capacity = self.read_capacity()?;
        let backup = self.gateway.require_numeric_state(&self.entities.backup_state_of_charge)?;
        let cut_off = self.gateway.require_numeric_state(&self.entities.charge_cut_off_state_of_charge)?;
        let ratings = self.ratings;
        let limits = PlantLimits::builder()
            .capacity(capacity)
            .min_residual_energy(capacity * (backup / 100.0))
            .max_residual_energy(capacity * (cut_off / 100.0))
            .max_charging_power(ratings.max_charging_power)
            .max_discharging_power(ratings.max_discharging_power)
            .max_solar_power(ratings.max_solar_power)
            .max_inverter_power(ratings.max_inverter_power)
            .max_import_power(ratings.max_import_power)
            .max_export_power(ratings.max_export_power)
            .build();
        info!(?limits.capacity, ?limits.min_residual_energy, ?limits.max_residual_energy, "read the limits");
        Ok(limits)
    }

    #[instrument(skip_all)]
    pub fn read_state(&self, capacity: KilowattHours) -> Result<PlantState> {
        let power = |entity_id: &str| -> Result<Kilowatts> {
            Ok(Kilowatts(self.gateway.require_numeric_state(entity_id)?))
        };
        let state_of_charge = self.gateway.require_numeric_state(&self.entities.state_of_charge)?;
        let state = PlantState {
            residual_energy: capacity * (state_of_charge / 100.0),
            battery_power: power(&self.entities.battery_power)?,
            solar_power: power(&self.entities.solar_power)?,
            load_power: power(&self.entities.load_power)?,
            inverter_power: power(&self.entities.inverter_power)?,
            grid_power: power(&self.entities.grid_power)?,
        };
        info!(?state, "read the state");
        Ok(state)
    }

    pub fn read_energy_balance(&self, capacity: KilowattHours) -> Result<EnergyBalance> {
        let backup = self.gateway.require_numeric_state(&self.entities.backup_state_of_charge)?;
        let cut_off = self.gateway.require_numeric_state(&self.entities.charge_cut_off_state_of_charge)?;
        let dischargeable = self.gateway.require_numeric_state(&self.entities.available_discharging_capacity)?;
        let chargeable = self.gateway.require_numeric_state(&self.entities.available_charging_capacity)?;
        let reserve = capacity * (backup / 100.0);
        let unusable = capacity * (1.0 - cut_off / 100.0);
        let balance = EnergyBalance {
            available: (KilowattHours(dischargeable) - reserve).max(KilowattHours::ZERO),
            till_full: (KilowattHours(chargeable) - unusable).max(KilowattHours::ZERO),
        };
        debug!(?balance, "read the energy balance");
        Ok(balance)
    }

    /// Today's and tomorrow's detailed solar forecast.
    #[instrument(skip_all)]
    pub fn read_solar_forecast(&self) -> Result<SolarForecast> {
        let mut periods = Vec::new();
        for entity_id in [&self.entities.solar_forecast_today, &self.entities.solar_forecast_tomorrow] {
            let forecast = self
                .gateway
                .get_state(entity_id)?
                .attribute::<DetailedForecast>("detailedForecast")
                .with_context(|| format!("`{entity_id}` has no detailed forecast"))?;
            periods.extend(forecast.0.into_iter().map(|period| (period.period_start, period.power)));
        }
        debug!(n_periods = periods.len(), "read the solar forecast");
        let forecast: SolarForecast = periods.into_iter().collect();
        ensure!(!forecast.is_empty(), "the solar forecast is empty");
        Ok(forecast)
    }

    pub fn read_solar_remaining_today(&self) -> Result<KilowattHours> {
        Ok(KilowattHours(
            self.gateway.require_numeric_state(&self.entities.solar_forecast_remaining_today)?,
        ))
    }

    /// The sun is up when the forecast for this hour exceeds the base load.
    pub fn is_solar_daytime(&self, base_load: Kilowatts) -> Result<bool> {
        let this_hour = self.gateway.require_numeric_state(&self.entities.solar_forecast_this_hour)?;
        Ok(Kilowatts(this_hour) > base_load)
    }

    /// 20th percentile of the load power over the calendar days.
    #[instrument(skip_all, fields(days = ?days))]
    pub fn read_base_load(&self, days: &Range<NaiveDate>) -> Result<Kilowatts> {
        let since = start_of_day(days.start)?;
        let until = start_of_day(days.end)?;
        let load_power = self
            .read_numeric_history(&self.entities.load_power, since, until)?
            .into_iter()
            .map(|(_, value)| Kilowatts(value))
            .collect_vec();
        let base_load = base_load(load_power).context("no load power history to estimate the base load")?;
        info!(?base_load, "estimated");
        Ok(base_load)
    }

    /// Daily consumption counter samples over the calendar days.
    pub fn read_load_history(&self, days: &Range<NaiveDate>) -> Result<Vec<(DateTime<Local>, KilowattHours)>> {
        let since = start_of_day(days.start)?;
        let until = start_of_day(days.end)?;
        Ok(self
            .read_numeric_history(&self.entities.daily_load_consumption, since, until)?
            .into_iter()
            .map(|(timestamp, value)| (timestamp, KilowattHours(value)))
            .collect())
    }

    /// Recent telemetry in 5-minute bins, the bin of `now` included.
    #[instrument(skip_all, fields(now = ?now, span = ?span))]
    pub fn read_history(&self, now: DateTime<Local>, span: TimeDelta, capacity: KilowattHours) -> Result<PlantHistory> {
        let width = TimeDelta::minutes(5);
        let start = floor_to_step(now - span)?;
        #[expect(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let n_bins = ((now - start).num_minutes() / width.num_minutes()) as usize + 1;
        let binner = Binner::builder().start(start).width(width).n_bins(n_bins).build();

        let entities = self.entities;
        let numeric = |entity_id: &str, interpolation: Interpolation| -> Result<Vec<f64>> {
            let changes = self.gateway.get_history(entity_id, start, now)?;
            let bins = binner.bin_numeric(changes.into_iter().map(|change| change.into_sample()), interpolation);
            Ok(aggregates(entity_id, bins))
        };
        let power = |entity_id: &str| -> Result<Vec<Kilowatts>> {
            Ok(numeric(entity_id, Interpolation::Linear)?.into_iter().map(Kilowatts).collect())
        };
        let price = |entity_id: &str| -> Result<Vec<KilowattHourRate>> {
            Ok(numeric(entity_id, Interpolation::Step)?.into_iter().map(KilowattHourRate::from_cents).collect())
        };

        let working_mode = binner
            .bin_categorical(
                self.gateway
                    .get_history(&entities.working_mode, start, now)?
                    .into_iter()
                    .map(|change| change.into_sample()),
            )
            .into_iter()
            .filter_map(|bin| bin.aggregate)
            .collect();
        let history = PlantHistory {
            time: binner.times().collect(),
            residual_energy: numeric(&entities.state_of_charge, Interpolation::Linear)?
                .into_iter()
                .map(|state_of_charge| capacity * (state_of_charge / 100.0))
                .collect(),
            battery_power: power(&entities.battery_power)?,
            inverter_power: power(&entities.inverter_power)?,
            solar_power: power(&entities.solar_power)?,
            load_power: power(&entities.load_power)?,
            grid_power: power(&entities.grid_power)?,
            buy_price: price(&entities.buy_price)?,
            sell_price: price(&entities.sell_price)?,
            working_mode,
        };
        info!(n_bins = history.len(), "read the history");
        Ok(history)
    }

    fn read_capacity(&self) -> Result<KilowattHours> {
        Ok(KilowattHours(self.gateway.require_numeric_state(&self.entities.rated_capacity)?))
    }

    fn read_numeric_history(
        &self,
        entity_id: &str,
        since: DateTime<Local>,
        until: DateTime<Local>,
    ) -> Result<Vec<(DateTime<Local>, f64)>> {
        Ok(self
            .gateway
            .get_history(entity_id, since, until)?
            .into_iter()
            .filter_map(|change| {
                parse_numeric(&change.state).map(|value| (change.changed_at, value))
            })
            .collect())
    }
}

/// Bin aggregates, zeroed when the entity has no usable history at all.
fn aggregates(entity_id: &str, bins: Vec<BinnedSample<f64>>) -> Vec<f64> {
    if bins.iter().any(|bin| bin.aggregate.is_none()) {
        warn!(entity_id, "no usable history, zeroing");
    }
    bins.into_iter().map(|bin| bin.aggregate.unwrap_or_default()).collect()
}

/// Whole days the base load is estimated over: the week ending at the start of yesterday.
pub fn base_load_days(today: NaiveDate) -> Result<Range<NaiveDate>> {
    let until = today.checked_sub_days(Days::new(1)).context("yesterday is out of range")?;
    let since = until
        .checked_sub_days(Days::new(BASE_LOAD_DAYS))
        .context("the base load window is out of range")?;
    Ok(since..until)
}

pub fn start_of_day(date: NaiveDate) -> Result<DateTime<Local>> {
    date.and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .with_context(|| format!("{date} has no local midnight"))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    use super::*;
    use crate::{api::home_assistant::StateChange, controller::tests::FakeGateway};

    fn entities() -> PlantEntities {
        PlantEntities {
            rated_capacity: "sensor.capacity".to_owned(),
            state_of_charge: "sensor.soc".to_owned(),
            backup_state_of_charge: "number.backup".to_owned(),
            charge_cut_off_state_of_charge: "number.cut_off".to_owned(),
            available_discharging_capacity: "sensor.available_discharging".to_owned(),
            available_charging_capacity: "sensor.available_charging".to_owned(),
            battery_power: "sensor.battery".to_owned(),
            solar_power: "sensor.solar".to_owned(),
            inverter_power: "sensor.inverter".to_owned(),
            grid_power: "sensor.grid".to_owned(),
            load_power: "sensor.load".to_owned(),
            daily_load_consumption: "sensor.daily_load".to_owned(),
            solar_forecast_today: "sensor.solcast_today".to_owned(),
            solar_forecast_tomorrow: "sensor.solcast_tomorrow".to_owned(),
            solar_forecast_remaining_today: "sensor.solcast_remaining".to_owned(),
            solar_forecast_this_hour: "sensor.solcast_this_hour".to_owned(),
            buy_price: "sensor.buy_price".to_owned(),
            sell_price: "sensor.sell_price".to_owned(),
            working_mode: "sensor.working_mode".to_owned(),
        }
    }

    const RATINGS: PowerRatings = PowerRatings {
        max_charging_power: Kilowatts(21.0),
        max_discharging_power: Kilowatts(24.0),
        max_solar_power: Kilowatts(24.0),
        max_inverter_power: Kilowatts(15.0),
        max_import_power: Kilowatts(45.0),
        max_export_power: Kilowatts(15.0),
    };

    #[test]
    fn test_read_limits_and_state() -> Result {
        let gateway = FakeGateway::with_states([
            ("sensor.capacity", "40"),
            ("number.backup", "10"),
            ("number.cut_off", "95"),
            ("sensor.soc", "50.0"),
            ("sensor.battery", "-1.5"),
            ("sensor.solar", "3"),
            ("sensor.load", "1.5"),
            ("sensor.inverter", "1.5"),
            ("sensor.grid", "0"),
            ("sensor.available_discharging", "16"),
            ("sensor.available_charging", "20"),
        ]);
        let entities = entities();
        let reader = PlantReader::new(&gateway, &entities, RATINGS);

        let limits = reader.read_limits()?;
        assert_abs_diff_eq!(limits.min_residual_energy.0, 4.0);
        assert_abs_diff_eq!(limits.max_residual_energy.0, 38.0);

        let state = reader.read_state(limits.capacity)?;
        assert_abs_diff_eq!(state.residual_energy.0, 20.0);
        assert_eq!(state.battery_power, Kilowatts(-1.5));

        let balance = reader.read_energy_balance(limits.capacity)?;
        assert_abs_diff_eq!(balance.available.0, 12.0, epsilon = 1e-9);
        assert_abs_diff_eq!(balance.till_full.0, 18.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_energy_balance_within_backup_reserve() -> Result {
        let gateway = FakeGateway::with_states([
            ("number.backup", "10"),
            ("number.cut_off", "100"),
            ("sensor.available_discharging", "3"),
            ("sensor.available_charging", "37"),
        ]);
        let entities = entities();
        let balance = PlantReader::new(&gateway, &entities, RATINGS).read_energy_balance(KilowattHours(40.0))?;
        assert_eq!(balance.available, KilowattHours::ZERO);
        assert_abs_diff_eq!(balance.till_full.0, 37.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_unavailable_state_fails() {
        let gateway = FakeGateway::with_states([("sensor.capacity", "unavailable")]);
        let entities = entities();
        assert!(PlantReader::new(&gateway, &entities, RATINGS).read_limits().is_err());
    }

    #[test]
    fn test_read_history() -> Result {
        let now = Local.with_ymd_and_hms(2025, 10, 20, 12, 2, 0).unwrap();
        let change = |minutes: i64, state: &str| StateChange {
            state: state.to_owned(),
            changed_at: now - TimeDelta::minutes(minutes),
        };
        let mut gateway = FakeGateway::default();
        gateway.history.insert("sensor.soc".to_owned(), vec![change(60, "50"), change(1, "60")]);
        gateway.history.insert("sensor.sell_price".to_owned(), vec![change(30, "12")]);
        gateway.history.insert("sensor.working_mode".to_owned(), vec![change(20, "Dispatching")]);
        let entities = entities();

        let history = PlantReader::new(&gateway, &entities, RATINGS).read_history(
            now,
            TimeDelta::hours(1),
            KilowattHours(40.0),
        )?;
        assert_eq!(history.len(), 13);
        assert_eq!(history.time[0], Local.with_ymd_and_hms(2025, 10, 20, 11, 0, 0).unwrap());
        assert_abs_diff_eq!(history.residual_energy[0].0, 20.0);
        assert_abs_diff_eq!(history.residual_energy[12].0, 24.0);
        assert_abs_diff_eq!(history.sell_price[0].0, 0.12);
        assert_eq!(history.working_mode[0], "Unknown");
        assert_eq!(history.working_mode[12], "Dispatching");
        assert_eq!(history.load_power, vec![Kilowatts::ZERO; 13]);
        Ok(())
    }

    #[test]
    fn test_base_load_days() -> Result {
        let days = base_load_days(NaiveDate::from_ymd_opt(2025, 10, 20).unwrap())?;
        assert_eq!(days.start, NaiveDate::from_ymd_opt(2025, 10, 12).unwrap());
        assert_eq!(days.end, NaiveDate::from_ymd_opt(2025, 10, 19).unwrap());
        Ok(())
    }

    #[test]
    fn test_read_base_load_excludes_recent_days() -> Result {
        let change = |day: u32, hour: u32, state: &str| StateChange {
            state: state.to_owned(),
            changed_at: Local.with_ymd_and_hms(2025, 10, day, hour, 0, 0).unwrap(),
        };
        let mut gateway = FakeGateway::default();
        gateway.history.insert(
            "sensor.load".to_owned(),
            vec![
                change(11, 23, "0.1"),
                change(12, 3, "0.5"),
                change(15, 3, "0.5"),
                change(18, 3, "0.5"),
                change(18, 12, "unavailable"),
                change(19, 3, "0.1"),
                change(20, 3, "0.1"),
            ],
        );
        let entities = entities();
        let days = base_load_days(NaiveDate::from_ymd_opt(2025, 10, 20).unwrap())?;
        let base_load = PlantReader::new(&gateway, &entities, RATINGS).read_base_load(&days)?;
        assert_abs_diff_eq!(base_load.0, 0.5);
        Ok(())
    }
}
