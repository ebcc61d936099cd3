use bon::Builder;
use enumset::EnumSet;
use itertools::Itertools;

use crate::{
    core::{actuator::Actuator, control_mode::ControlMode},
    prelude::*,
    quantity::{energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate, time::Hours},
};

/// Modes the rule-based controller chooses from, highest priority first.
pub const PRIORITY: [ControlMode; 4] = [
    ControlMode::Dispatch,
    ControlMode::ExportAllSolar,
    ControlMode::ExportExcessSolar,
    ControlMode::SelfConsumption,
];

/// Raw telemetry and forecast summaries of the current cycle.
#[derive(Builder)]
pub struct Observations<'a> {
    feed_in_price: KilowattHourRate,

    /// 30-minute feed-in price forecast over the next 12 hours.
    feed_in_forecast: &'a [KilowattHourRate],

    /// Stored energy above the backup reserve.
    energy_available: KilowattHours,

    energy_till_full: KilowattHours,
    solar_remaining_today: KilowattHours,
    consumption_till_sunrise: KilowattHours,
    consumption_till_sundown: KilowattHours,
    is_solar_daytime: bool,
    max_export_power: Kilowatts,
}

/// Derived decision inputs.
#[derive(Copy, Clone, Debug)]
pub struct Conditions {
    pub feed_in_price: KilowattHourRate,
    pub target_dispatch_price: KilowattHourRate,
    pub energy_available: KilowattHours,
    pub energy_till_full: KilowattHours,
    pub solar_remaining_today: KilowattHours,
    pub required_till_sunrise: KilowattHours,
    pub required_till_sundown: KilowattHours,
    pub is_solar_daytime: bool,
}

#[derive(Copy, Clone, Debug, Builder)]
pub struct RbcSettings {
    /// Safety margin on the forecast consumption, in percent.
    #[builder(default = 35.0)]
    buffer_percent: f64,

    /// Energy always kept on top of the buffered consumption.
    #[builder(default = KilowattHours(2.0))]
    reserve_offset: KilowattHours,

    /// Discount on the forecast price to make dispatching likely to trigger, in percent.
    #[builder(default = 10.0)]
    target_price_reduction_percent: f64,

    /// Floor of the target dispatch price, normally the battery wear cost.
    #[builder(default = KilowattHourRate(0.07))]
    min_dispatch_price: KilowattHourRate,

    /// Extra energy required above the sunrise requirement to start dispatching.
    #[builder(default = KilowattHours(1.0))]
    dispatch_entry_margin: KilowattHours,

    #[builder(default = KilowattHours(11.0))]
    export_all_solar_entry_margin: KilowattHours,

    #[builder(default = KilowattHours(10.0))]
    export_all_solar_exit_margin: KilowattHours,

    #[builder(default = KilowattHourRate(0.02))]
    min_export_all_solar_price: KilowattHourRate,
}

impl Default for RbcSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RbcSettings {
    #[instrument(skip_all)]
    pub fn conditions(&self, observations: &Observations) -> Conditions {
        let required_till_sunrise = self.required_energy(observations.consumption_till_sunrise);
        let required_till_sundown = self.required_energy(observations.consumption_till_sundown);
        let hours_available = ((observations.energy_available - required_till_sunrise)
            / observations.max_export_power)
            .max(Hours::ZERO);
        let target_dispatch_price =
            self.target_dispatch_price(observations.feed_in_forecast, hours_available);
        debug!(
            ?required_till_sunrise,
            ?required_till_sundown,
            ?hours_available,
            ?target_dispatch_price,
            "derived the conditions",
        );
        Conditions {
            feed_in_price: observations.feed_in_price,
            target_dispatch_price,
            energy_available: observations.energy_available,
            energy_till_full: observations.energy_till_full,
            solar_remaining_today: observations.solar_remaining_today,
            required_till_sunrise,
            required_till_sundown,
            is_solar_daytime: observations.is_solar_daytime,
        }
    }

    /// Buffered consumption plus the reserve offset.
    fn required_energy(&self, consumption: KilowattHours) -> KilowattHours {
        consumption.max(KilowattHours::ZERO) * (1.0 + self.buffer_percent / 100.0)
            + self.reserve_offset
    }

    /// The forecast price that the available discharge hours can still be sold at.
    ///
    /// The forecast is ranked from the most expensive period down, and the battery
    /// can cover about `2 × hours_available` half-hour periods of them.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn target_dispatch_price(
        &self,
        feed_in_forecast: &[KilowattHourRate],
        hours_available: Hours,
    ) -> KilowattHourRate {
        let ranked = feed_in_forecast.iter().copied().sorted_unstable_by(|lhs, rhs| rhs.cmp(lhs)).collect_vec();
        let index = ((hours_available.0 * 2.0).round() as usize).min(ranked.len().saturating_sub(1));
        ranked
            .get(index)
            .map_or(self.min_dispatch_price, |price| {
                (*price * (1.0 - self.target_price_reduction_percent / 100.0)).max(self.min_dispatch_price)
            })
            .round_to_cents()
    }
}

/// Priority and hysteresis state machine over the control modes.
pub struct RuleBasedController {
    settings: RbcSettings,
    modes: EnumSet<ControlMode>,
    current: Option<ControlMode>,
}

impl RuleBasedController {
    /// Self-consumption is always enabled, whatever `modes` says.
    pub fn new(settings: RbcSettings, modes: EnumSet<ControlMode>) -> Self {
        let modes = (modes | ControlMode::SelfConsumption) & EnumSet::from_iter(PRIORITY);
        Self { settings, modes, current: None }
    }

    /// Pick the mode for this cycle and remember it.
    ///
    /// A strictly higher-priority mode that can be entered always wins. Otherwise the current mode
    /// is kept until its exit condition holds, after which the first enterable mode is taken.
    pub fn select_mode(&mut self, conditions: &Conditions) -> Option<ControlMode> {
        let enabled = PRIORITY.into_iter().filter(|mode| self.modes.contains(*mode)).collect_vec();
        let higher = match self.current {
            Some(current) => enabled.iter().copied().take_while(|mode| *mode != current).collect_vec(),
            None => enabled.clone(),
        };

        let selected = if let Some(mode) = higher.into_iter().find(|mode| self.can_enter(*mode, conditions)) {
            Some(mode)
        } else if let Some(current) = self.current
            && !self.should_exit(current, conditions)
        {
            Some(current)
        } else {
            enabled.into_iter().find(|mode| self.can_enter(*mode, conditions))
        };

        if selected != self.current {
            info!(from = ?self.current, to = ?selected, ?conditions, "switching the mode");
        }
        self.current = selected;
        selected
    }

    /// Select the mode and actuate it, falling back to self-consumption when none is selected.
    #[instrument(skip_all)]
    pub fn run(&mut self, conditions: &Conditions, actuator: &mut impl Actuator) -> Result<Option<ControlMode>> {
        let selected = self.select_mode(conditions);
        match selected.unwrap_or(ControlMode::SelfConsumption) {
            ControlMode::Dispatch => actuator.dispatch(None)?,
            ControlMode::ExportAllSolar => actuator.export_all_solar()?,
            ControlMode::ExportExcessSolar => actuator.export_excess_solar(None)?,
            ControlMode::SelfConsumption | ControlMode::GridImport | ControlMode::SolarToLoad => {
                actuator.self_consumption(None)?;
            }
        }
        Ok(selected)
    }

    fn can_enter(&self, mode: ControlMode, conditions: &Conditions) -> bool {
        let settings = &self.settings;
        match mode {
            ControlMode::Dispatch => {
                conditions.feed_in_price >= conditions.target_dispatch_price
                    && conditions.energy_available
                        > conditions.required_till_sunrise + settings.dispatch_entry_margin
            }
            ControlMode::ExportAllSolar => {
                Self::solar_surplus(conditions) >= settings.export_all_solar_entry_margin
                    && conditions.feed_in_price >= settings.min_export_all_solar_price
                    && conditions.is_solar_daytime
            }
            ControlMode::ExportExcessSolar => conditions.feed_in_price >= KilowattHourRate::ZERO,
            ControlMode::SelfConsumption => true,
            ControlMode::GridImport | ControlMode::SolarToLoad => false,
        }
    }

    fn should_exit(&self, mode: ControlMode, conditions: &Conditions) -> bool {
        let settings = &self.settings;
        match mode {
            ControlMode::Dispatch => {
                conditions.feed_in_price < conditions.target_dispatch_price
                    || conditions.energy_available <= conditions.required_till_sunrise
            }
            ControlMode::ExportAllSolar => {
                Self::solar_surplus(conditions) < settings.export_all_solar_exit_margin
                    || conditions.feed_in_price < settings.min_export_all_solar_price
                    || !conditions.is_solar_daytime
            }
            ControlMode::ExportExcessSolar => conditions.feed_in_price < KilowattHourRate::ZERO,
            ControlMode::SelfConsumption => false,
            ControlMode::GridImport | ControlMode::SolarToLoad => true,
        }
    }

    /// Energy expected to be left over today after refilling the battery and covering the evening.
    fn solar_surplus(conditions: &Conditions) -> KilowattHours {
        conditions.solar_remaining_today + conditions.energy_available
            - conditions.required_till_sundown
            - conditions.energy_till_full
    }
}
