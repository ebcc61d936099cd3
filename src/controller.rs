use std::fmt::{Display, Formatter};

use crate::{
    api::home_assistant::Gateway,
    core::{Actuator, PlantLimits, PlantState},
    prelude::*,
    quantity::power::Kilowatts,
};

/// Solar surplus over the load above which export-all-solar lets the battery take the excess DC.
const SOLAR_BUFFER: Kilowatts = Kilowatts(2.0);

/// Setpoints closer than this are considered unchanged.
const SETPOINT_TOLERANCE: Kilowatts = Kilowatts(0.01);

/// Sigenergy remote EMS control mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RemoteEmsMode {
    MaximumSelfConsumption,
    CommandChargingPvFirst,
    CommandDischargingPvFirst,
}

impl RemoteEmsMode {
    pub const fn option(self) -> &'static str {
        match self {
            Self::MaximumSelfConsumption => "Maximum Self Consumption",
            Self::CommandChargingPvFirst => "Command Charging (PV First)",
            Self::CommandDischargingPvFirst => "Command Discharging (PV First)",
        }
    }
}

impl Display for RemoteEmsMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.option())
    }
}

/// Entity IDs of the inverter controls.
#[derive(Clone, Debug)]
pub struct ControlEntities {
    pub remote_ems_mode: String,
    pub max_discharging_limit: String,
    pub max_charging_limit: String,
    pub pv_max_power_limit: String,
    pub grid_export_limitation: String,
    pub grid_import_limitation: String,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Setpoint {
    pub mode: RemoteEmsMode,
    pub discharge: Kilowatts,
    pub charge: Kilowatts,
    pub pv: Kilowatts,
    pub export: Kilowatts,
    pub import: Kilowatts,
}

/// Drives the inverter through the remote EMS entities.
pub struct EnergyController<'a, G> {
    gateway: &'a G,
    entities: &'a ControlEntities,
    limits: &'a PlantLimits,

    /// Live telemetry used to pick the export-all-solar variant.
    state: PlantState,
}

impl<'a, G: Gateway> EnergyController<'a, G> {
    pub const fn new(
        gateway: &'a G,
        entities: &'a ControlEntities,
        limits: &'a PlantLimits,
        state: PlantState,
    ) -> Self {
        Self { gateway, entities, limits, state }
    }

    /// Write the setpoint unless the inverter already runs it.
    #[instrument(skip_all, fields(mode = %setpoint.mode))]
    pub fn apply(&self, setpoint: &Setpoint) -> Result {
        if self.current_setpoint()?.as_ref().is_some_and(|current| current.matches(setpoint)) {
            debug!("the setpoint is already active");
            return Ok(());
        }
        info!(?setpoint, "updating the control limits…");
        let entities = self.entities;
        for (entity_id, value) in [
            (&entities.max_discharging_limit, setpoint.discharge),
            (&entities.max_charging_limit, setpoint.charge),
            (&entities.pv_max_power_limit, setpoint.pv),
            (&entities.grid_export_limitation, setpoint.export),
            (&entities.grid_import_limitation, setpoint.import),
        ] {
            self.gateway.set_number(entity_id, value.0)?;
        }
        self.gateway.set_select(&entities.remote_ems_mode, setpoint.mode.option())
    }

    /// `None` when any of the controls is unavailable.
    fn current_setpoint(&self) -> Result<Option<Setpoint>> {
        let entities = self.entities;
        let mode = match self.gateway.get_state(&entities.remote_ems_mode)?.state.as_str() {
            "Maximum Self Consumption" => RemoteEmsMode::MaximumSelfConsumption,
            "Command Charging (PV First)" => RemoteEmsMode::CommandChargingPvFirst,
            "Command Discharging (PV First)" => RemoteEmsMode::CommandDischargingPvFirst,
            _ => return Ok(None),
        };
        let read = |entity_id: &str| -> Result<Option<Kilowatts>> {
            Ok(self.gateway.get_numeric_state(entity_id)?.map(Kilowatts))
        };
        let (
            Some(discharge),
            Some(charge),
            Some(pv),
            Some(export),
            Some(import),
        ) = (
            read(&entities.max_discharging_limit)?,
            read(&entities.max_charging_limit)?,
            read(&entities.pv_max_power_limit)?,
            read(&entities.grid_export_limitation)?,
            read(&entities.grid_import_limitation)?,
        )
        else {
            return Ok(None);
        };
        Ok(Some(Setpoint { mode, discharge, charge, pv, export, import }))
    }
}

impl Setpoint {
    fn matches(&self, other: &Self) -> bool {
        let close = |lhs: Kilowatts, rhs: Kilowatts| (lhs - rhs).abs() < SETPOINT_TOLERANCE;
        self.mode == other.mode
            && close(self.discharge, other.discharge)
            && close(self.charge, other.charge)
            && close(self.pv, other.pv)
            && close(self.export, other.export)
            && close(self.import, other.import)
    }
}

/// Requested limit clamped into `[0, max]`, or `max` when unspecified.
fn clamp_limit(limit: Option<Kilowatts>, max: Kilowatts) -> Kilowatts {
    limit.map_or(max, |limit| limit.clamp(Kilowatts::ZERO, max))
}

impl<G: Gateway> Actuator for EnergyController<'_, G> {
    fn dispatch(&mut self, export_limit: Option<Kilowatts>) -> Result {
        let limits = self.limits;
        self.apply(&Setpoint {
            mode: RemoteEmsMode::CommandDischargingPvFirst,
            discharge: limits.max_discharging_power,
            charge: Kilowatts::ZERO,
            pv: limits.max_solar_power,
            export: clamp_limit(export_limit, limits.max_export_power),
            import: Kilowatts::ZERO,
        })
    }

    fn export_all_solar(&mut self) -> Result {
        let limits = self.limits;
        let (mode, discharge, charge) = if self.state.load_power + SOLAR_BUFFER < self.state.solar_power {
            (RemoteEmsMode::CommandDischargingPvFirst, Kilowatts::ZERO, limits.max_charging_power)
        } else {
            (RemoteEmsMode::CommandChargingPvFirst, limits.max_discharging_power, Kilowatts::ZERO)
        };
        self.apply(&Setpoint {
            mode,
            discharge,
            charge,
            pv: limits.max_solar_power,
            export: limits.max_export_power,
            import: Kilowatts::ZERO,
        })
    }

    fn export_excess_solar(&mut self, charge_limit: Option<Kilowatts>) -> Result {
        let limits = self.limits;
        self.apply(&Setpoint {
            mode: RemoteEmsMode::CommandChargingPvFirst,
            discharge: limits.max_discharging_power,
            charge: clamp_limit(charge_limit, limits.max_charging_power),
            pv: limits.max_solar_power,
            export: limits.max_export_power,
            import: Kilowatts::ZERO,
        })
    }

    fn solar_to_load(&mut self) -> Result {
        let limits = self.limits;
        self.apply(&Setpoint {
            mode: RemoteEmsMode::CommandChargingPvFirst,
            discharge: limits.max_discharging_power,
            charge: Kilowatts::ZERO,
            pv: limits.max_solar_power,
            export: Kilowatts::ZERO,
            import: Kilowatts::ZERO,
        })
    }

    fn import_power(&mut self, charge_limit: Option<Kilowatts>, pv_limit: Option<Kilowatts>) -> Result {
        let limits = self.limits;
        self.apply(&Setpoint {
            mode: RemoteEmsMode::CommandChargingPvFirst,
            discharge: limits.max_discharging_power,
            charge: clamp_limit(charge_limit, limits.max_charging_power),
            pv: clamp_limit(pv_limit, limits.max_solar_power),
            export: Kilowatts::ZERO,
            import: limits.max_import_power,
        })
    }

    fn self_consumption(&mut self, pv_limit: Option<Kilowatts>) -> Result {
        let limits = self.limits;
        self.apply(&Setpoint {
            mode: RemoteEmsMode::MaximumSelfConsumption,
            discharge: limits.max_discharging_power,
            charge: limits.max_charging_power,
            pv: clamp_limit(pv_limit, limits.max_solar_power),
            export: Kilowatts::ZERO,
            import: Kilowatts::ZERO,
        })
    }
}

#[cfg(test)]
pub mod tests {
    use std::{cell::RefCell, collections::HashMap};

    use chrono::{DateTime, Local};

    use super::*;
    use crate::{
        api::home_assistant::{EntityState, StateChange},
        quantity::energy::KilowattHours,
    };

    /// In-memory entity states, recording the writes.
    #[derive(Default)]
    pub struct FakeGateway {
        pub states: RefCell<HashMap<String, String>>,
        pub history: HashMap<String, Vec<StateChange>>,
        pub n_writes: RefCell<usize>,
    }

    impl FakeGateway {
        pub fn with_states<'a>(states: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
            Self {
                states: RefCell::new(
                    states.into_iter().map(|(id, state)| (id.to_owned(), state.to_owned())).collect(),
                ),
                ..Self::default()
            }
        }

        pub fn state(&self, entity_id: &str) -> Option<String> {
            self.states.borrow().get(entity_id).cloned()
        }
    }

    impl Gateway for FakeGateway {
        fn get_state(&self, entity_id: &str) -> Result<EntityState> {
            let state = self.state(entity_id).unwrap_or_else(|| "unavailable".to_owned());
            Ok(EntityState { state, attributes: serde_json::Map::new() })
        }

        fn get_history(
            &self,
            entity_id: &str,
            since: DateTime<Local>,
            until: DateTime<Local>,
        ) -> Result<Vec<StateChange>> {
            Ok(self
                .history
                .get(entity_id)
                .into_iter()
                .flatten()
                .filter(|change| (since..until).contains(&change.changed_at))
                .cloned()
                .collect())
        }

        fn set_number(&self, entity_id: &str, value: f64) -> Result {
            *self.n_writes.borrow_mut() += 1;
            self.states.borrow_mut().insert(entity_id.to_owned(), value.to_string());
            Ok(())
        }

        fn set_select(&self, entity_id: &str, option: &str) -> Result {
            *self.n_writes.borrow_mut() += 1;
            self.states.borrow_mut().insert(entity_id.to_owned(), option.to_owned());
            Ok(())
        }
    }

    fn entities() -> ControlEntities {
        ControlEntities {
            remote_ems_mode: "select.mode".to_owned(),
            max_discharging_limit: "number.discharge".to_owned(),
            max_charging_limit: "number.charge".to_owned(),
            pv_max_power_limit: "number.pv".to_owned(),
            grid_export_limitation: "number.export".to_owned(),
            grid_import_limitation: "number.import".to_owned(),
        }
    }

    fn limits() -> PlantLimits {
        PlantLimits::builder()
            .capacity(KilowattHours(40.0))
            .min_residual_energy(KilowattHours(4.0))
            .max_residual_energy(KilowattHours(40.0))
            .max_charging_power(Kilowatts(21.0))
            .max_discharging_power(Kilowatts(24.0))
            .max_solar_power(Kilowatts(24.0))
            .max_inverter_power(Kilowatts(15.0))
            .max_import_power(Kilowatts(45.0))
            .max_export_power(Kilowatts(15.0))
            .build()
    }

    #[test]
    fn test_dispatch_clamps_the_export_limit() -> Result {
        let gateway = FakeGateway::default();
        let (entities, limits) = (entities(), limits());
        let mut controller = EnergyController::new(&gateway, &entities, &limits, PlantState::default());
        controller.dispatch(Some(Kilowatts(30.0)))?;
        assert_eq!(gateway.state("select.mode").as_deref(), Some("Command Discharging (PV First)"));
        assert_eq!(gateway.state("number.export").as_deref(), Some("15"));
        assert_eq!(gateway.state("number.charge").as_deref(), Some("0"));
        assert_eq!(gateway.state("number.import").as_deref(), Some("0"));
        Ok(())
    }

    #[test]
    fn test_repeated_command_is_idempotent() -> Result {
        let gateway = FakeGateway::default();
        let (entities, limits) = (entities(), limits());
        let mut controller = EnergyController::new(&gateway, &entities, &limits, PlantState::default());
        controller.import_power(Some(Kilowatts(5.0)), Some(Kilowatts(-1.0)))?;
        assert_eq!(*gateway.n_writes.borrow(), 6);
        assert_eq!(gateway.state("number.pv").as_deref(), Some("0"));
        controller.import_power(Some(Kilowatts(5.0)), Some(Kilowatts(0.0)))?;
        assert_eq!(*gateway.n_writes.borrow(), 6);
        Ok(())
    }

    #[test]
    fn test_export_all_solar_lets_the_battery_absorb_the_excess() -> Result {
        let gateway = FakeGateway::default();
        let (entities, limits) = (entities(), limits());
        let state = PlantState {
            solar_power: Kilowatts(20.0),
            load_power: Kilowatts(1.0),
            ..PlantState::default()
        };
        EnergyController::new(&gateway, &entities, &limits, state).export_all_solar()?;
        assert_eq!(gateway.state("select.mode").as_deref(), Some("Command Discharging (PV First)"));
        assert_eq!(gateway.state("number.discharge").as_deref(), Some("0"));
        assert_eq!(gateway.state("number.charge").as_deref(), Some("21"));
        Ok(())
    }

    #[test]
    fn test_export_all_solar_with_little_solar() -> Result {
        let gateway = FakeGateway::default();
        let (entities, limits) = (entities(), limits());
        let state = PlantState {
            solar_power: Kilowatts(2.5),
            load_power: Kilowatts(1.0),
            ..PlantState::default()
        };
        EnergyController::new(&gateway, &entities, &limits, state).export_all_solar()?;
        assert_eq!(gateway.state("select.mode").as_deref(), Some("Command Charging (PV First)"));
        assert_eq!(gateway.state("number.discharge").as_deref(), Some("24"));
        Ok(())
    }
}
