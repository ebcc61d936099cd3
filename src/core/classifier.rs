use bon::Builder;

use crate::{
    core::{
        actuator::{Actuator, Command},
        control_mode::ControlMode,
        plant::PlantLimits,
    },
    prelude::*,
    quantity::power::Kilowatts,
};

/// Planned powers of a single step, as seen by the classifier.
///
/// Inverter and battery power are positive when discharging, grid net power is positive when importing.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StepPowers {
    pub inverter: Kilowatts,
    pub solar_used: Kilowatts,
    pub solar_available: Kilowatts,
    pub load: Kilowatts,
    pub grid_net: Kilowatts,
    pub battery: Kilowatts,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    Matched { mode: ControlMode, command: Command },
    Undetermined,
}

impl Classification {
    pub const fn mode(self) -> Option<ControlMode> {
        match self {
            Self::Matched { mode, .. } => Some(mode),
            Self::Undetermined => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("no control mode matches {powers:?}")]
pub struct AmbiguousStep {
    pub powers: StepPowers,
}

/// Outcome of an active classification.
#[must_use]
#[derive(Debug)]
pub enum Actuation {
    Applied(ControlMode),

    /// No rule matched: self-consumption has been applied and the fault is reported here.
    ForcedSelfConsumption(AmbiguousStep),
}

struct Rule {
    mode: ControlMode,
    matches: fn(&Classifier, &StepPowers) -> bool,
    command: fn(&Classifier, &StepPowers) -> Command,
}

/// Maps a planned step onto the discrete control modes by an ordered rule table.
#[derive(Copy, Clone, Debug, Builder)]
pub struct Classifier {
    /// Powers closer than this are considered equal.
    #[builder(default = Kilowatts(0.2))]
    tolerance: Kilowatts,

    max_inverter_power: Kilowatts,
    max_export_power: Kilowatts,
}

impl Classifier {
    pub fn from_limits(limits: &PlantLimits, tolerance: Kilowatts) -> Self {
        Self::builder()
            .tolerance(tolerance)
            .max_inverter_power(limits.max_inverter_power)
            .max_export_power(limits.max_export_power)
            .build()
    }

    /// The first matching rule wins.
    fn rules() -> [Rule; 7] {
        [
            Rule {
                mode: ControlMode::ExportAllSolar,
                matches: |this, step| {
                    (this.approx(step.inverter, step.solar_used)
                        && step.solar_used > step.load + this.tolerance
                        && step.grid_net < -this.tolerance)
                        || (this.approx(step.inverter, this.max_inverter_power)
                            && step.solar_used > this.max_inverter_power)
                },
                command: |_, _| Command::ExportAllSolar,
            },
            Rule {
                mode: ControlMode::SolarToLoad,
                matches: |this, step| {
                    this.approx(step.inverter, step.load)
                        && this.approx(step.load, step.solar_used)
                        && step.solar_used + this.tolerance < step.solar_available
                },
                command: |_, _| Command::SolarToLoad,
            },
            Rule {
                mode: ControlMode::SelfConsumption,
                matches: |this, step| {
                    this.approx(step.inverter, step.load)
                        && this.approx(step.solar_used + step.battery, step.load)
                },
                command: |_, _| Command::SelfConsumption { pv_limit: None },
            },
            Rule {
                mode: ControlMode::Dispatch,
                matches: |this, step| {
                    step.inverter > step.solar_used + this.tolerance
                        && step.inverter > step.load + this.tolerance
                },
                command: |this, step| Command::Dispatch {
                    export_limit: Some(if this.approx(step.inverter, this.max_inverter_power) {
                        this.max_export_power
                    } else {
                        step.grid_net.abs()
                    }),
                },
            },
            Rule {
                mode: ControlMode::ExportExcessSolar,
                matches: |this, step| {
                    step.grid_net < -this.tolerance
                        && step.solar_used > step.inverter + this.tolerance
                },
                command: |_, step| Command::ExportExcessSolar {
                    charge_limit: Some(step.battery.abs()),
                },
            },
            Rule {
                mode: ControlMode::GridImport,
                matches: |this, step| step.grid_net > this.tolerance,
                command: |_, step| Command::ImportPower {
                    charge_limit: Some(step.battery.abs()),
                    pv_limit: None,
                },
            },
            Rule {
                mode: ControlMode::GridImport,
                matches: |this, step| {
                    step.inverter < Kilowatts::ZERO && step.battery < this.tolerance
                },
                command: |_, step| Command::ImportPower {
                    charge_limit: Some(step.battery.abs()),
                    pv_limit: Some(step.solar_used),
                },
            },
        ]
    }

    /// Label the step without side effects.
    pub fn classify(&self, step: &StepPowers) -> Classification {
        Self::rules()
            .into_iter()
            .find(|rule| (rule.matches)(self, step))
            .map_or(Classification::Undetermined, |rule| Classification::Matched {
                mode: rule.mode,
                command: (rule.command)(self, step),
            })
    }

    /// Classify the step and issue exactly one actuation command.
    #[instrument(skip_all)]
    pub fn actuate(&self, step: &StepPowers, actuator: &mut impl Actuator) -> Result<Actuation> {
        match self.classify(step) {
            Classification::Matched { mode, command } => {
                info!(%mode, ?command, "actuating…");
                command.apply(actuator)?;
                Ok(Actuation::Applied(mode))
            }
            Classification::Undetermined => {
                error!(?step, "unable to determine the control mode, forcing self-consumption");
                Command::SelfConsumption { pv_limit: None }.apply(actuator)?;
                Ok(Actuation::ForcedSelfConsumption(AmbiguousStep { powers: *step }))
            }
        }
    }

    fn approx(&self, lhs: Kilowatts, rhs: Kilowatts) -> bool {
        (lhs - rhs).abs() < self.tolerance
    }
}
