use std::fmt::{Display, Formatter};

use comfy_table::Color;

/// Label of a plan step no classification rule matched.
pub const UNDETERMINED_LABEL: &str = "Unable to determine";

#[derive(Debug, clap::ValueEnum, enumset::EnumSetType)]
pub enum ControlMode {
    /// Cover the load from solar and battery, never touch the grid deliberately.
    SelfConsumption,

    /// Charge from solar and export whatever the battery does not take.
    ExportExcessSolar,

    /// Export all solar, the battery idles or absorbs what the inverter cannot pass.
    ExportAllSolar,

    /// Discharge the battery into the grid.
    Dispatch,

    /// Import from the grid, possibly charging the battery.
    GridImport,

    /// Feed the load from solar only, curtailing the rest.
    SolarToLoad,
}

impl ControlMode {
    /// Human-readable label shared with the dashboard and the plan output.
    pub const fn label(self) -> &'static str {
        match self {
            Self::SelfConsumption => "Self Consumption",
            Self::ExportExcessSolar => "Exporting Excess Solar",
            Self::ExportAllSolar => "Exporting All Solar",
            Self::Dispatch => "Dispatching",
            Self::GridImport => "Grid Import",
            Self::SolarToLoad => "Solar To Load",
        }
    }

    pub const fn color(self) -> Color {
        match self {
            Self::SelfConsumption => Color::DarkYellow,
            Self::ExportExcessSolar => Color::Cyan,
            Self::ExportAllSolar => Color::Magenta,
            Self::Dispatch => Color::Blue,
            Self::GridImport => Color::Red,
            Self::SolarToLoad => Color::Green,
        }
    }
}

impl Display for ControlMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Label of an optional mode, using [`UNDETERMINED_LABEL`] for `None`.
pub fn label_of(mode: Option<ControlMode>) -> &'static str {
    mode.map_or(UNDETERMINED_LABEL, ControlMode::label)
}
