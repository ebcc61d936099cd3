use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    core::{
        DispatchPlan,
        control_mode::{UNDETERMINED_LABEL, label_of},
        series::Percentile,
    },
    quantity::{cost::Cost, energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate},
};

pub fn build_plan_table(plan: &DispatchPlan) -> Table {
    let median_buy_price = plan
        .steps
        .iter()
        .map(|step| step.buy_price.0)
        .percentile(0.5)
        .map_or(KilowattHourRate::ZERO, KilowattHourRate);
    let power_cell = |power: Kilowatts, color: Color| {
        Cell::new(power).set_alignment(CellAlignment::Right).fg(if power > Kilowatts(0.01) {
            color
        } else {
            Color::Reset
        })
    };

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table.set_header(vec![
        "Start", "Buy", "Sell", "Load", "Solar", "Charge", "Discharge", "Import", "Export", "Before",
        "After", "Mode", "Profit",
    ]);
    for step in &plan.steps {
        table.add_row(vec![
            Cell::new(step.time.format("%H:%M")),
            Cell::new(step.buy_price).fg(if step.buy_price >= median_buy_price {
                Color::Red
            } else {
                Color::Green
            }),
            Cell::new(step.sell_price).add_attribute(Attribute::Dim),
            Cell::new(step.load).set_alignment(CellAlignment::Right),
            power_cell(step.solar_used, Color::Yellow),
            power_cell(step.charge, Color::Green),
            power_cell(step.discharge, Color::DarkYellow),
            power_cell(step.grid_import, Color::Red),
            power_cell(step.grid_export, Color::Blue),
            Cell::new(step.residual_energy_before)
                .set_alignment(CellAlignment::Right)
                .add_attribute(Attribute::Dim),
            Cell::new(step.residual_energy_after).set_alignment(CellAlignment::Right).fg(
                if step.residual_energy_after > plan.min_residual_energy + KilowattHours(0.01) {
                    Color::Reset
                } else {
                    Color::Red
                },
            ),
            step.mode.map_or_else(
                || Cell::new(UNDETERMINED_LABEL).fg(Color::Red),
                |mode| Cell::new(label_of(Some(mode))).fg(mode.color()),
            ),
            Cell::new(step.profit)
                .set_alignment(CellAlignment::Right)
                .fg(if step.profit >= Cost::ZERO { Color::Green } else { Color::Red }),
        ]);
    }
    table
}
