use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use iotawatt::{IoType, Sensors};

pub fn build_sensors_table(sensors: &Sensors) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table.set_header(vec!["Key", "Name", "Channel", "Value", "Unit", "Period start", "Identifier"]);
    for (key, sensor) in sensors {
        table.add_row(vec![
            Cell::new(key).fg(match sensor.io_type() {
                IoType::Input => Color::Cyan,
                IoType::Output => Color::Magenta,
            }),
            Cell::new(sensor.name()),
            Cell::new(sensor.channel).set_alignment(CellAlignment::Right),
            sensor.value.map_or_else(
                || Cell::new("N/A").add_attribute(Attribute::Dim),
                |value| Cell::new(format!("{value:.3}")),
            )
            .set_alignment(CellAlignment::Right),
            Cell::new(&sensor.unit),
            sensor.period_start.map_or_else(
                || Cell::new(""),
                |period_start| Cell::new(period_start.format("%Y-%m-%d %H:%M:%S")),
            ),
            Cell::new(sensor.identifier()).add_attribute(Attribute::Dim),
        ]);
    }
    table
}
