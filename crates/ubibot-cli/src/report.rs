use std::fmt::{self, Write as _};

use anyhow::Result;
use ubibot_core::{CoordinatorState, EntityCategory, SensorView};

use crate::OutputFormat;

pub fn print_state(state: &CoordinatorState, views: &[SensorView], format: OutputFormat) -> Result<()> {
    println!("{}", render(state, views, format)?);
    Ok(())
}

pub fn render(state: &CoordinatorState, views: &[SensorView], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(state)?),
        OutputFormat::Ndjson => Ok(serde_json::to_string(state)?),
        OutputFormat::Human => Ok(render_human(state, views)?),
    }
}

fn render_human(state: &CoordinatorState, views: &[SensorView]) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "=== UbiBot Snapshot ===")?;
    if let Some(view) = views.first() {
        let device = view.device();
        writeln!(out, "Device:     {} ({} {})", device.name, device.manufacturer, device.model)?;
    }
    writeln!(
        out,
        "State:      last_success={} cycles_ok={} cycles_err={}",
        state.last_success, state.cycles_ok, state.cycles_err
    )?;
    if let Some(ts) = state.last_success_at {
        writeln!(out, "Updated:    {}", ts.to_rfc3339())?;
    }
    if let Some(err) = &state.last_error {
        writeln!(out, "Error:      {err}")?;
    }

    for (title, category) in [
        ("Sensors:", EntityCategory::Primary),
        ("Diagnostics:", EntityCategory::Diagnostic),
    ] {
        writeln!(out, "{title}")?;
        for view in views.iter().filter(|v| v.description().category == category) {
            let desc = view.description();
            let rendered = match (view.native_value(state), desc.unit) {
                (Some(value), Some(unit)) => format!("{value} {unit}"),
                (Some(value), None) => value.to_string(),
                (None, _) => "unavailable".to_string(),
            };
            let marker = if view.available(state) || rendered == "unavailable" {
                ""
            } else {
                " (stale)"
            };
            writeln!(out, "  {:<22} {rendered}{marker}", desc.name)?;
        }
    }

    Ok(out.trim_end().to_string())
}
