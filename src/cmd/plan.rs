//! Wave plan preview — `convoy plan`.

use anyhow::Result;
use convoy::dag::WaveScheduler;

/// Print the wave execution plan without running anything.
pub fn cmd_plan(tickets: &str, deps: &str, json: bool) -> Result<()> {
    let graph = super::build_graph(tickets, deps)?;
    let scheduler = WaveScheduler::new(graph);
    let waves = scheduler.compute_waves();

    if json {
        let value = serde_json::json!({
            "tickets": scheduler.ticket_count(),
            "waves": waves,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!(
        "Plan: {} tickets in {} waves",
        scheduler.ticket_count(),
        waves.len()
    );
    for (i, wave) in waves.iter().enumerate() {
        let ids = wave
            .iter()
            .map(|t| format!("#{t}"))
            .collect::<Vec<_>>()
            .join(", ");
        let parallel = if wave.len() > 1 { " (parallel)" } else { "" };
        println!("  wave {i}: [{ids}]{parallel}");
    }
    Ok(())
}
