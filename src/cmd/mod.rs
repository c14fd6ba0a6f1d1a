//! CLI subcommand implementations.

mod plan;
mod run;

pub use plan::cmd_plan;
pub use run::{RunArgs, cmd_run};

use anyhow::Result;
use convoy::dag::{GraphBuilder, TicketGraph, parse_deps, parse_tickets};

/// Parse and validate the ticket/dependency surface syntax into a graph.
///
/// All fatal configuration errors (unknown references, cycles, malformed
/// specs) surface here, before anything runs.
pub fn build_graph(tickets: &str, deps: &str) -> Result<TicketGraph> {
    let tickets = parse_tickets(tickets)?;
    let deps = parse_deps(deps)?;
    Ok(GraphBuilder::new(tickets, deps).build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_graph_accepts_chained_dependencies() {
        let graph = build_graph("199,200,201,202,197,198", "197:200,198:197").unwrap();
        assert_eq!(graph.len(), 6);
    }

    #[test]
    fn build_graph_rejects_cycle() {
        let err = build_graph("1,2", "1:2,2:1").unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn build_graph_rejects_unknown_reference() {
        let err = build_graph("1", "1:99").unwrap_err();
        assert!(err.to_string().contains("#99"));
    }
}
