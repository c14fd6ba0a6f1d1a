//! Dependency-aware wave scheduling with a merge queue.
//!
//! Tickets with declared dependencies form a directed acyclic graph that is
//! executed in waves: each wave holds the tickets whose dependencies have
//! already been integrated, runs them in parallel up to a configured cap,
//! and hands the surviving branches to a strictly sequential merge queue.
//! Failures propagate as skips to every transitive dependent before the next
//! wave is computed.
//!
//! ## Components
//!
//! 1. **Builder** — parses ticket/dependency specs and validates the graph
//! 2. **Scheduler** — computes waves and tracks per-ticket status
//! 3. **Executor** — runs one wave against the external ticket processor
//! 4. **Processor** — the coordinator driving execute → integrate → propagate
//!
//! ## Example
//!
//! ```
//! use convoy::dag::{GraphBuilder, WaveScheduler, parse_deps, parse_tickets};
//!
//! # fn example() -> Result<(), convoy::errors::GraphError> {
//! let graph = GraphBuilder::new(
//!     parse_tickets("199,200,201,202,197,198")?,
//!     parse_deps("197:200,198:197")?,
//! )
//! .build()?;
//!
//! let waves = WaveScheduler::new(graph).compute_waves();
//! // Wave 0: [199, 200, 201, 202] - no dependencies
//! // Wave 1: [197] - depends on 200
//! // Wave 2: [198] - depends on 197
//! assert_eq!(waves.len(), 3);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod builder;
mod executor;
mod processor;
mod scheduler;
mod state;

pub use builder::{GraphBuilder, NodeIndex, TicketGraph, TicketId, parse_deps, parse_tickets};
pub use executor::{RunEvent, TicketProcessor, WaveExecutor, Workspace, WorkspaceProvisioner};
pub use processor::{DagProcessor, RunPhase};
pub use scheduler::{TicketNode, TicketStatus, WaveScheduler};
pub use state::{
    ExecutionTimer, FinalStatus, RunReport, ValidationRecord, WaveTiming, WorkResult,
};
