//! Ticket graph construction from ticket lists and dependency specs.
//!
//! The builder parses the surface syntax (`--tickets "197,198"`,
//! `--deps "197:200,198:197"`), validates that every dependency references a
//! ticket in the set, and rejects cyclic graphs before any scheduling
//! happens. A cycle is a configuration error, not a runtime condition.

use crate::errors::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Opaque ticket identifier (an issue or work-item number).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TicketId {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

impl FromStr for TicketId {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        token
            .parse::<u64>()
            .map(TicketId)
            .map_err(|_| GraphError::InvalidTicketId {
                token: token.to_string(),
            })
    }
}

/// Index into the graph's node list.
pub type NodeIndex = usize;

/// Parse a comma-separated ticket list, e.g. `"197,198,199"`.
pub fn parse_tickets(spec: &str) -> Result<Vec<TicketId>, GraphError> {
    let mut tickets = Vec::new();
    for token in spec.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        tickets.push(token.parse()?);
    }
    Ok(tickets)
}

/// Parse a dependency spec into `{ticket: [depends_on]}`.
///
/// Format: `"197:200,198:197"` means 197 depends on 200 and 198 depends on
/// 197. A pair without a colon is rejected rather than ignored; a typo here
/// would otherwise silently drop an edge.
pub fn parse_deps(spec: &str) -> Result<HashMap<TicketId, Vec<TicketId>>, GraphError> {
    let mut deps: HashMap<TicketId, Vec<TicketId>> = HashMap::new();
    for pair in spec.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (child, parent) =
            pair.split_once(':')
                .ok_or_else(|| GraphError::InvalidDependencyPair {
                    pair: pair.to_string(),
                })?;
        let child: TicketId = child.parse()?;
        let parent: TicketId = parent.parse()?;
        deps.entry(child).or_default().push(parent);
    }
    Ok(deps)
}

/// A validated directed acyclic graph of tickets.
///
/// Nodes are stored in ascending ticket-id order, so node index order doubles
/// as the deterministic tie-break for wave and merge ordering. Dependent
/// edges are kept alongside dependency edges so skip propagation never has to
/// re-scan the whole graph.
#[derive(Debug, Clone)]
pub struct TicketGraph {
    tickets: Vec<TicketId>,
    index_map: HashMap<TicketId, NodeIndex>,
    /// index -> tickets it depends on
    dependencies: Vec<Vec<NodeIndex>>,
    /// index -> tickets that depend on it
    dependents: Vec<Vec<NodeIndex>>,
}

impl TicketGraph {
    /// Number of tickets in the graph.
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Ticket id at the given index.
    pub fn ticket(&self, index: NodeIndex) -> TicketId {
        self.tickets[index]
    }

    /// All ticket ids, ascending.
    pub fn tickets(&self) -> &[TicketId] {
        &self.tickets
    }

    /// Index for a ticket id.
    pub fn index_of(&self, id: TicketId) -> Option<NodeIndex> {
        self.index_map.get(&id).copied()
    }

    /// Tickets the given ticket depends on.
    pub fn dependencies(&self, index: NodeIndex) -> &[NodeIndex] {
        self.dependencies.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Tickets that depend on the given ticket.
    pub fn dependents(&self, index: NodeIndex) -> &[NodeIndex] {
        self.dependents.get(index).map_or(&[], |v| v.as_slice())
    }
}

/// Builder validating tickets + dependency map into a `TicketGraph`.
pub struct GraphBuilder {
    tickets: Vec<TicketId>,
    deps: HashMap<TicketId, Vec<TicketId>>,
}

impl GraphBuilder {
    pub fn new(tickets: Vec<TicketId>, deps: HashMap<TicketId, Vec<TicketId>>) -> Self {
        Self { tickets, deps }
    }

    /// Build the graph.
    ///
    /// Validates that every dependency-spec identifier (keys and values) is a
    /// member of the ticket set and that the graph is acyclic.
    pub fn build(self) -> Result<TicketGraph, GraphError> {
        let mut tickets = self.tickets;
        tickets.sort_unstable();

        let mut index_map = HashMap::with_capacity(tickets.len());
        for (i, &id) in tickets.iter().enumerate() {
            if index_map.insert(id, i).is_some() {
                return Err(GraphError::DuplicateTicket { ticket: id });
            }
        }

        let mut dependencies: Vec<Vec<NodeIndex>> = vec![Vec::new(); tickets.len()];
        let mut dependents: Vec<Vec<NodeIndex>> = vec![Vec::new(); tickets.len()];

        for (&child, parents) in &self.deps {
            let Some(&child_idx) = index_map.get(&child) else {
                return Err(GraphError::UnknownTicket { ticket: child });
            };
            for &parent in parents {
                let Some(&parent_idx) = index_map.get(&parent) else {
                    return Err(GraphError::UnknownTicketReference {
                        ticket: child,
                        dependency: parent,
                    });
                };
                dependencies[child_idx].push(parent_idx);
                dependents[parent_idx].push(child_idx);
            }
        }

        // Deterministic adjacency order; also collapses duplicate edges.
        for list in dependencies.iter_mut().chain(dependents.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }

        let graph = TicketGraph {
            tickets,
            index_map,
            dependencies,
            dependents,
        };

        detect_cycle(&graph)?;

        Ok(graph)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first cycle detection with a three-color mark.
///
/// A dependency edge back into an in-progress node is a cycle; the error
/// carries the members taken from the current visit stack. A self-dependency
/// is a one-node cycle.
fn detect_cycle(graph: &TicketGraph) -> Result<(), GraphError> {
    let mut marks = vec![Mark::Unvisited; graph.len()];
    let mut stack: Vec<NodeIndex> = Vec::new();

    for start in 0..graph.len() {
        if marks[start] == Mark::Unvisited {
            visit(graph, start, &mut marks, &mut stack)?;
        }
    }
    Ok(())
}

fn visit(
    graph: &TicketGraph,
    index: NodeIndex,
    marks: &mut [Mark],
    stack: &mut Vec<NodeIndex>,
) -> Result<(), GraphError> {
    marks[index] = Mark::InProgress;
    stack.push(index);

    for &dep in graph.dependencies(index) {
        match marks[dep] {
            Mark::Done => {}
            Mark::InProgress => {
                let pos = stack.iter().position(|&n| n == dep).unwrap_or(0);
                let members = stack[pos..].iter().map(|&n| graph.ticket(n)).collect();
                return Err(GraphError::CyclicDependency { members });
            }
            Mark::Unvisited => visit(graph, dep, marks, stack)?,
        }
    }

    stack.pop();
    marks[index] = Mark::Done;
    Ok(())
}
