//! Dependency-aware table ordering
//!
//! Tables are materialized parent-first so that every foreign key can be
//! resolved against a lookup map that already exists. The foreign key relation
//! is treated as a directed graph (parent → child) and ordered level by level:
//! level 0 holds every root table in plan order, level *k* every table whose
//! parents all live in earlier levels.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::models::SchemaPlan;
use crate::validation::{SchemaPlanError, validate_plan};

/// Build the parent → child graph; node indices follow plan order
fn build_graph(plan: &SchemaPlan) -> DiGraph<&str, ()> {
    let mut graph = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

    for table in plan.tables() {
        let idx = graph.add_node(table.name.as_str());
        nodes.insert(table.name.as_str(), idx);
    }

    for table in plan.tables() {
        let child = nodes[table.name.as_str()];
        for parent in table.parent_tables() {
            if let Some(&parent_idx) = nodes.get(parent) {
                graph.add_edge(parent_idx, child, ());
            }
        }
    }

    graph
}

/// Find a foreign key cycle, returning the tables involved in plan order
///
/// A table referencing itself counts as a cycle.
pub fn find_cycle(plan: &SchemaPlan) -> Option<Vec<String>> {
    let graph = build_graph(plan);
    if toposort(&graph, None).is_ok() {
        return None;
    }

    tarjan_scc(&graph).into_iter().find_map(|mut component| {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&n| graph.contains_edge(n, n));
        if !is_cycle {
            return None;
        }
        component.sort();
        Some(component.iter().map(|&n| graph[n].to_string()).collect())
    })
}

/// Group tables into dependency levels
///
/// Every table appears in a strictly later level than each of its parents;
/// within a level tables keep plan order.
pub fn dependency_levels(plan: &SchemaPlan) -> Result<Vec<Vec<String>>, SchemaPlanError> {
    if plan.is_empty() {
        return Ok(Vec::new());
    }
    validate_plan(plan)?;

    let graph = build_graph(plan);
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();

    let mut levels = Vec::new();
    let mut current: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|n| in_degree[n.index()] == 0)
        .collect();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &node in &current {
            for child in graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[child.index()] -= 1;
                if in_degree[child.index()] == 0 {
                    next.push(child);
                }
            }
        }
        next.sort();
        next.dedup();
        levels.push(current.iter().map(|&n| graph[n].to_string()).collect());
        current = next;
    }

    Ok(levels)
}

/// Resolve the processing order of a plan
///
/// Returns an empty order for an empty plan. Fails on unknown parents and
/// cycles instead of producing a partial order.
pub fn resolve_order(plan: &SchemaPlan) -> Result<Vec<String>, SchemaPlanError> {
    let levels = dependency_levels(plan)?;
    debug!(levels = ?levels, "Resolved table dependency levels");
    Ok(levels.into_iter().flatten().collect())
}
