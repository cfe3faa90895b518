use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::schema::Schema;

/// Summary of FK graph structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkGraphSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Report for FK dependency ordering.
///
/// `order` always lists every table; `cycle` holds the members that could not
/// be resolved and were appended in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkGraphReport {
    pub summary: FkGraphSummary,
    pub order: Vec<String>,
    pub cycle: Vec<String>,
}

/// Tables ordered so FK parents come before their children.
pub fn dependency_order(schema: &Schema) -> Vec<String> {
    build_fk_graph_report(schema).order
}

/// Build a deterministic FK dependency report for a schema.
pub fn build_fk_graph_report(schema: &Schema) -> FkGraphReport {
    let graph = build_adjacency(schema);
    let nodes = graph.len();
    let edges = graph.values().map(|targets| targets.len()).sum();
    let (order, cycle) = toposort(&graph);

    let names: Vec<&String> = schema.tables.keys().collect();
    let resolve = |indices: Vec<usize>| -> Vec<String> {
        indices.into_iter().map(|idx| names[idx].clone()).collect()
    };

    FkGraphReport {
        summary: FkGraphSummary { nodes, edges },
        order: resolve(order),
        cycle: resolve(cycle),
    }
}

/// Adjacency keyed by declaration index: parent -> children.
fn build_adjacency(schema: &Schema) -> BTreeMap<usize, BTreeSet<usize>> {
    let mut graph: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();

    for (child_idx, (name, table)) in schema.tables.iter().enumerate() {
        graph.entry(child_idx).or_default();

        for fk in &table.foreign_keys {
            if fk.reference_table == *name {
                continue;
            }
            if let Some(parent_idx) = schema.tables.get_index_of(&fk.reference_table) {
                graph.entry(parent_idx).or_default().insert(child_idx);
            }
        }
    }

    graph
}

/// Kahn's algorithm with ties broken by declaration index.
fn toposort(graph: &BTreeMap<usize, BTreeSet<usize>>) -> (Vec<usize>, Vec<usize>) {
    let mut indegree: BTreeMap<usize, usize> = graph.keys().map(|node| (*node, 0)).collect();

    for targets in graph.values() {
        for target in targets {
            *indegree.entry(*target).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .filter_map(|(node, count)| (*count == 0).then_some(*node))
        .collect();

    let mut order = Vec::with_capacity(graph.len());

    while let Some(node) = ready.pop_first() {
        order.push(node);

        if let Some(targets) = graph.get(&node) {
            for target in targets {
                if let Some(count) = indegree.get_mut(target) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(*target);
                    }
                }
            }
        }
    }

    let cycle: Vec<usize> = indegree
        .into_iter()
        .filter_map(|(node, count)| (count > 0).then_some(node))
        .collect();
    order.extend(cycle.iter().copied());

    (order, cycle)
}
