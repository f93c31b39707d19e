//! Topological leveling of a workflow graph

use std::collections::{HashMap, HashSet};

use crate::errors::RoboflowError;

/// Groups nodes into dependency levels
///
/// Every node in a level depends only on nodes in earlier levels. Levels are
/// sorted for a stable order. Edges to unknown nodes are ignored.
pub fn topological_levels(
    nodes: &[String],
    edges: &[(String, String)],
) -> Result<Vec<Vec<String>>, RoboflowError> {
    let known: HashSet<&str> = nodes.iter().map(String::as_str).collect();
    let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|n| (n.as_str(), 0)).collect();
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut seen_edges = HashSet::new();

    for (source, target) in edges {
        let (source, target) = (source.as_str(), target.as_str());
        if !known.contains(source) || !known.contains(target) {
            continue;
        }
        if !seen_edges.insert((source, target)) {
            continue;
        }
        children.entry(source).or_default().push(target);
        if let Some(degree) = in_degree.get_mut(target) {
            *degree += 1;
        }
    }

    let mut current: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut levels = Vec::new();
    let mut placed = 0;

    while !current.is_empty() {
        current.sort_unstable();
        placed += current.len();

        let mut next = Vec::new();
        for id in &current {
            for child in children.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(*child);
                    }
                }
            }
        }

        levels.push(current.iter().map(|id| id.to_string()).collect());
        current = next;
    }

    if placed != known.len() {
        return Err(RoboflowError::ValidationError(
            "workflow graph contains a cycle".to_string(),
        ));
    }

    Ok(levels)
}
