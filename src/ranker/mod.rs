//! Ranker (§4.10): batch PageRank over the link graph. Reads PageNodes and
//! LinkEdges from the state store, runs power iteration with dangling-node
//! redistribution, and writes scores back.

use crate::storage::{IngestionStore, PageNode, SqliteStorage, StorageError};
use std::collections::HashMap;

pub const DEFAULT_DAMPING: f64 = 0.85;
pub const DEFAULT_CONVERGENCE_EPSILON: f64 = 1e-4;
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

pub struct RankerConfig {
    pub damping: f64,
    pub convergence_epsilon: f64,
    pub max_iterations: u32,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            damping: DEFAULT_DAMPING,
            convergence_epsilon: DEFAULT_CONVERGENCE_EPSILON,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

pub struct RankerReport {
    pub iterations_run: u32,
    pub converged: bool,
    pub node_count: usize,
}

/// Runs power-iteration PageRank over the full link graph and persists the
/// resulting scores. The graph is held as an in-memory adjacency list,
/// which the specification permits for N up to ~10^6 with modest fan-out.
pub fn run(storage: &mut SqliteStorage, config: &RankerConfig) -> Result<RankerReport, StorageError> {
    let nodes = storage.all_page_nodes()?;
    let edges = storage.all_link_edges()?;

    let n = nodes.len();
    if n == 0 {
        return Ok(RankerReport {
            iterations_run: 0,
            converged: true,
            node_count: 0,
        });
    }

    let index_of: HashMap<i64, usize> = nodes.iter().enumerate().map(|(i, node)| (node.id, i)).collect();

    let mut outdeg = vec![0u32; n];
    let mut inbound: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (source_id, target_id) in &edges {
        if let (Some(&s), Some(&t)) = (index_of.get(source_id), index_of.get(target_id)) {
            outdeg[s] += 1;
            inbound[t].push(s);
        }
    }

    let mut pr = vec![1.0 / n as f64; n];
    let d = config.damping;
    let mut iterations_run = 0;
    let mut converged = false;

    for _ in 0..config.max_iterations {
        iterations_run += 1;
        let dangling_sum: f64 = (0..n).filter(|&i| outdeg[i] == 0).map(|i| pr[i]).sum();
        let dangling_term = d * dangling_sum / n as f64;

        let mut next = vec![0.0; n];
        for v in 0..n {
            let mut inbound_sum = 0.0;
            for &u in &inbound[v] {
                inbound_sum += pr[u] / outdeg[u] as f64;
            }
            next[v] = (1.0 - d) / n as f64 + d * inbound_sum + dangling_term;
        }

        let l1_delta: f64 = (0..n).map(|i| (next[i] - pr[i]).abs()).sum();
        pr = next;

        if l1_delta < config.convergence_epsilon {
            converged = true;
            break;
        }
    }

    let max_score = pr.iter().cloned().fold(0.0_f64, f64::max);
    if max_score > 0.0 {
        for score in &mut pr {
            *score /= max_score;
        }
    }

    for (i, node) in nodes.iter().enumerate() {
        storage.update_pagerank(node.id, pr[i], node.pagerank_score)?;
    }

    Ok(RankerReport {
        iterations_run,
        converged,
        node_count: n,
    })
}

/// Top-N nodes by current PageRank score, for the admin surface's
/// "PageRank stats" operation (§6).
pub fn top_n(storage: &SqliteStorage, n: usize) -> Result<Vec<PageNode>, StorageError> {
    let mut nodes = storage.all_page_nodes()?;
    nodes.sort_by(|a, b| b.pagerank_score.partial_cmp(&a.pagerank_score).unwrap());
    nodes.truncate(n);
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_triangle(storage: &mut SqliteStorage) -> (i64, i64, i64) {
        let a = storage.insert_or_get_page_node("https://a.com/", "hash-a").unwrap();
        let b = storage.insert_or_get_page_node("https://b.com/", "hash-b").unwrap();
        let c = storage.insert_or_get_page_node("https://c.com/", "hash-c").unwrap();
        storage.insert_link_edge(a, b, None).unwrap();
        storage.insert_link_edge(a, c, None).unwrap();
        storage.insert_link_edge(b, c, None).unwrap();
        (a, b, c)
    }

    #[test]
    fn test_pagerank_orders_c_above_b_above_a() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (a, b, c) = seed_triangle(&mut storage);
        run(&mut storage, &RankerConfig::default()).unwrap();

        let nodes = storage.all_page_nodes().unwrap();
        let score_of = |id: i64| nodes.iter().find(|n| n.id == id).unwrap().pagerank_score;

        assert!(score_of(c) > score_of(b));
        assert!(score_of(b) > score_of(a));
    }

    #[test]
    fn test_pagerank_normalizes_max_to_one() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed_triangle(&mut storage);
        run(&mut storage, &RankerConfig::default()).unwrap();

        let nodes = storage.all_page_nodes().unwrap();
        let max = nodes.iter().map(|n| n.pagerank_score).fold(0.0_f64, f64::max);
        assert!((max - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pagerank_is_idempotent_on_rerun() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        seed_triangle(&mut storage);
        run(&mut storage, &RankerConfig::default()).unwrap();
        let first: Vec<f64> = storage
            .all_page_nodes()
            .unwrap()
            .iter()
            .map(|n| n.pagerank_score)
            .collect();

        run(&mut storage, &RankerConfig::default()).unwrap();
        let second: Vec<f64> = storage
            .all_page_nodes()
            .unwrap()
            .iter()
            .map(|n| n.pagerank_score)
            .collect();

        for (a, b) in first.iter().zip(second.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_empty_graph_converges_immediately() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let report = run(&mut storage, &RankerConfig::default()).unwrap();
        assert_eq!(report.node_count, 0);
        assert!(report.converged);
    }
}
