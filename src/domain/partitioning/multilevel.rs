//! Multilevel cut adapters (METIS, KaHIP).
//!
//! The external solvers consume the workload graph in CSR form: `xadj[i]`
//! indexes the neighbour run of vertex `i` inside `adjncy`, with vertex ids
//! replaced by positions in the sorted vertex order. Marshalling is always
//! available; the METIS invocation itself sits behind the
//! `metis-partitioner` feature because it links the system libmetis. No
//! maintained KaHIP binding exists on the registry, so selecting KaHIP
//! reports the solver as unavailable and the configuration is rejected.

use crate::domain::graph::WorkloadGraph;
use crate::domain::partitioning::PartitionError;
use crate::shared::protocol::Key;
use std::collections::HashMap;

/// Compressed sparse row image of a [`WorkloadGraph`], indices in sorted
/// vertex order. Weights are clamped into `i32` for the solver ABI.
#[derive(Debug, PartialEq, Eq)]
pub struct Csr {
    pub xadj: Vec<i32>,
    pub adjncy: Vec<i32>,
    pub vertex_weights: Vec<i32>,
    pub edge_weights: Vec<i32>,
}

/// Marshals `graph` into CSR form. Neighbour runs are emitted in ascending
/// neighbour order so the image is deterministic.
pub fn marshal_csr(graph: &WorkloadGraph) -> Csr {
    let vertices = graph.sorted_vertices();
    let index_of: HashMap<Key, i32> = vertices
        .iter()
        .enumerate()
        .map(|(index, &vertex)| (vertex, index as i32))
        .collect();

    let mut xadj = Vec::with_capacity(vertices.len() + 1);
    let mut adjncy = Vec::new();
    let mut vertex_weights = Vec::with_capacity(vertices.len());
    let mut edge_weights = Vec::new();

    xadj.push(0);
    for &vertex in &vertices {
        vertex_weights.push(clamp(graph.vertex_weight(vertex)));

        let mut neighbors: Vec<(Key, u64)> = graph.neighbors(vertex).collect();
        neighbors.sort_unstable_by_key(|&(neighbor, _)| neighbor);
        for (neighbor, weight) in neighbors {
            adjncy.push(index_of[&neighbor]);
            edge_weights.push(clamp(weight));
        }
        xadj.push(adjncy.len() as i32);
    }

    Csr {
        xadj,
        adjncy,
        vertex_weights,
        edge_weights,
    }
}

fn clamp(weight: u64) -> i32 {
    weight.min(i32::MAX as u64) as i32
}

/// METIS k-way cut with the cut-minimisation objective and an imbalance
/// factor of 0.2 (ufactor 200), matching the solver defaults used upstream.
#[cfg(feature = "metis-partitioner")]
pub fn metis_cut(
    graph: &WorkloadGraph,
    n_partitions: usize,
) -> Result<Vec<usize>, PartitionError> {
    if graph.n_vertices() == 0 {
        return Ok(Vec::new());
    }

    let mut csr = marshal_csr(graph);
    let mut assignment = vec![0 as metis::Idx; graph.n_vertices()];

    metis::Graph::new(
        1,
        n_partitions as metis::Idx,
        &mut csr.xadj,
        &mut csr.adjncy,
    )
    .set_vwgt(&mut csr.vertex_weights)
    .set_adjwgt(&mut csr.edge_weights)
    .set_option(metis::option::UFactor(200))
    .part_kway(&mut assignment)
    .map_err(|error| PartitionError::Solver(error.to_string()))?;

    Ok(assignment
        .into_iter()
        .map(|partition| partition as usize)
        .collect())
}

#[cfg(not(feature = "metis-partitioner"))]
pub fn metis_cut(
    _graph: &WorkloadGraph,
    _n_partitions: usize,
) -> Result<Vec<usize>, PartitionError> {
    Err(PartitionError::SolverUnavailable("METIS"))
}

pub fn kahip_cut(
    _graph: &WorkloadGraph,
    _n_partitions: usize,
) -> Result<Vec<usize>, PartitionError> {
    Err(PartitionError::SolverUnavailable("KaHIP"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_plus_tail() -> WorkloadGraph {
        let mut graph = WorkloadGraph::new();
        for v in [10, 20, 30, 40] {
            graph.add_vertex(v, 1);
        }
        graph.inc_edge(10, 20, 2);
        graph.inc_edge(20, 30, 3);
        graph.inc_edge(10, 30, 4);
        graph.inc_edge(30, 40, 1);
        graph
    }

    #[test]
    fn test_csr_shape() {
        let graph = triangle_plus_tail();
        let csr = marshal_csr(&graph);

        // Four vertices, five xadj entries, 2*|E| directed slots.
        assert_eq!(csr.xadj.len(), 5);
        assert_eq!(csr.adjncy.len(), 8);
        assert_eq!(csr.edge_weights.len(), 8);
        assert_eq!(csr.vertex_weights, vec![1, 1, 1, 1]);
        assert_eq!(*csr.xadj.last().unwrap(), 8);
    }

    #[test]
    fn test_csr_neighbor_runs_sorted_by_index() {
        let graph = triangle_plus_tail();
        let csr = marshal_csr(&graph);

        // Vertex 10 (index 0) neighbours 20 and 30 -> indices 1, 2.
        assert_eq!(&csr.adjncy[0..2], &[1, 2]);
        assert_eq!(&csr.edge_weights[0..2], &[2, 4]);

        // Vertex 30 (index 2) neighbours 10, 20, 40 -> indices 0, 1, 3.
        let run = csr.xadj[2] as usize..csr.xadj[3] as usize;
        assert_eq!(&csr.adjncy[run.clone()], &[0, 1, 3]);
        assert_eq!(&csr.edge_weights[run], &[4, 3, 1]);
    }

    #[test]
    fn test_csr_is_deterministic() {
        let graph = triangle_plus_tail();
        assert_eq!(marshal_csr(&graph), marshal_csr(&graph));
    }

    #[cfg(not(feature = "metis-partitioner"))]
    #[test]
    fn test_solvers_report_unavailable_when_not_compiled() {
        let graph = triangle_plus_tail();
        assert!(matches!(
            metis_cut(&graph, 2),
            Err(PartitionError::SolverUnavailable("METIS"))
        ));
        assert!(matches!(
            kahip_cut(&graph, 2),
            Err(PartitionError::SolverUnavailable("KaHIP"))
        ));
    }
}
