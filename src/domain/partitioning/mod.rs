//! Graph-cut engines.
//!
//! Every variant consumes a quiescent [`WorkloadGraph`] and a target
//! partition count `K`, and produces an assignment vector aligned with
//! `sorted_vertices()`: entry `i` is the partition id of the `i`-th key in
//! ascending key order. Assignments are validated before they are installed;
//! an id outside `[0, K)` keeps the previous key map in place.

pub mod fennel;
pub mod multilevel;

pub use fennel::{fennel_cut, ReFennel};

use crate::domain::graph::WorkloadGraph;
use crate::shared::protocol::Key;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Cut algorithm selection, as exposed on the configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutMethod {
    RoundRobin,
    Fennel,
    ReFennel,
    Metis,
    Kahip,
}

impl CutMethod {
    pub fn label(self) -> &'static str {
        match self {
            CutMethod::RoundRobin => "round_robin",
            CutMethod::Fennel => "fennel",
            CutMethod::ReFennel => "refennel",
            CutMethod::Metis => "metis",
            CutMethod::Kahip => "kahip",
        }
    }
}

impl FromStr for CutMethod {
    type Err = PartitionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "ROUND_ROBIN" => Ok(CutMethod::RoundRobin),
            "FENNEL" => Ok(CutMethod::Fennel),
            "REFENNEL" => Ok(CutMethod::ReFennel),
            "METIS" => Ok(CutMethod::Metis),
            "KAHIP" => Ok(CutMethod::Kahip),
            other => Err(PartitionError::UnknownMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("unknown cut method: {0}")]
    UnknownMethod(String),

    #[error("solver {0} is not compiled in")]
    SolverUnavailable(&'static str),

    #[error("external solver failed: {0}")]
    Solver(String),

    #[error("assignment entry {index} is partition {partition}, outside [0, {n_partitions})")]
    InvalidAssignment {
        index: usize,
        partition: usize,
        n_partitions: usize,
    },
}

/// Runs the selected cut over `graph`. `refennel` carries the persistent
/// re-FENNEL state and is only touched by [`CutMethod::ReFennel`].
pub fn cut(
    method: CutMethod,
    graph: &WorkloadGraph,
    n_partitions: usize,
    refennel: &mut ReFennel,
) -> Result<Vec<usize>, PartitionError> {
    let assignment = match method {
        CutMethod::RoundRobin => round_robin_cut(graph.n_vertices(), n_partitions),
        CutMethod::Fennel => fennel_cut(graph, n_partitions),
        CutMethod::ReFennel => refennel.run(graph, n_partitions),
        CutMethod::Metis => multilevel::metis_cut(graph, n_partitions)?,
        CutMethod::Kahip => multilevel::kahip_cut(graph, n_partitions)?,
    };
    validate(&assignment, n_partitions)?;
    Ok(assignment)
}

/// Rejects methods whose solver is not compiled into this build, so a bad
/// configuration fails at startup instead of at the first repartition.
pub fn ensure_available(method: CutMethod) -> Result<(), PartitionError> {
    match method {
        CutMethod::Metis if cfg!(not(feature = "metis-partitioner")) => {
            Err(PartitionError::SolverUnavailable("METIS"))
        }
        CutMethod::Kahip => Err(PartitionError::SolverUnavailable("KaHIP")),
        _ => Ok(()),
    }
}

/// `P[i] = i mod K`. Fallback method, and the placement rule for brand-new
/// keys before any graph data exists.
pub fn round_robin_cut(n_vertices: usize, n_partitions: usize) -> Vec<usize> {
    (0..n_vertices).map(|i| i % n_partitions).collect()
}

/// Checks the behavioural contract shared by all cut engines.
pub fn validate(assignment: &[usize], n_partitions: usize) -> Result<(), PartitionError> {
    for (index, &partition) in assignment.iter().enumerate() {
        if partition >= n_partitions {
            return Err(PartitionError::InvalidAssignment {
                index,
                partition,
                n_partitions,
            });
        }
    }
    Ok(())
}

/// Total weight of edges whose endpoints land in different partitions.
pub fn edge_cut(graph: &WorkloadGraph, placement: &HashMap<Key, usize>) -> u64 {
    let mut crossing = 0;
    for u in graph.sorted_vertices() {
        for (v, weight) in graph.neighbors(u) {
            if u < v && placement.get(&u) != placement.get(&v) {
                crossing += weight;
            }
        }
    }
    crossing
}
