//! Pattern tracker: background consumer that folds executed requests into
//! the co-access workload graph.
//!
//! The scheduler pushes a shadow sample for every routed request; the
//! tracker thread is the graph's only writer. When the scheduler needs a
//! quiescent graph it enqueues a fence: the tracker rendezvouses, then stays
//! parked on the exit barrier while the scheduler reads. The lock around the
//! graph is uncontended in steady state precisely because of that protocol.

use crate::domain::graph::WorkloadGraph;
use crate::shared::protocol::{ClientMessage, Key, RequestType};
use crate::shared::sync::Rendezvous;
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// Shadow copy of one routed request: just enough to update the graph and
/// the per-partition access counters.
#[derive(Debug, Clone)]
pub struct AccessSample {
    pub kind: RequestType,
    pub key: Key,
    pub scan_length: usize,
    pub partitions: SmallVec<[usize; 4]>,
}

impl AccessSample {
    pub fn from_request(request: &ClientMessage, partitions: &[usize]) -> Self {
        Self {
            kind: request.kind,
            key: request.key,
            scan_length: match request.kind {
                RequestType::Scan => request.scan_length().unwrap_or(0),
                _ => 0,
            },
            partitions: partitions.iter().copied().collect(),
        }
    }

    /// The key set touched by the request: a singleton, or the scan range.
    fn key_set(&self) -> SmallVec<[Key; 8]> {
        match self.kind {
            RequestType::Scan => (0..self.scan_length)
                .map(|i| self.key.wrapping_add(i as Key))
                .collect(),
            _ => SmallVec::from_slice(&[self.key]),
        }
    }
}

enum TrackerCommand {
    Observe(AccessSample),
    /// Ensure a vertex exists without counting an access; sent when a WRITE
    /// first maps a key.
    Register(Key),
    Fence { enter: Rendezvous, exit: Rendezvous },
}

/// Handle owned by the scheduler.
pub struct PatternTracker {
    tx: Sender<TrackerCommand>,
    graph: Arc<RwLock<WorkloadGraph>>,
    access_counts: Arc<Vec<AtomicU64>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PatternTracker {
    pub fn spawn(n_partitions: usize) -> Self {
        let (tx, rx) = unbounded();
        let graph = Arc::new(RwLock::new(WorkloadGraph::new()));
        let access_counts: Arc<Vec<AtomicU64>> =
            Arc::new((0..n_partitions).map(|_| AtomicU64::new(0)).collect());

        let worker = TrackerWorker {
            rx,
            graph: Arc::clone(&graph),
            access_counts: Arc::clone(&access_counts),
        };
        let handle = thread::Builder::new()
            .name("tracker".to_string())
            .spawn(move || worker.run())
            .expect("failed to spawn pattern tracker thread");

        Self {
            tx,
            graph,
            access_counts,
            handle: Some(handle),
        }
    }

    pub fn observe(&self, sample: AccessSample) {
        let _ = self.tx.send(TrackerCommand::Observe(sample));
    }

    pub fn register(&self, key: Key) {
        let _ = self.tx.send(TrackerCommand::Register(key));
    }

    /// Enqueues a fence. The caller must wait on `enter` itself; once that
    /// rendezvous completes the graph is quiescent until `exit` completes.
    pub fn fence(&self, enter: Rendezvous, exit: Rendezvous) {
        let _ = self.tx.send(TrackerCommand::Fence { enter, exit });
    }

    /// Shared graph handle. Read it only between fence enter and exit.
    pub fn graph(&self) -> Arc<RwLock<WorkloadGraph>> {
        Arc::clone(&self.graph)
    }

    /// Accesses attributed to `partition` so far.
    pub fn access_count(&self, partition: usize) -> u64 {
        self.access_counts
            .get(partition)
            .map(|count| count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Closes the queue and waits for the pending samples to be folded in.
    pub fn shutdown(self) {
        let PatternTracker { tx, mut handle, .. } = self;
        drop(tx);
        if let Some(handle) = handle.take() {
            if handle.join().is_err() {
                tracing::error!("pattern tracker thread panicked");
            }
        }
    }
}

struct TrackerWorker {
    rx: Receiver<TrackerCommand>,
    graph: Arc<RwLock<WorkloadGraph>>,
    access_counts: Arc<Vec<AtomicU64>>,
}

impl TrackerWorker {
    fn run(self) {
        while let Ok(command) = self.rx.recv() {
            match command {
                TrackerCommand::Observe(sample) => self.update(sample),
                TrackerCommand::Register(key) => {
                    self.graph.write().add_vertex(key, 0);
                }
                TrackerCommand::Fence { enter, exit } => {
                    enter.wait();
                    exit.wait();
                }
            }
        }
    }

    fn update(&self, sample: AccessSample) {
        let keys = sample.key_set();

        {
            let mut graph = self.graph.write();
            for (i, &key) in keys.iter().enumerate() {
                graph.inc_vertex(key, 1);
                for &other in &keys[i + 1..] {
                    graph.inc_edge(key, other, 1);
                }
            }
        }

        for &partition in &sample.partitions {
            if let Some(count) = self.access_counts.get(partition) {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
