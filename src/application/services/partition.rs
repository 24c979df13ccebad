//! Partition worker: one serial queue and one execution thread per
//! partition.
//!
//! The scheduler is the only producer and the worker thread the only
//! consumer, so a bounded crossbeam channel carries the whole contract:
//! enqueue order is execution order, a full queue applies backpressure to
//! admission, and dropping the sender is the shutdown signal: the worker
//! drains what is already queued and exits.
//!
//! Rendezvous commands travel in-band with requests. That is load-bearing:
//! the cross-partition isolation argument relies on barriers keeping their
//! FIFO position relative to the data messages around them.

use crate::domain::storage::Storage;
use crate::infrastructure::network::ReplySink;
use crate::shared::metrics::METRICS;
use crate::shared::protocol::{ClientMessage, Key, ReplyMessage, RequestType};
use crate::shared::sync::Rendezvous;
use crate::shared::timestamp;
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Queue entries consumed by the worker thread.
pub enum Command {
    /// Execute one request against storage and reply.
    Request(ClientMessage),
    /// Rendezvous once with the other participants, then continue.
    Barrier(Rendezvous),
    /// Park: rendezvous at `enter`, stay blocked until `exit` completes.
    Fence { enter: Rendezvous, exit: Rendezvous },
}

/// Scheduler-side handle for one partition: the send half of the queue, the
/// membership bookkeeping, and the worker thread handle.
///
/// Membership is only ever touched by the scheduler thread; the counters are
/// shared with the worker.
pub struct Partition {
    id: usize,
    label: String,
    tx: Sender<Command>,
    members: HashSet<Key>,
    total_weight: u64,
    executed: Arc<AtomicU64>,
    timestamps: Arc<Mutex<Vec<(i32, u64)>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Partition {
    /// Spawns the worker thread and returns the handle.
    pub fn spawn(
        id: usize,
        queue_capacity: usize,
        print_percentage: u32,
        storage: Arc<Storage>,
        reply_sink: Arc<dyn ReplySink>,
    ) -> Self {
        let (tx, rx) = bounded(queue_capacity);
        let executed = Arc::new(AtomicU64::new(0));
        let timestamps = Arc::new(Mutex::new(Vec::new()));

        let worker = PartitionWorker {
            id,
            rx,
            storage,
            reply_sink,
            executed: Arc::clone(&executed),
            timestamps: Arc::clone(&timestamps),
            print_percentage,
            partition_label: id.to_string(),
        };
        let handle = thread::Builder::new()
            .name(format!("partition-{id}"))
            .spawn(move || worker.run())
            .expect("failed to spawn partition worker thread");

        Self {
            id,
            label: id.to_string(),
            tx,
            members: HashSet::new(),
            total_weight: 0,
            executed,
            timestamps,
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Enqueues a command. Blocks only when the queue is at capacity.
    pub fn push(&self, command: Command) {
        // The worker outlives every push while the handle is held, so a send
        // can only fail after shutdown started; nothing to do then.
        let _ = self.tx.send(command);
        METRICS
            .queue_depth
            .with_label_values(&[self.label.as_str()])
            .set(self.tx.len() as f64);
    }

    /// Adds a key to this partition's membership.
    pub fn insert_key(&mut self, key: Key, weight: u64) {
        if self.members.insert(key) {
            self.total_weight += weight;
        }
    }

    /// Replaces the whole membership set, as done when a new key map is
    /// installed.
    pub fn replace_members(&mut self, members: HashSet<Key>, total_weight: u64) {
        self.members = members;
        self.total_weight = total_weight;
    }

    pub fn members(&self) -> &HashSet<Key> {
        &self.members
    }

    pub fn weight(&self) -> u64 {
        self.total_weight
    }

    pub fn executed_count(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Closes the queue, waits for the worker to drain it, and returns the
    /// recorded `(request id, completion timestamp)` samples.
    pub fn shutdown(self) -> Vec<(i32, u64)> {
        let Partition {
            tx,
            timestamps,
            mut handle,
            id,
            ..
        } = self;
        drop(tx);
        if let Some(handle) = handle.take() {
            if handle.join().is_err() {
                tracing::error!(partition = id, "worker thread panicked");
            }
        }
        let log = timestamps.lock();
        log.clone()
    }
}

struct PartitionWorker {
    id: usize,
    rx: Receiver<Command>,
    storage: Arc<Storage>,
    reply_sink: Arc<dyn ReplySink>,
    executed: Arc<AtomicU64>,
    timestamps: Arc<Mutex<Vec<(i32, u64)>>>,
    print_percentage: u32,
    partition_label: String,
}

impl PartitionWorker {
    fn run(mut self) {
        #[cfg(feature = "cpu-affinity")]
        {
            if let Some(core_ids) = core_affinity::get_core_ids() {
                if self.id < core_ids.len() {
                    core_affinity::set_for_current(core_ids[self.id]);
                }
            }
        }

        tracing::debug!(partition = self.id, "worker started");
        while let Ok(command) = self.rx.recv() {
            match command {
                Command::Request(request) => self.execute(request),
                Command::Barrier(rendezvous) => {
                    rendezvous.wait();
                }
                Command::Fence { enter, exit } => {
                    enter.wait();
                    exit.wait();
                }
            }
        }
        tracing::debug!(partition = self.id, "worker drained and stopped");
    }

    fn execute(&mut self, request: ClientMessage) {
        let started = Instant::now();

        let answer = match request.kind {
            RequestType::Read => self.storage.read(request.key),
            RequestType::Write => {
                self.storage.write(request.key, &request.args);
                request.args.clone()
            }
            RequestType::Scan => match request.scan_length() {
                Some(length) => {
                    let mut answer = String::new();
                    for value in self.storage.scan(request.key, length) {
                        answer.push_str(&value);
                        answer.push(',');
                    }
                    answer
                }
                None => "ERROR".to_string(),
            },
            RequestType::Error => "ERROR".to_string(),
            // SYNC never reaches a worker as a request.
            RequestType::Sync => return,
        };

        self.reply_sink.send(ReplyMessage::new(request.id, answer));

        if request.record_timestamp {
            self.timestamps
                .lock()
                .push((request.id, timestamp::cached_nanos()));
        }

        self.executed.fetch_add(1, Ordering::Relaxed);
        METRICS
            .executed_total
            .with_label_values(&[self.partition_label.as_str()])
            .inc();

        if self.print_percentage > 0
            && rand::thread_rng().gen_range(0..100) < self.print_percentage
        {
            let micros = started.elapsed().as_micros();
            METRICS
                .execution_duration
                .with_label_values(&[request.kind.label()])
                .observe(micros as f64);
            tracing::debug!(
                partition = self.id,
                id = request.id,
                kind = request.kind.label(),
                latency_us = micros as u64,
                "executed"
            );
        }
    }
}
