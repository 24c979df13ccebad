//! Scheduler: the front door of the partitioned store.
//!
//! Consumes the upstream-ordered request stream, maps keys to partitions,
//! wraps multi-partition requests in barrier pairs, feeds the pattern
//! tracker, and periodically re-cuts the key space and swaps the key map.
//!
//! Ordering argument, in short: the scheduler thread is the single producer
//! for every partition queue and for the tracker queue, and every control
//! message (barrier, fence) travels in-band through those queues. Whatever
//! was admitted before a barrier sits before it in FIFO order on every
//! involved partition, so by the time a fence's entry rendezvous completes,
//! all earlier work on all partitions has fully executed.

use crate::application::services::partition::{Command, Partition};
use crate::application::services::pattern_tracker::{AccessSample, PatternTracker};
use crate::domain::partitioning::{self, CutMethod, PartitionError, ReFennel};
use crate::domain::storage::Storage;
use crate::infrastructure::network::ReplySink;
use crate::shared::metrics::METRICS;
use crate::shared::protocol::{ClientMessage, Key, RequestType};
use crate::shared::sync::Rendezvous;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("partition count must be at least 1")]
    NoPartitions,

    #[error(transparent)]
    Partitioner(#[from] PartitionError),
}

/// Scheduler construction knobs. `n_partitions` is the only mandatory piece;
/// the rest defaults to a disabled repartitioner and quiet workers.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub n_partitions: usize,
    pub cut_method: CutMethod,
    /// Admitted requests between repartitions; 0 disables the feature.
    pub repartition_interval: u64,
    pub queue_capacity: usize,
    /// Sampling rate for per-request latency logs, in percent.
    pub print_percentage: u32,
}

impl SchedulerConfig {
    pub fn new(n_partitions: usize) -> Self {
        Self {
            n_partitions,
            cut_method: CutMethod::RoundRobin,
            repartition_interval: 0,
            queue_capacity: 10_000,
            print_percentage: 0,
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    partitions: Vec<Partition>,
    /// Key -> partition id. Readers lock per lookup; the repartition install
    /// replaces the contents wholesale under the write lock.
    key_map: Arc<RwLock<HashMap<Key, usize>>>,
    rr_cursor: usize,
    dispatched_counter: u64,
    sync_counter: u64,
    refennel: ReFennel,
    tracker: PatternTracker,
    /// Reusable fence pair parking the tracker during a repartition.
    tracker_fence: (Rendezvous, Rendezvous),
    /// Reusable fence pair quiescing all workers for the key map install.
    worker_fence: (Rendezvous, Rendezvous),
    storage: Arc<Storage>,
}

impl Scheduler {
    /// Builds the scheduler and spawns its partition workers and tracker.
    pub fn new(
        config: SchedulerConfig,
        reply_sink: Arc<dyn ReplySink>,
    ) -> Result<Self, SchedulerError> {
        if config.n_partitions == 0 {
            return Err(SchedulerError::NoPartitions);
        }
        partitioning::ensure_available(config.cut_method)?;

        let storage = Arc::new(Storage::new());
        let partitions = (0..config.n_partitions)
            .map(|id| {
                Partition::spawn(
                    id,
                    config.queue_capacity,
                    config.print_percentage,
                    Arc::clone(&storage),
                    Arc::clone(&reply_sink),
                )
            })
            .collect();

        let tracker = PatternTracker::spawn(config.n_partitions);
        let worker_parties = config.n_partitions + 1;

        tracing::info!(
            partitions = config.n_partitions,
            method = config.cut_method.label(),
            interval = config.repartition_interval,
            "scheduler started"
        );

        Ok(Self {
            partitions,
            key_map: Arc::new(RwLock::new(HashMap::new())),
            rr_cursor: 0,
            dispatched_counter: 0,
            sync_counter: 0,
            refennel: ReFennel::new(),
            tracker,
            tracker_fence: (Rendezvous::new(2), Rendezvous::new(2)),
            worker_fence: (
                Rendezvous::new(worker_parties),
                Rendezvous::new(worker_parties),
            ),
            storage,
            config,
        })
    }

    /// Admits one upstream-ordered request: routes it, wraps it in barriers
    /// when it spans partitions, shadows it to the tracker, and triggers the
    /// repartition sequence on the configured cadence.
    pub fn schedule_and_answer(&mut self, mut request: ClientMessage) {
        // SYNC is internal; one arriving from upstream is dropped.
        if request.kind == RequestType::Sync {
            return;
        }
        METRICS
            .requests_total
            .with_label_values(&[request.kind.label()])
            .inc();

        // First WRITE to an unknown key claims a partition round-robin and
        // registers the vertex before the access itself is shadowed.
        if request.kind == RequestType::Write && !self.key_map.read().contains_key(&request.key) {
            let partition = self.rr_cursor;
            self.key_map.write().insert(request.key, partition);
            self.partitions[partition].insert_key(request.key, 0);
            self.rr_cursor = (self.rr_cursor + 1) % self.config.n_partitions;
            self.tracker.register(request.key);
        }

        let involved = self.involved_partitions(&request);
        match involved.as_slice() {
            [] => {
                // Unroutable: some referenced key has never been written.
                METRICS
                    .routing_errors_total
                    .with_label_values(&[request.kind.label()])
                    .inc();
                request.kind = RequestType::Error;
                self.partitions[0].push(Command::Request(request));
            }
            [partition] => {
                let sample = AccessSample::from_request(&request, &involved);
                self.partitions[*partition].push(Command::Request(request));
                self.tracker.observe(sample);
            }
            _ => {
                METRICS
                    .multi_partition_total
                    .with_label_values(&[request.kind.label()])
                    .inc();
                let sample = AccessSample::from_request(&request, &involved);
                self.isolate_and_execute(request, &involved);
                self.tracker.observe(sample);
            }
        }

        self.dispatched_counter += 1;
        let interval = self.config.repartition_interval;
        if interval > 0 && self.dispatched_counter % interval == 0 {
            self.repartition();
        }
    }

    /// Cross-partition protocol: every involved worker rendezvouses before
    /// and after the request, and the lowest-id partition executes it. While
    /// the others are between the two barriers they execute nothing else, so
    /// the request holds exclusive access to every involved partition.
    fn isolate_and_execute(&mut self, request: ClientMessage, involved: &[usize]) {
        let entry = Rendezvous::new(involved.len());
        for &partition in involved {
            self.partitions[partition].push(Command::Barrier(entry.clone()));
        }

        // `involved` is sorted, so the executing partition is deterministic.
        self.partitions[involved[0]].push(Command::Request(request));

        let exit = Rendezvous::new(involved.len());
        for &partition in involved {
            self.partitions[partition].push(Command::Barrier(exit.clone()));
        }
        self.sync_counter += 2;
    }

    /// Partitions owning any key the request touches, ascending. Empty when
    /// any referenced key is unmapped.
    fn involved_partitions(&self, request: &ClientMessage) -> SmallVec<[usize; 4]> {
        let key_map = self.key_map.read();
        let mut involved: SmallVec<[usize; 4]> = SmallVec::new();

        match request.kind {
            RequestType::Read | RequestType::Write => {
                if let Some(&partition) = key_map.get(&request.key) {
                    involved.push(partition);
                }
            }
            RequestType::Scan => {
                let Some(length) = request.scan_length() else {
                    return SmallVec::new();
                };
                for i in 0..length {
                    let key = request.key.wrapping_add(i as Key);
                    match key_map.get(&key) {
                        Some(&partition) => {
                            if !involved.contains(&partition) {
                                involved.push(partition);
                            }
                        }
                        None => return SmallVec::new(),
                    }
                }
            }
            RequestType::Error | RequestType::Sync => {}
        }

        involved.sort_unstable();
        involved
    }

    /// Repartition sequence: park the tracker, cut the quiescent graph,
    /// quiesce the workers, swap the key map, release everyone. A failed cut
    /// keeps the current map and only logs.
    fn repartition(&mut self) {
        let method = self.config.cut_method;
        let n_partitions = self.config.n_partitions;
        tracing::info!(method = method.label(), "repartition started");

        let (tracker_enter, tracker_exit) = self.tracker_fence.clone();
        self.tracker.fence(tracker_enter.clone(), tracker_exit.clone());
        tracker_enter.wait();
        // The tracker is parked on the exit rendezvous: the graph is
        // quiescent from here until `tracker_exit.wait()`.

        let outcome = {
            let graph = self.tracker.graph();
            let graph = graph.read();
            partitioning::cut(method, &graph, n_partitions, &mut self.refennel).map(
                |assignment| {
                    let mut new_map = HashMap::with_capacity(assignment.len());
                    let mut members: Vec<HashSet<Key>> =
                        vec![HashSet::new(); n_partitions];
                    let mut weights = vec![0u64; n_partitions];

                    for (vertex, &partition) in
                        graph.sorted_vertices().iter().zip(assignment.iter())
                    {
                        new_map.insert(*vertex, partition);
                        members[partition].insert(*vertex);
                        weights[partition] += graph.vertex_weight(*vertex);
                    }

                    let cut_weight = partitioning::edge_cut(&graph, &new_map);
                    (new_map, members, weights, cut_weight)
                },
            )
        };

        match outcome {
            Ok((new_map, members, weights, cut_weight)) => {
                let (worker_enter, worker_exit) = self.worker_fence.clone();
                for partition in &self.partitions {
                    partition.push(Command::Fence {
                        enter: worker_enter.clone(),
                        exit: worker_exit.clone(),
                    });
                }
                self.sync_counter += 2;
                // Entry completes only after every worker drained all work
                // admitted before the fence; nothing is mid-request now.
                worker_enter.wait();

                let mapped_keys = new_map.len();
                *self.key_map.write() = new_map;
                for ((partition, members), weight) in self
                    .partitions
                    .iter_mut()
                    .zip(members.into_iter())
                    .zip(weights.into_iter())
                {
                    let label = partition.id().to_string();
                    METRICS
                        .partition_members
                        .with_label_values(&[label.as_str()])
                        .set(members.len() as f64);
                    partition.replace_members(members, weight);
                }

                worker_exit.wait();

                METRICS.edge_cut.set(cut_weight as f64);
                METRICS
                    .repartitions_total
                    .with_label_values(&[method.label(), "installed"])
                    .inc();
                tracing::info!(
                    method = method.label(),
                    keys = mapped_keys,
                    edge_cut = cut_weight,
                    "repartition installed"
                );
            }
            Err(error) => {
                METRICS
                    .repartitions_total
                    .with_label_values(&[method.label(), "failed"])
                    .inc();
                tracing::warn!(
                    method = method.label(),
                    %error,
                    "repartition failed; keeping current key map"
                );
            }
        }

        tracker_exit.wait();
    }

    pub fn n_partitions(&self) -> usize {
        self.config.n_partitions
    }

    pub fn dispatched_count(&self) -> u64 {
        self.dispatched_counter
    }

    pub fn sync_count(&self) -> u64 {
        self.sync_counter
    }

    /// Snapshot of the current key map.
    pub fn key_map(&self) -> HashMap<Key, usize> {
        self.key_map.read().clone()
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn storage(&self) -> Arc<Storage> {
        Arc::clone(&self.storage)
    }

    pub fn tracker(&self) -> &PatternTracker {
        &self.tracker
    }

    /// Drains every queue, stops all threads, and returns each partition's
    /// timestamp log.
    pub fn shutdown(self) -> Vec<Vec<(i32, u64)>> {
        let Scheduler {
            partitions,
            tracker,
            ..
        } = self;

        let logs = partitions
            .into_iter()
            .map(|partition| partition.shutdown())
            .collect();
        tracker.shutdown();
        tracing::info!("scheduler stopped");
        logs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::ChannelReplySink;
    use crate::shared::protocol::ReplyMessage;
    use crossbeam::channel::Receiver;
    use std::time::Duration;

    fn scheduler_with(
        n_partitions: usize,
        method: CutMethod,
        interval: u64,
    ) -> (Scheduler, Receiver<ReplyMessage>) {
        let (sink, rx) = ChannelReplySink::new();
        let mut config = SchedulerConfig::new(n_partitions);
        config.cut_method = method;
        config.repartition_interval = interval;
        let scheduler = Scheduler::new(config, Arc::new(sink)).unwrap();
        (scheduler, rx)
    }

    fn collect_replies(rx: &Receiver<ReplyMessage>, n: usize) -> Vec<ReplyMessage> {
        let mut replies: Vec<ReplyMessage> = (0..n)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        replies.sort_by_key(|reply| reply.id);
        replies
    }

    #[test]
    fn test_rejects_zero_partitions() {
        let (sink, _rx) = ChannelReplySink::new();
        let config = SchedulerConfig::new(0);
        assert!(matches!(
            Scheduler::new(config, Arc::new(sink)),
            Err(SchedulerError::NoPartitions)
        ));
    }

    #[test]
    fn test_rejects_unavailable_solver() {
        let (sink, _rx) = ChannelReplySink::new();
        let mut config = SchedulerConfig::new(2);
        config.cut_method = CutMethod::Kahip;
        assert!(matches!(
            Scheduler::new(config, Arc::new(sink)),
            Err(SchedulerError::Partitioner(
                PartitionError::SolverUnavailable("KaHIP")
            ))
        ));
    }

    /// Round-robin placement and per-key read-your-writes across two
    /// partitions.
    #[test]
    fn test_single_key_round_robin_scenario() {
        let (mut scheduler, rx) = scheduler_with(2, CutMethod::RoundRobin, 0);

        scheduler.schedule_and_answer(ClientMessage::new(0, RequestType::Write, 1, "a"));
        scheduler.schedule_and_answer(ClientMessage::new(1, RequestType::Write, 2, "b"));
        scheduler.schedule_and_answer(ClientMessage::new(2, RequestType::Read, 1, ""));
        scheduler.schedule_and_answer(ClientMessage::new(3, RequestType::Read, 2, ""));

        let answers: Vec<String> = collect_replies(&rx, 4)
            .into_iter()
            .map(|reply| reply.answer)
            .collect();
        assert_eq!(answers, vec!["a", "b", "a", "b"]);

        let key_map = scheduler.key_map();
        assert_eq!(key_map[&1], 0);
        assert_eq!(key_map[&2], 1);
        scheduler.shutdown();
    }

    /// SCAN spanning both partitions answers all values in key order.
    #[test]
    fn test_scan_across_partitions_scenario() {
        let (mut scheduler, rx) = scheduler_with(2, CutMethod::RoundRobin, 0);

        for (id, (key, value)) in [(0, "x"), (1, "y"), (2, "z"), (3, "w")]
            .into_iter()
            .enumerate()
        {
            scheduler.schedule_and_answer(ClientMessage::new(
                id as i32,
                RequestType::Write,
                key,
                value,
            ));
        }
        scheduler.schedule_and_answer(ClientMessage::new(4, RequestType::Scan, 0, "4"));

        let replies = collect_replies(&rx, 5);
        assert_eq!(replies[4].id, 4);
        assert_eq!(replies[4].answer, "x,y,z,w,");
        // The scan spanned both partitions and used one barrier pair.
        assert_eq!(scheduler.sync_count(), 2);
        scheduler.shutdown();
    }

    /// READ before the first WRITE of a key answers ERROR from partition 0.
    #[test]
    fn test_unknown_key_answers_error() {
        let (mut scheduler, rx) = scheduler_with(2, CutMethod::RoundRobin, 0);

        scheduler.schedule_and_answer(ClientMessage::new(77, RequestType::Read, 42, ""));
        let reply = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reply.id, 77);
        assert_eq!(reply.answer, "ERROR");

        // The unknown key was not mapped by the failed read.
        assert!(scheduler.key_map().is_empty());
        scheduler.shutdown();
    }

    #[test]
    fn test_scan_over_partially_unmapped_range_is_error() {
        let (mut scheduler, rx) = scheduler_with(2, CutMethod::RoundRobin, 0);

        scheduler.schedule_and_answer(ClientMessage::new(0, RequestType::Write, 0, "x"));
        // Key 1 was never written; the scan must fail as a whole.
        scheduler.schedule_and_answer(ClientMessage::new(1, RequestType::Scan, 0, "2"));

        let replies = collect_replies(&rx, 2);
        assert_eq!(replies[1].answer, "ERROR");
        scheduler.shutdown();
    }

    #[test]
    fn test_sync_from_upstream_is_ignored() {
        let (mut scheduler, rx) = scheduler_with(2, CutMethod::RoundRobin, 0);

        scheduler.schedule_and_answer(ClientMessage::new(0, RequestType::Sync, 0, ""));
        assert_eq!(scheduler.dispatched_count(), 0);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        scheduler.shutdown();
    }

    /// Writes and reads interleaved with repartitions every 1000 requests:
    /// every read must still observe the last admitted write of its key.
    #[test]
    fn test_repartition_install_preserves_per_key_order() {
        let (mut scheduler, rx) = scheduler_with(2, CutMethod::Fennel, 1000);

        let n_keys = 50;
        let rounds = 100;
        let mut expected: HashMap<i32, String> = HashMap::new();
        let mut id = 0;

        for round in 0..rounds {
            for key in 0..n_keys {
                let value = format!("k{key}-r{round}");
                scheduler.schedule_and_answer(ClientMessage::new(
                    id,
                    RequestType::Write,
                    key,
                    value.clone(),
                ));
                expected.insert(id, value.clone());
                id += 1;

                scheduler.schedule_and_answer(ClientMessage::new(id, RequestType::Read, key, ""));
                expected.insert(id, value);
                id += 1;
            }
        }

        let replies = collect_replies(&rx, id as usize);
        for reply in replies {
            assert_eq!(
                reply.answer, expected[&reply.id],
                "request {} saw a stale value",
                reply.id
            );
        }

        // 10_000 admitted requests at interval 1000 -> 10 installs.
        assert!(scheduler.dispatched_count() == id as u64);
        scheduler.shutdown();
    }

    /// After a repartition, membership partitions the mapped key set.
    #[test]
    fn test_membership_stays_disjoint_and_complete_after_repartition() {
        let (mut scheduler, rx) = scheduler_with(3, CutMethod::Fennel, 100);

        let mut id = 0;
        for round in 0..4 {
            for key in 0..25 {
                scheduler.schedule_and_answer(ClientMessage::new(
                    id,
                    RequestType::Write,
                    key,
                    format!("r{round}"),
                ));
                id += 1;
            }
        }
        collect_replies(&rx, id as usize);

        let key_map = scheduler.key_map();
        let mut seen: HashSet<Key> = HashSet::new();
        let mut total = 0;
        for partition in scheduler.partitions() {
            for &key in partition.members() {
                assert!(seen.insert(key), "key {key} owned by two partitions");
                assert_eq!(key_map[&key], partition.id());
            }
            total += partition.members().len();
        }
        assert_eq!(total, key_map.len());
        scheduler.shutdown();
    }

    /// Scans admitted between write rounds must observe a consistent round,
    /// never a mix, even while repartitions churn the placement.
    #[test]
    fn test_multi_partition_scans_are_isolated() {
        let (mut scheduler, rx) = scheduler_with(2, CutMethod::ReFennel, 100);

        let n_keys = 8;
        let mut id = 0;
        let mut scan_ids = Vec::new();

        // Round 0 creates the keys.
        for round in 0..50 {
            for key in 0..n_keys {
                scheduler.schedule_and_answer(ClientMessage::new(
                    id,
                    RequestType::Write,
                    key,
                    format!("r{round}"),
                ));
                id += 1;
            }
            scheduler.schedule_and_answer(ClientMessage::new(
                id,
                RequestType::Scan,
                0,
                n_keys.to_string(),
            ));
            scan_ids.push((id, round));
            id += 1;
        }

        let replies = collect_replies(&rx, id as usize);
        for (scan_id, round) in scan_ids {
            let expected = format!("r{round},").repeat(n_keys as usize);
            assert_eq!(
                replies[scan_id as usize].answer, expected,
                "scan {scan_id} observed a torn round"
            );
        }
        scheduler.shutdown();
    }

    #[test]
    fn test_executed_counters_cover_all_requests() {
        let (mut scheduler, rx) = scheduler_with(4, CutMethod::RoundRobin, 0);

        for id in 0..200 {
            scheduler.schedule_and_answer(ClientMessage::new(
                id,
                RequestType::Write,
                id % 40,
                "v",
            ));
        }
        collect_replies(&rx, 200);

        let executed: u64 = scheduler
            .partitions()
            .iter()
            .map(|partition| partition.executed_count())
            .sum();
        assert_eq!(executed, 200);

        // The tracker attributed every routed request to a partition.
        let enter = Rendezvous::new(2);
        let exit = Rendezvous::new(2);
        scheduler.tracker().fence(enter.clone(), exit.clone());
        enter.wait();
        let tracked: u64 = (0..4)
            .map(|partition| scheduler.tracker().access_count(partition))
            .sum();
        exit.wait();
        assert_eq!(tracked, 200);
        scheduler.shutdown();
    }

    #[test]
    fn test_timestamp_logs_come_back_on_shutdown() {
        let (mut scheduler, rx) = scheduler_with(2, CutMethod::RoundRobin, 0);

        for id in 0..10 {
            let mut request = ClientMessage::new(id, RequestType::Write, id, "v");
            request.record_timestamp = id % 2 == 0;
            scheduler.schedule_and_answer(request);
        }
        collect_replies(&rx, 10);

        let logs = scheduler.shutdown();
        let recorded: usize = logs.iter().map(|log| log.len()).sum();
        assert_eq!(recorded, 5);
    }
}
