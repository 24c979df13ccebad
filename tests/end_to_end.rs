//! Full pipeline test: wire bytes in, scheduler, wire bytes out.

use kv_scheduler::application::services::{Scheduler, SchedulerConfig};
use kv_scheduler::domain::partitioning::CutMethod;
use kv_scheduler::infrastructure::network::{Codec, ChannelReplySink, ReplyCodec, RequestCodec};
use kv_scheduler::shared::protocol::{ClientMessage, ReplyMessage, RequestType};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Encodes a batch of requests into one contiguous byte stream.
fn to_wire(requests: &[ClientMessage]) -> Vec<u8> {
    let mut codec = RequestCodec;
    let mut stream = Vec::new();
    let mut frame = vec![0u8; 8192];
    for request in requests {
        let written = codec.encode(request, &mut frame).unwrap();
        stream.extend_from_slice(&frame[..written]);
    }
    stream
}

/// Decodes every frame in the stream.
fn from_wire(mut stream: &[u8]) -> Vec<ClientMessage> {
    let mut codec = RequestCodec;
    let mut requests = Vec::new();
    while let Some((request, consumed)) = codec.decode(stream).unwrap() {
        requests.push(request);
        stream = &stream[consumed..];
    }
    assert!(stream.is_empty(), "trailing bytes after the last frame");
    requests
}

#[test]
fn test_wire_to_reply_pipeline() {
    let mut requests = vec![
        ClientMessage::new(0, RequestType::Write, 1, "alpha"),
        ClientMessage::new(1, RequestType::Write, 2, "beta"),
        ClientMessage::new(2, RequestType::Write, 0, "gamma"),
        ClientMessage::new(3, RequestType::Read, 1, ""),
        ClientMessage::new(4, RequestType::Scan, 0, "3"),
        ClientMessage::new(5, RequestType::Read, 99, ""),
    ];
    requests[3].record_timestamp = true;

    // Requests survive the wire unchanged.
    let delivered = from_wire(&to_wire(&requests));
    assert_eq!(delivered, requests);

    let (sink, reply_rx) = ChannelReplySink::new();
    let mut config = SchedulerConfig::new(2);
    config.cut_method = CutMethod::Fennel;
    config.repartition_interval = 4;
    let mut scheduler = Scheduler::new(config, Arc::new(sink)).unwrap();

    for request in delivered {
        scheduler.schedule_and_answer(request);
    }

    let mut replies: Vec<ReplyMessage> = (0..6)
        .map(|_| reply_rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    replies.sort_by_key(|reply| reply.id);

    // Replies also survive their wire shape.
    let mut reply_codec = ReplyCodec;
    let mut frame = vec![0u8; 8192];
    for reply in &replies {
        let written = reply_codec.encode(reply, &mut frame).unwrap();
        let (decoded, consumed) = reply_codec.decode(&frame[..written]).unwrap().unwrap();
        assert_eq!(consumed, written);
        assert_eq!(&decoded, reply);
    }

    let answers: HashMap<i32, &str> = replies
        .iter()
        .map(|reply| (reply.id, reply.answer.as_str()))
        .collect();
    assert_eq!(answers[&0], "alpha");
    assert_eq!(answers[&3], "alpha");
    // Scan walks keys 0, 1, 2 in ascending order.
    assert_eq!(answers[&4], "gamma,alpha,beta,");
    // Key 99 was never written.
    assert_eq!(answers[&5], "ERROR");

    let logs = scheduler.shutdown();
    assert_eq!(logs.iter().map(Vec::len).sum::<usize>(), 1);
}

#[test]
fn test_sustained_workload_with_repartitions() {
    let (sink, reply_rx) = ChannelReplySink::new();
    let mut config = SchedulerConfig::new(4);
    config.cut_method = CutMethod::ReFennel;
    config.repartition_interval = 500;
    let mut scheduler = Scheduler::new(config, Arc::new(sink)).unwrap();

    let n_keys = 64;
    let mut id = 0i32;
    let mut last_written: HashMap<i32, String> = HashMap::new();
    let mut expected_reads: HashMap<i32, String> = HashMap::new();

    for round in 0..40 {
        for key in 0..n_keys {
            let value = format!("{key}@{round}");
            scheduler.schedule_and_answer(ClientMessage::new(
                id,
                RequestType::Write,
                key,
                value.clone(),
            ));
            last_written.insert(key, value);
            id += 1;
        }
        // Read back a stride of keys after each round.
        for key in (0..n_keys).step_by(7) {
            scheduler.schedule_and_answer(ClientMessage::new(id, RequestType::Read, key, ""));
            expected_reads.insert(id, last_written[&key].clone());
            id += 1;
        }
    }

    let mut replies = Vec::with_capacity(id as usize);
    for _ in 0..id {
        replies.push(reply_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    for reply in &replies {
        if let Some(expected) = expected_reads.get(&reply.id) {
            assert_eq!(&reply.answer, expected, "read {} saw a stale value", reply.id);
        }
        assert_ne!(reply.answer, "ERROR");
    }

    // Every admitted request was executed by exactly one partition.
    let executed: u64 = scheduler
        .partitions()
        .iter()
        .map(|partition| partition.executed_count())
        .sum();
    assert_eq!(executed, id as u64);
    scheduler.shutdown();
}
