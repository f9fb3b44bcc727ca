//! Trace store integration tests: canonicalize → persist → load, over
//! canned scenarios and generated captures.

use std::collections::HashSet;

use derand_core::{Event, FourTuple, GeneralEvent, SkbMstamp, Sockcall, SOCK_SNAPSHOT_SIZE};
use derand_records::{
    compare_traces, trace_hash, AuxStream, ReportKind, Section, Trace, TraceConfig, TraceError,
};
use derand_test_utils::{
    arb_capture, interleaved_threads, single_thread_burst, three_event_capture, RawCapture,
};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────

fn trace_from(capture: RawCapture, config: TraceConfig) -> Trace {
    let mut t = Trace::new(config).unwrap();
    t.tuple = FourTuple {
        src_ip: 0x0a00_0001,
        src_port: 5001,
        dst_ip: 0x0a00_0002,
        dst_port: 40312,
    };
    t.events = capture.events;
    t.sockcalls = capture.sockcalls;
    t
}

fn persisted(t: &mut Trace) -> Vec<u8> {
    let mut buf = Vec::new();
    t.persist(&mut buf).unwrap();
    buf
}

/// Append one event per sockcall so nothing is left unreferenced.
fn fully_referenced(mut capture: RawCapture) -> RawCapture {
    let mut seq = capture.events.last().map_or(0, |e| e.sequence + 1);
    for i in 0..capture.sockcalls.len() as u32 {
        capture.events.push(Event::sockcall(seq, i));
        seq += 1;
    }
    capture
}

fn reload(buf: &[u8], config: TraceConfig) -> Trace {
    Trace::load(&mut &buf[..], config).unwrap()
}

/// Header: three flag words, the 4-tuple, the snapshot.
const HEADER_LEN: usize = 3 * 4 + 12 + SOCK_SNAPSHOT_SIZE;

// ── Scenarios ───────────────────────────────────────────────────

#[test]
fn three_event_scenario() {
    let mut t = trace_from(three_event_capture(), TraceConfig::default());
    let buf = persisted(&mut t);

    assert_eq!(t.total_bytes_sent(), 100);
    assert_eq!(t.packets_received(), 3);
    assert_eq!(t.sockcalls.len(), 1);
    assert_eq!(t.sockcalls[0].thread_id, 0);

    let back = reload(&buf, TraceConfig::default());
    assert_eq!(back, t);
    let seqs: Vec<u32> = back.events.iter().map(|e| e.sequence).collect();
    assert_eq!(seqs, vec![0, 1, 5]);
    assert_eq!(back.sockcalls[0], Sockcall::sendmsg(0, 100, 0));
}

#[test]
fn empty_trace_is_header_and_zero_lengths() {
    let config = TraceConfig::default();
    let mut t = Trace::new(config.clone()).unwrap();
    let buf = persisted(&mut t);

    // events, sockcalls, drops, jiffies, mpq (n + len), memory_allocated,
    // n_sockets_allocated, mstamps, in_host_queue, then n + len per effect-bool queue
    let expected = HEADER_LEN + 4 * 4 + 8 + 4 + 4 + 4 + 4 + 8 * config.effect_bool_locations;
    assert_eq!(buf.len(), expected);
    assert!(buf[HEADER_LEN..].iter().all(|&b| b == 0));

    let report = t.compressed_storage_report();
    assert_eq!(report.kind(), ReportKind::Compressed);
    for entry in report.entries() {
        if entry.name != "snapshot" {
            assert_eq!(entry.bytes, 0, "{} should be free when empty", entry.name);
        }
    }
    assert_eq!(reload(&buf, config), t);
}

#[test]
fn interleaved_threads_canonicalize() {
    let mut t = trace_from(interleaved_threads(), TraceConfig::default());
    let summary = t.canonicalize().unwrap();
    assert_eq!(summary.threads, 2);
    assert_eq!(summary.reorder.referenced, 3);
    assert_eq!(summary.reorder.unreferenced, 0);

    // first referenced call was the sendmsg from the second raw thread
    assert_eq!(t.sockcalls[0], Sockcall::sendmsg(0, 64, 0));
    assert_eq!(t.sockcalls[1], Sockcall::recvmsg(0, 512, 1));
    assert_eq!(t.sockcalls[2], Sockcall::close(0, 1));
}

#[test]
fn persisting_twice_is_byte_identical() {
    let mut t = trace_from(interleaved_threads(), TraceConfig::default());
    let first = persisted(&mut t);
    let second = persisted(&mut t);
    assert_eq!(first, second);
}

#[test]
fn optional_sections_roundtrip() {
    let config = TraceConfig {
        debug_events: true,
        tx_stamps: true,
        advanced_events: true,
        effect_bool_locations: 2,
    };
    let mut t = trace_from(three_event_capture(), config.clone());
    t.events[0].debug_data = 0xdead;
    t.tx_stamps = vec![-1, 7];
    t.general_events = vec![GeneralEvent { kind: 1, data: 42 }];
    t.advanced_events = vec![1, 2, 3];
    t.effect_bools[1].push(true);
    let buf = persisted(&mut t);
    let back = reload(&buf, config);
    assert_eq!(back, t);
    assert_eq!(back.events[0].debug_data, 0xdead);
}

#[test]
fn auxiliary_streams_roundtrip() {
    let mut t = trace_from(single_thread_burst(5), TraceConfig::default());
    t.mode = 2;
    t.broken = 1;
    t.snapshot.as_bytes_mut()[17] = 0x5a;
    t.drops = vec![3, 9];
    t.jiffies.push(0, 4_294_937_296).unwrap();
    t.jiffies.push(3, 4_294_937_301).unwrap();
    t.memory_allocated.push(1, 1000).unwrap();
    t.memory_allocated.push(2, 900).unwrap();
    for i in 0..70 {
        t.memory_pressure.push(i % 31 == 0);
        t.effect_bools[13].push(i % 2 == 0);
    }
    t.n_sockets_allocated = 4;
    t.mstamps = vec![
        SkbMstamp {
            stamp_us: 10,
            stamp_jiffies: 1,
        },
        SkbMstamp {
            stamp_us: 25,
            stamp_jiffies: 1,
        },
    ];
    t.in_host_queue = vec![0, 1, 0];

    let buf = persisted(&mut t);
    assert!(t.memory_pressure.is_canonical());
    let back = reload(&buf, TraceConfig::default());
    assert_eq!(back, t);
    assert_eq!(compare_traces(&back, &t).unwrap(), None);
}

// ── Failures ────────────────────────────────────────────────────

#[test]
fn truncated_file_names_section() {
    let mut t = trace_from(three_event_capture(), TraceConfig::default());
    let buf = persisted(&mut t);
    let cut = HEADER_LEN + 4 + 3;
    let err = Trace::load(&mut &buf[..cut], TraceConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        TraceError::Truncated {
            section: Section::Events
        }
    ));
}

#[test]
fn wrong_schema_fails_to_load() {
    let mut t = trace_from(three_event_capture(), TraceConfig::default());
    let buf = persisted(&mut t);
    let wide = TraceConfig {
        debug_events: true,
        ..Default::default()
    };
    assert!(Trace::load(&mut &buf[..], wide).is_err());
}

#[test]
fn dangling_reference_fails_persist() {
    let mut t = Trace::default();
    t.events.push(Event::sockcall(0, 3));
    let before = t.clone();
    let mut buf = Vec::new();
    assert!(matches!(
        t.persist(&mut buf),
        Err(TraceError::DanglingSockcall { .. })
    ));
    assert!(buf.is_empty());
    assert_eq!(t, before);
}

#[test]
fn persist_path_uses_tuple_name_in_given_dir() {
    let dir = std::env::temp_dir().join(format!("derand-store-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("trace.bin");

    let mut t = trace_from(three_event_capture(), TraceConfig::default());
    let written = t.persist_path(Some(path.as_path())).unwrap();
    assert_eq!(written, path);
    let back = Trace::load_path(&path, TraceConfig::default()).unwrap();
    assert_eq!(back, t);
    assert_eq!(t.tuple.default_file_name(), "0a000001:5001->0a000002:40312");

    std::fs::remove_dir_all(&dir).unwrap();
}

// ── Estimates ───────────────────────────────────────────────────

#[test]
fn repetitive_capture_compresses() {
    let mut t = trace_from(single_thread_burst(200), TraceConfig::default());
    t.canonicalize().unwrap();
    let raw = t.raw_storage_report();
    let compressed = t.compressed_storage_report();
    assert!(compressed.get("events").unwrap() < raw.get("events").unwrap());
    assert!(compressed.get("sockcalls").unwrap() < raw.get("sockcalls").unwrap());
    assert!(compressed.total() < raw.total());
}

// ── Properties ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn roundtrip_generated(capture in arb_capture(), drops in prop::collection::vec(any::<u32>(), 0..8)) {
        let mut t = trace_from(capture, TraceConfig::default());
        t.drops = drops;
        let buf = persisted(&mut t);
        let back = reload(&buf, TraceConfig::default());
        prop_assert_eq!(&back, &t);
        prop_assert_eq!(trace_hash(&back).unwrap(), trace_hash(&t).unwrap());
    }

    #[test]
    fn canonicalize_is_idempotent(capture in arb_capture()) {
        let mut t = trace_from(capture, TraceConfig::default());
        t.canonicalize().unwrap();
        let once = t.clone();
        t.canonicalize().unwrap();
        prop_assert_eq!(t, once);
    }

    #[test]
    fn thread_ids_are_exactly_dense(capture in arb_capture()) {
        let distinct: HashSet<u64> = capture.sockcalls.iter().map(|s| s.thread_id).collect();
        let mut t = trace_from(capture, TraceConfig::default());
        let summary = t.canonicalize().unwrap();

        let dense: HashSet<u64> = t.sockcalls.iter().map(|s| s.thread_id).collect();
        let expected: HashSet<u64> = (0..summary.threads as u64).collect();
        prop_assert_eq!(&dense, &expected);
        if let Some(first) = t.sockcalls.first() {
            prop_assert_eq!(first.thread_id, 0);
        }
        prop_assert!(summary.threads <= distinct.len());
    }

    #[test]
    fn fully_referenced_threads_keep_their_count(capture in arb_capture()) {
        let capture = fully_referenced(capture);
        let distinct: HashSet<u64> = capture.sockcalls.iter().map(|s| s.thread_id).collect();
        let mut t = trace_from(capture, TraceConfig::default());
        let summary = t.canonicalize().unwrap();

        prop_assert_eq!(summary.reorder.unreferenced, 0);
        prop_assert_eq!(summary.threads, distinct.len());
        let dense: HashSet<u64> = t.sockcalls.iter().map(|s| s.thread_id).collect();
        let expected: HashSet<u64> = (0..distinct.len() as u64).collect();
        prop_assert_eq!(dense, expected);
    }

    #[test]
    fn every_reference_resolves(capture in arb_capture()) {
        let mut t = trace_from(capture, TraceConfig::default());
        t.canonicalize().unwrap();
        for e in &t.events {
            if e.is_sockcall() {
                prop_assert!(t.event_sockcall(e).is_some());
            }
        }
    }
}
