//! Compact-encoding size estimates.
//!
//! These are not encoders. Each function computes how many bits a
//! candidate compact encoding of a canonical stream would take, so the
//! storage cost of a capture can be judged without committing to a
//! format. Events and sockcalls each have two candidate schemes and the
//! cheaper one is reported; the other streams have one.
//!
//! Integer fields of unbounded range are costed with the dynamic code
//! [`cost_bits`]. Sizes in bytes are floors of the bit counts.

use indexmap::IndexSet;

use derand_core::{
    cost_bits, Event, JiffiesStream, SkbMstamp, Sockcall, SockcallKey, EVENT_TYPE_BITS,
    SOCK_SNAPSHOT_SIZE,
};

use crate::auxiliary::AuxStream;
use crate::codec::SOCKCALL_RECORD_SIZE;
use crate::report::{ReportKind, StorageReport};
use crate::trace::Trace;

/// Fields of the initial socket snapshot that typically differ between
/// two sockets of the same role.
pub const SNAPSHOT_CHANGED_FIELDS: u64 = 23;

/// Bits charged per changed snapshot field.
pub const SNAPSHOT_FIELD_BITS: u64 = 32;

/// Width of the record tag in the tagged event code.
const TAG_BITS: u64 = 2;
/// Packets counted inside an event record.
const PKT_BITS_IN_EVENT: u32 = 3;
/// Packets counted by a packet-only record.
const PKT_BITS_GENERAL: u32 = 6;
/// Width of the consecutive-sockcall count.
const SC_RUN_BITS: u32 = 3;
/// Charged whenever the issuing thread changes.
const THREAD_SWITCH_BITS: u64 = 1;

/// Fixed part of a run-scheme sockcall record.
const SOCKCALL_RECORD_BITS: u64 = 32;
/// Longest run of identical sockcalls one run-scheme record covers.
const SOCKCALL_RUN_CAP: u32 = 16;
/// Charged per dictionary entry and per distinct flag word.
const DICTIONARY_ENTRY_BITS: u64 = 32;

/// Bit counts of the two event encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventEstimate {
    /// Fixed-width tagged records.
    pub tagged_bits: u64,
    /// Dynamic-length code with packet runs.
    pub dynamic_bits: u64,
}

impl EventEstimate {
    /// Bytes taken by the cheaper encoding.
    pub fn bytes(&self) -> u64 {
        self.tagged_bits.min(self.dynamic_bits) / 8
    }
}

/// Bit counts of the two sockcall encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SockcallEstimate {
    /// One record per run of identical calls.
    pub run_bits: u64,
    /// Dictionary of distinct calls plus per-run dictionary indices.
    pub dictionary_bits: u64,
}

impl SockcallEstimate {
    /// Bytes taken by the cheaper encoding.
    pub fn bytes(&self) -> u64 {
        self.run_bits.min(self.dictionary_bits) / 8
    }
}

/// Received packets between event `i - 1` and event `i` (before the first
/// event for `i == 0`).
pub fn packets_before(events: &[Event], i: usize) -> u64 {
    match i {
        0 => events.first().map_or(0, |e| e.sequence as u64),
        _ => (events[i].sequence as u64)
            .saturating_sub(events[i - 1].sequence as u64)
            .saturating_sub(1),
    }
}

fn thread_of(e: &Event, sockcalls: &[Sockcall]) -> u64 {
    e.sockcall_index()
        .and_then(|i| sockcalls.get(i as usize))
        .map_or(u64::MAX, |sc| sc.thread_id)
}

// ── Events ──────────────────────────────────────────────────────

/// Cost of the fixed-width tagged code.
///
/// Every record is a 2-bit tag and 6 bits of data. An event record holds
/// up to 7 preceding packets; longer gaps spill into packet records of up
/// to 64 packets each. A sockcall record covers up to 8 consecutive
/// same-thread sockcalls at consecutive sequence numbers, and costs one
/// extra bit when its thread differs from the previous sockcall's.
pub fn tagged_event_bits(events: &[Event], sockcalls: &[Sockcall]) -> u64 {
    let in_event_max = (1u64 << PKT_BITS_IN_EVENT) - 1;
    let record_bits = TAG_BITS + PKT_BITS_IN_EVENT as u64 + SC_RUN_BITS as u64;
    let packet_record_bits = TAG_BITS + PKT_BITS_GENERAL as u64;

    let mut bits = 0u64;
    let mut last_thread: Option<u64> = None;
    let mut i = 0;
    while i < events.len() {
        let pkts = packets_before(events, i);
        if pkts > in_event_max {
            let spilled = pkts - in_event_max;
            bits += spilled.div_ceil(1 << PKT_BITS_GENERAL) * packet_record_bits;
        }

        if events[i].is_sockcall() {
            let thread = thread_of(&events[i], sockcalls);
            if last_thread != Some(thread) {
                bits += THREAD_SWITCH_BITS;
            }
            let mut run = 1u32;
            while i + 1 < events.len()
                && events[i + 1].is_sockcall()
                && events[i + 1].sequence == events[i].sequence.wrapping_add(1)
                && thread_of(&events[i + 1], sockcalls) == thread
                && run < 1 << SC_RUN_BITS
            {
                i += 1;
                run += 1;
            }
            bits += record_bits;
            last_thread = Some(thread);
        } else {
            bits += TAG_BITS + PKT_BITS_IN_EVENT as u64 + EVENT_TYPE_BITS as u64;
        }
        i += 1;
    }
    bits
}

/// Cost of the dynamic code.
///
/// The sequence space is split into alternating runs of event-carrying
/// and packet-only sequence numbers, each run length costed with
/// [`cost_bits`]. Events follow as a stream of their own: a non-sockcall
/// event is a 1-bit type flag and its 3-bit type; a run of same-thread
/// sockcalls is a 1-bit flag and its dynamically coded length, plus one
/// bit on a thread switch.
pub fn dynamic_event_bits(events: &[Event], sockcalls: &[Sockcall]) -> u64 {
    let mut bits = 0u64;

    // packet runs: every sequence number below an event's that no event
    // occupies is a packet
    let mut cursor = 0u64;
    let mut prev_end = 0u64;
    for e in events {
        let seq = e.sequence as u64;
        if cursor < seq {
            if cursor > prev_end {
                bits += cost_bits(cursor - prev_end) as u64;
            }
            bits += cost_bits(seq - cursor) as u64;
            prev_end = seq;
        }
        cursor = cursor.max(seq) + 1;
    }

    let mut last_thread: Option<u64> = None;
    let mut i = 0;
    while i < events.len() {
        if events[i].is_sockcall() {
            let thread = thread_of(&events[i], sockcalls);
            if last_thread != Some(thread) {
                bits += THREAD_SWITCH_BITS;
            }
            let mut run = 1u64;
            while i + 1 < events.len()
                && events[i + 1].is_sockcall()
                && thread_of(&events[i + 1], sockcalls) == thread
            {
                i += 1;
                run += 1;
            }
            bits += 1 + cost_bits(run) as u64;
            last_thread = Some(thread);
        } else {
            bits += 1 + EVENT_TYPE_BITS as u64;
        }
        i += 1;
    }
    bits
}

/// Both event estimates.
pub fn estimate_events(events: &[Event], sockcalls: &[Sockcall]) -> EventEstimate {
    EventEstimate {
        tagged_bits: tagged_event_bits(events, sockcalls),
        dynamic_bits: dynamic_event_bits(events, sockcalls),
    }
}

// ── Sockcalls ───────────────────────────────────────────────────

/// Bits needed for a thread id, grown as larger dense ids appear.
pub fn thread_id_bits(sockcalls: &[Sockcall]) -> u32 {
    let mut last = 0u64;
    let mut bits = 0u32;
    for sc in sockcalls {
        if sc.thread_id > last {
            if 1u64.checked_shl(bits).is_some_and(|limit| sc.thread_id >= limit) {
                bits += 1;
            }
            last = sc.thread_id;
        }
    }
    bits
}

/// Cost of one record per run of identical calls, runs capped at 17
/// calls (the record plus 16 repeats).
pub fn run_sockcall_bits(sockcalls: &[Sockcall]) -> u64 {
    let per_record = SOCKCALL_RECORD_BITS + thread_id_bits(sockcalls) as u64;
    let mut bits = 0u64;
    let mut repeats = 0u32;
    for (i, sc) in sockcalls.iter().enumerate() {
        if i > 0 && sc.same_call(&sockcalls[i - 1]) && repeats < SOCKCALL_RUN_CAP {
            repeats += 1;
        } else {
            bits += per_record;
            repeats = 0;
        }
    }
    bits
}

/// Cost of the dictionary scheme: the distinct flag words and distinct
/// `(call, thread)` pairs are stored once, then every maximal run of
/// identical calls is a dictionary index and a run length.
pub fn dictionary_sockcall_bits(sockcalls: &[Sockcall]) -> u64 {
    let flags: IndexSet<u32> = sockcalls.iter().filter_map(|sc| sc.flags()).collect();
    let dictionary: IndexSet<(SockcallKey, u64)> = sockcalls
        .iter()
        .map(|sc| (sc.identity_key(), sc.thread_id))
        .collect();
    let index_bits = dictionary.len().next_power_of_two().trailing_zeros() as u64;

    let mut bits = DICTIONARY_ENTRY_BITS * (flags.len() + dictionary.len()) as u64;
    let mut i = 0;
    while i < sockcalls.len() {
        let mut run = 1u64;
        while i + 1 < sockcalls.len() && sockcalls[i + 1].same_call(&sockcalls[i]) {
            i += 1;
            run += 1;
        }
        bits += index_bits + cost_bits(run) as u64;
        i += 1;
    }
    bits
}

/// Both sockcall estimates.
pub fn estimate_sockcalls(sockcalls: &[Sockcall]) -> SockcallEstimate {
    SockcallEstimate {
        run_bits: run_sockcall_bits(sockcalls),
        dictionary_bits: dictionary_sockcall_bits(sockcalls),
    }
}

// ── Other streams ───────────────────────────────────────────────

/// Jiffies: 64-bit head, dynamic length, dynamic value and index deltas.
pub fn compressed_jiffies_size(jiffies: &JiffiesStream) -> u64 {
    if jiffies.is_empty() {
        return 0;
    }
    let mut bits = 64 + cost_bits(jiffies.len() as u64) as u64;
    for d in jiffies.deltas() {
        bits += cost_bits(d.value_delta as u64) as u64 + cost_bits(d.index_delta as u64) as u64;
    }
    bits / 8
}

/// `skb_mstamp` reads: the first microsecond stamp in full, then dynamic
/// differences. The jiffies half rides along with the jiffies stream.
pub fn compressed_mstamp_size(mstamps: &[SkbMstamp]) -> u64 {
    let mut us_bits = 0u64;
    for (i, m) in mstamps.iter().enumerate() {
        us_bits += match i {
            0 => 32,
            _ => cost_bits(m.stamp_us.wrapping_sub(mstamps[i - 1].stamp_us) as u64) as u64,
        };
    }
    us_bits / 8 + cost_bits(mstamps.len() as u64) as u64 / 8
}

/// One bit per flag plus the dynamic length.
pub fn compressed_flag_size(len: usize) -> u64 {
    (cost_bits(len as u64) as u64 + len as u64) / 8
}

/// Fixed estimate for the initial socket snapshot.
pub fn compressed_snapshot_size() -> u64 {
    SNAPSHOT_CHANGED_FIELDS * SNAPSHOT_FIELD_BITS / 8
}

// ── Reports ─────────────────────────────────────────────────────

const RECORD_PAIR_SIZE: u64 = 8;

/// Bytes of the uncompressed records, per stream.
///
/// Drops, transmit stamps, and debug streams are not part of the
/// replay-relevant storage and are left out.
pub fn raw_storage_report(trace: &Trace) -> StorageReport {
    let mut r = StorageReport::new(ReportKind::Raw);
    r.push("snapshot", SOCK_SNAPSHOT_SIZE as u64);
    r.push(
        "events",
        (trace.config.event_record_size() * trace.events.len()) as u64,
    );
    r.push(
        "sockcalls",
        (SOCKCALL_RECORD_SIZE * trace.sockcalls.len()) as u64,
    );
    r.push("jiffies", RECORD_PAIR_SIZE * trace.jiffies.len() as u64);
    r.push("memory_pressure", trace.memory_pressure.raw_storage_size());
    r.push(
        "memory_allocated",
        RECORD_PAIR_SIZE * trace.memory_allocated.len() as u64,
    );
    r.push("mstamps", RECORD_PAIR_SIZE * trace.mstamps.len() as u64);
    r.push("in_host_queue", trace.in_host_queue.len() as u64);
    for eb in &trace.effect_bools {
        r.push(format!("effect_bool[{}]", eb.location()), eb.raw_storage_size());
    }
    r
}

/// Estimated bytes under the compact encodings, per stream.
pub fn compressed_storage_report(trace: &Trace) -> StorageReport {
    let mut r = StorageReport::new(ReportKind::Compressed);
    r.push("snapshot", compressed_snapshot_size());
    r.push(
        "events",
        estimate_events(&trace.events, &trace.sockcalls).bytes(),
    );
    r.push("sockcalls", estimate_sockcalls(&trace.sockcalls).bytes());
    r.push("jiffies", compressed_jiffies_size(&trace.jiffies));
    r.push(
        "memory_pressure",
        trace.memory_pressure.compressed_storage_size(),
    );
    r.push(
        "memory_allocated",
        RECORD_PAIR_SIZE * trace.memory_allocated.len() as u64,
    );
    r.push("mstamps", compressed_mstamp_size(&trace.mstamps));
    r.push("in_host_queue", compressed_flag_size(trace.in_host_queue.len()));
    for eb in &trace.effect_bools {
        r.push(
            format!("effect_bool[{}]", eb.location()),
            eb.compressed_storage_size(),
        );
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use derand_core::Setsockopt;
    use derand_test_utils::{arb_capture, single_thread_burst};
    use proptest::prelude::*;

    fn sockcall_events(seqs: &[u32]) -> Vec<Event> {
        seqs.iter()
            .enumerate()
            .map(|(i, &s)| Event::sockcall(s, i as u32))
            .collect()
    }

    #[test]
    fn empty_streams_cost_nothing() {
        let e = estimate_events(&[], &[]);
        assert_eq!((e.tagged_bits, e.dynamic_bits), (0, 0));
        let s = estimate_sockcalls(&[]);
        assert_eq!((s.run_bits, s.dictionary_bits), (0, 0));
        assert_eq!(compressed_jiffies_size(&JiffiesStream::new()), 0);
        assert_eq!(compressed_mstamp_size(&[]), 0);
        assert_eq!(compressed_flag_size(0), 0);
    }

    #[test]
    fn packets_before_first_and_gaps() {
        let evts = vec![Event::new(2, 0), Event::new(3, 0), Event::new(9, 0)];
        assert_eq!(packets_before(&evts, 0), 2);
        assert_eq!(packets_before(&evts, 1), 0);
        assert_eq!(packets_before(&evts, 2), 5);
    }

    #[test]
    fn packet_gap_spills_into_packet_records() {
        let evts = vec![Event::new(20, 0)];
        // 7 packets ride in the event record, 13 need one packet record
        assert_eq!(tagged_event_bits(&evts, &[]), 8 + 8);
        // one packet run of 20, then a 4-bit event
        assert_eq!(dynamic_event_bits(&evts, &[]), cost_bits(20) as u64 + 4);
    }

    #[test]
    fn single_thread_burst_selects_cheaper_scheme() {
        let burst = single_thread_burst(4);
        let e = estimate_events(&burst.events, &burst.sockcalls);
        // one thread switch, one record covering all four
        assert_eq!(e.tagged_bits, 1 + 8);
        // one thread switch, flag, cost_bits(4)
        assert_eq!(e.dynamic_bits, 1 + 1 + cost_bits(4) as u64);
        assert_eq!(e.bytes(), e.tagged_bits.min(e.dynamic_bits) / 8);
    }

    #[test]
    fn tagged_runs_cap_at_eight() {
        let scs = vec![Sockcall::recvmsg(0, 1, 0); 10];
        let evts = sockcall_events(&(0..10).collect::<Vec<_>>());
        assert_eq!(tagged_event_bits(&evts, &scs), 1 + 2 * 8);
        assert_eq!(dynamic_event_bits(&evts, &scs), 1 + 1 + cost_bits(10) as u64);
    }

    #[test]
    fn tagged_runs_need_consecutive_sequences() {
        let scs = vec![Sockcall::recvmsg(0, 1, 0); 2];
        let evts = sockcall_events(&[0, 2]);
        // two records, one packet between them
        assert_eq!(tagged_event_bits(&evts, &scs), 1 + 8 + 8);
    }

    #[test]
    fn thread_switches_are_charged() {
        let scs = vec![
            Sockcall::sendmsg(0, 1, 0),
            Sockcall::sendmsg(0, 1, 1),
            Sockcall::sendmsg(0, 1, 0),
        ];
        let evts = sockcall_events(&[0, 1, 2]);
        assert_eq!(tagged_event_bits(&evts, &scs), 3 * 9);
        assert_eq!(dynamic_event_bits(&evts, &scs), 3 * (1 + 1 + cost_bits(1) as u64));
    }

    #[test]
    fn thread_id_bits_grow_with_dense_ids() {
        let ids = |v: &[u64]| -> Vec<Sockcall> { v.iter().map(|&t| Sockcall::close(0, t)).collect() };
        assert_eq!(thread_id_bits(&ids(&[0, 0])), 0);
        assert_eq!(thread_id_bits(&ids(&[0, 1])), 1);
        assert_eq!(thread_id_bits(&ids(&[0, 1, 2, 3])), 2);
        assert_eq!(thread_id_bits(&ids(&[0, 1, 2, 3, 4])), 3);
    }

    #[test]
    fn identical_sockcalls() {
        let scs = vec![Sockcall::sendmsg(0x40, 1448, 0); 4];
        let s = estimate_sockcalls(&scs);
        assert_eq!(s.run_bits, 32);
        // one flag word, one entry, zero-width index, run of 4
        assert_eq!(s.dictionary_bits, 32 + 32 + cost_bits(4) as u64);
        assert_eq!(s.bytes(), 4);
    }

    #[test]
    fn run_records_cap_at_sixteen_repeats() {
        let scs = vec![Sockcall::close(0, 0); 20];
        assert_eq!(run_sockcall_bits(&scs), 2 * 32);
    }

    #[test]
    fn dictionary_counts_threads_separately() {
        let scs = vec![Sockcall::close(0, 0), Sockcall::close(0, 1)];
        // two entries, one index bit, a single run of 2
        assert_eq!(dictionary_sockcall_bits(&scs), 2 * 32 + 1 + cost_bits(2) as u64);
    }

    #[test]
    fn setsockopt_tail_bytes_do_not_split_runs() {
        let opt = Setsockopt::new(6, 9, &[1, 0, 0, 0]);
        let mut noisy = opt;
        noisy.optval[10] = 0xff;
        let scs = vec![Sockcall::setsockopt(opt, 0), Sockcall::setsockopt(noisy, 0)];
        assert_eq!(run_sockcall_bits(&scs), 32);
        // no flag words, one entry, zero-width index, a single run of 2
        assert_eq!(dictionary_sockcall_bits(&scs), 32 + cost_bits(2) as u64);
    }

    #[test]
    fn snapshot_estimate_is_fixed() {
        assert_eq!(compressed_snapshot_size(), 92);
    }

    #[test]
    fn mstamp_differences() {
        let m = |us| SkbMstamp {
            stamp_us: us,
            stamp_jiffies: 0,
        };
        let stamps = vec![m(1000), m(1001), m(1003)];
        let expected = (32 + cost_bits(1) as u64 + cost_bits(2) as u64) / 8 + cost_bits(3) as u64 / 8;
        assert_eq!(compressed_mstamp_size(&stamps), expected);
    }

    proptest! {
        #[test]
        fn repetitive_sockcalls_compress(n in 2usize..500) {
            let scs = vec![Sockcall::recvmsg(0, 65536, 0); n];
            let raw = (SOCKCALL_RECORD_SIZE * n) as u64;
            prop_assert!(estimate_sockcalls(&scs).bytes() <= raw);
        }

        #[test]
        fn event_estimate_below_raw(capture in arb_capture()) {
            let e = estimate_events(&capture.events, &capture.sockcalls);
            // the tagged code never exceeds 8 bits per event plus spill
            // records, and dense sequences have no spill
            let spill: u64 = (0..capture.events.len())
                .map(|i| packets_before(&capture.events, i).saturating_sub(7).div_ceil(64) * 8)
                .sum();
            prop_assert!(e.tagged_bits <= 9 * capture.events.len() as u64 + spill);
        }
    }
}
