//! Benchmark profiles for derand traces.
//!
//! Provides pre-built raw captures for benchmarking:
//!
//! - [`reference_profile`]: 10K events from four threads, every auxiliary
//!   stream populated
//! - [`stress_profile`]: 100K events from sixteen threads
//! - [`raw_thread_ids`]: deterministic kernel task ids via seed

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use derand_core::{Event, SkbMstamp, Sockcall, StreamError};
use derand_records::Trace;

/// Build a reference benchmark profile: 10K events, 4 threads.
///
/// The result is a raw capture: thread ids are kernel task ids and the
/// sockcall array is in append order, not reference order.
pub fn reference_profile(seed: u64) -> Result<Trace, StreamError> {
    capture_profile(10_000, 4, seed)
}

/// Build a stress benchmark profile: 100K events, 16 threads.
///
/// Same mix as [`reference_profile`] at 10x the event count.
pub fn stress_profile(seed: u64) -> Result<Trace, StreamError> {
    capture_profile(100_000, 16, seed)
}

/// Generate `n` distinct, deterministic kernel task ids.
pub fn raw_thread_ids(n: usize, seed: u64) -> Vec<u64> {
    let mut ids = Vec::with_capacity(n);
    let mut occupied = std::collections::HashSet::new();
    for i in 0..n as u64 {
        let mut id = 0x1000
            + (seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(i * 1442695040888963407)
                >> 48);
        // Step past collisions linearly
        while occupied.contains(&id) {
            id += 1;
        }
        occupied.insert(id);
        ids.push(id);
    }
    ids
}

/// One LCG step; the high bits are the usable output.
fn next(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state >> 33
}

fn capture_profile(n_events: usize, n_threads: usize, seed: u64) -> Result<Trace, StreamError> {
    let threads = raw_thread_ids(n_threads, seed);
    let mut state = seed;
    let mut t = Trace::default();
    let mut seq = 0u32;
    let mut jiffies = 4_294_937_296u64;
    let mut allocated = 1u64 << 20;
    let mut pending: Vec<u32> = Vec::new();

    for i in 0..n_events {
        let r = next(&mut state);
        match r % 8 {
            0 | 1 => t.events.push(Event::new(seq, (r >> 8) as u32 % 4)),
            // a thread wakes on a call it appended earlier
            2 if !pending.is_empty() => {
                let k = (r >> 8) as usize % pending.len();
                let index = pending.swap_remove(k);
                t.events.push(Event::sockcall(seq, index));
            }
            _ => {
                let tid = threads[(r >> 8) as usize % threads.len()];
                let size = 1448 * (1 + (r >> 16) % 4);
                let sc = if r & 0x100 == 0 {
                    Sockcall::sendmsg(0x40, size, tid)
                } else {
                    Sockcall::recvmsg(0, size, tid)
                };
                let index = t.sockcalls.len() as u32;
                t.sockcalls.push(sc);
                t.events.push(Event::sockcall(seq, index));
                if r & 0x200 != 0 {
                    pending.push(index);
                }
            }
        }
        seq += 1 + (r >> 20) as u32 % 3;

        if i % 16 == 0 {
            jiffies += (r >> 24) % 4;
            t.jiffies.push(i as u64, jiffies)?;
            allocated = allocated.wrapping_add((r >> 12) % 4096).wrapping_sub(2048);
            t.memory_allocated.push(i as u64, allocated)?;
            t.mstamps.push(SkbMstamp {
                stamp_us: (i as u32).wrapping_mul(10),
                stamp_jiffies: jiffies as u32,
            });
        }
        t.memory_pressure.push((r >> 10) % 64 == 0);
        let location = (r >> 4) as usize % t.effect_bools.len();
        t.effect_bools[location].push(r & 0x400 != 0);
        if r % 32 == 0 {
            t.drops.push(seq);
        }
    }
    t.in_host_queue = vec![0; n_events / 64];
    Ok(t)
}
