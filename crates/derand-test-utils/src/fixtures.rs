//! `proptest` strategies for raw captures.

use derand_core::{Event, Setsockopt, Sockcall};
use proptest::prelude::*;

use crate::RawCapture;

/// Raw task ids: kernel pointers as well as small values.
fn arb_thread() -> impl Strategy<Value = u64> {
    prop::sample::select(vec![
        0xffff_8800_0001_2000u64,
        0xffff_8800_0001_4000,
        0xffff_8800_0003_0000,
        crate::RAW_THREAD,
        0,
    ])
}

/// Any sockcall, with flags and sizes from small pools so that repeats
/// are common.
pub fn arb_sockcall() -> impl Strategy<Value = Sockcall> {
    let flags = prop::sample::select(vec![0u32, 0x40, 0x4000]);
    let size = prop::sample::select(vec![1u64, 100, 1448, 65536]);
    prop_oneof![
        (flags.clone(), size.clone(), arb_thread())
            .prop_map(|(f, s, t)| Sockcall::sendmsg(f, s, t)),
        (flags.clone(), size.clone(), arb_thread())
            .prop_map(|(f, s, t)| Sockcall::recvmsg(f, s, t)),
        (flags, size, arb_thread()).prop_map(|(f, s, t)| Sockcall::splice_read(f, s, t)),
        (-1i64..100, arb_thread()).prop_map(|(timeout, t)| Sockcall::close(timeout, t)),
        (
            0u8..8,
            0u8..16,
            prop::collection::vec(any::<u8>(), 0..20),
            arb_thread()
        )
            .prop_map(|(level, name, value, t)| {
                Sockcall::setsockopt(Setsockopt::new(level, name, &value), t)
            }),
    ]
}

/// A raw capture with strictly increasing sequence numbers, valid
/// sockcall references in arbitrary order, repeated references, and
/// possibly unreferenced sockcalls.
pub fn arb_capture() -> impl Strategy<Value = RawCapture> {
    prop::collection::vec(arb_sockcall(), 0..12)
        .prop_flat_map(|sockcalls| {
            let n = sockcalls.len().max(1);
            let slot = (0u32..4, prop::option::of(0..n), 0u32..7);
            (Just(sockcalls), prop::collection::vec(slot, 0..40))
        })
        .prop_map(|(sockcalls, slots)| {
            let mut seq = 0u32;
            let mut events = Vec::with_capacity(slots.len());
            for (gap, reference, event_type) in slots {
                seq += gap;
                let e = match reference {
                    Some(i) if i < sockcalls.len() => Event::sockcall(seq, i as u32),
                    _ => Event::new(seq, event_type),
                };
                events.push(e);
                seq += 1;
            }
            RawCapture { events, sockcalls }
        })
}
